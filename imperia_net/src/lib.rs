//! Message transport for the Imperia server and its thin clients.
//!
//! Messages are [`Value`] trees. On the wire each message is one frame:
//! a 4-byte big-endian length followed by the zlib-compressed, type-tagged
//! JSON document. [`TransportSocket`] and [`TransportListener`] are driven by
//! the caller's reactor loop through their `poll` methods; neither spawns
//! threads or blocks, apart from the bounded connect wait.

pub mod codec;
pub mod frame;
pub mod listener;
pub mod socket;
pub mod value;

pub use codec::{decode, encode, DecodeError, EncodeError, MAX_NESTING_DEPTH};
pub use frame::{encode_frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE};
pub use listener::{ListenScope, ListenerEvent, TransportListener};
pub use socket::{
    ConnectErrorKind, SocketErrorKind, SocketEvent, SocketOptions, SocketState, TransportError,
    TransportSocket, LOCAL_HOST,
};
pub use value::Value;
