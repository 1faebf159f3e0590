mod common;

use std::time::Duration;

use imperia_net::{
    ConnectErrorKind, ListenScope, SocketErrorKind, SocketEvent, SocketOptions, SocketState,
    TransportError, TransportListener, TransportSocket, Value,
};

fn numbered(index: i64) -> Value {
    Value::map([
        ("topic", Value::from("test.sequence")),
        ("index", Value::Int(index)),
    ])
}

#[test]
fn client_sees_connected_event_first() {
    let (_listener, mut client, _server) = common::connected_pair();
    let events = common::collect_events(&mut client, 1);
    assert!(matches!(events.first(), Some(SocketEvent::Connected)));
    assert_eq!(client.state(), SocketState::Connected);
}

#[test]
fn burst_of_three_arrives_in_order() {
    let (_listener, mut client, mut server) = common::connected_pair();
    for index in 0..3 {
        client.send(&numbered(index)).unwrap();
    }
    let received = common::collect_messages(&mut server, 3);
    assert_eq!(received, vec![numbered(0), numbered(1), numbered(2)]);
}

#[test]
fn messages_flow_both_ways() {
    let (_listener, mut client, mut server) = common::connected_pair();
    client
        .send(&Value::map([("request", Value::from("summary"))]))
        .unwrap();
    let request = common::collect_messages(&mut server, 1);
    assert_eq!(request[0].get("request").and_then(Value::as_str), Some("summary"));

    let nested = Value::map([
        ("provinces", Value::from(vec![Value::Int(0), Value::Int(1)])),
        ("ratio", Value::Float(0.25)),
        ("owner", Value::Null),
        ("flags", Value::map([("coastal", Value::Bool(true))])),
    ]);
    server.send(&nested).unwrap();
    let reply = common::collect_messages(&mut client, 1);
    assert_eq!(reply, vec![nested]);
    assert!(server.bytes_written() > 0);
}

#[test]
fn large_message_crosses_many_reads() {
    let (_listener, mut client, mut server) = common::connected_pair();
    let terrain: Vec<Value> = (0..50_000)
        .map(|index| Value::Str(format!("tile-{index}")))
        .collect();
    let message = Value::map([("terrain", Value::Seq(terrain))]);
    client.send(&message).unwrap();
    let mut received = Vec::new();
    for _ in 0..1000 {
        received.extend(common::collect_messages(&mut server, 1));
        client.poll();
        if !received.is_empty() {
            break;
        }
    }
    assert_eq!(received, vec![message]);
}

#[test]
fn each_client_gets_its_own_stream() {
    let mut listener = TransportListener::default();
    let addr = listener.start(0, ListenScope::Local).unwrap();
    let mut clients: Vec<TransportSocket> = (0..3)
        .map(|_| {
            let mut client = TransportSocket::default();
            client.connect("127.0.0.1", addr.port()).unwrap();
            client
        })
        .collect();
    let mut servers: Vec<TransportSocket> =
        (0..3).map(|_| common::accept_one(&mut listener)).collect();

    for (index, client) in clients.iter_mut().enumerate() {
        client.send(&numbered(index as i64)).unwrap();
    }
    let mut seen: Vec<i64> = servers
        .iter_mut()
        .flat_map(|server| common::collect_messages(server, 1))
        .filter_map(|message| message.get("index").and_then(Value::as_i64))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn disconnect_is_seen_by_peer() {
    let (_listener, mut client, mut server) = common::connected_pair();
    client.disconnect();
    client.disconnect();
    let events = common::collect_events(&mut server, 1);
    assert!(events
        .iter()
        .any(|event| matches!(event, SocketEvent::Disconnected)));
    assert!(!server.is_connected());
    assert!(matches!(
        server.send(&numbered(0)),
        Err(TransportError::NotConnected)
    ));
    let client_events = client.poll();
    let disconnects = client_events
        .iter()
        .filter(|event| matches!(event, SocketEvent::Disconnected))
        .count();
    assert_eq!(disconnects, 1);
}

#[test]
fn refused_connection_reports_reason() {
    let mut listener = TransportListener::default();
    let addr = listener.start(0, ListenScope::Local).unwrap();
    listener.stop();

    let mut client = TransportSocket::new(SocketOptions {
        connect_timeout: Duration::from_millis(500),
        ..SocketOptions::default()
    });
    let err = client.connect("local", addr.port()).unwrap_err();
    assert!(matches!(
        err,
        TransportError::Connect {
            reason: ConnectErrorKind::Refused,
            ..
        }
    ));
    assert_eq!(client.state(), SocketState::Error);
    assert!(matches!(
        client.poll().as_slice(),
        [SocketEvent::Error(SocketErrorKind::Connect(ConnectErrorKind::Refused))]
    ));
}

#[test]
fn listener_keeps_running_after_client_failure() {
    let mut listener = TransportListener::default();
    let addr = listener.start(0, ListenScope::Local).unwrap();

    let mut first = TransportSocket::default();
    first.connect("local", addr.port()).unwrap();
    let mut first_server = common::accept_one(&mut listener);
    first.disconnect();
    common::collect_events(&mut first_server, 1);

    let mut second = TransportSocket::default();
    second.connect("local", addr.port()).unwrap();
    let mut second_server = common::accept_one(&mut listener);
    second.send(&numbered(7)).unwrap();
    assert_eq!(
        common::collect_messages(&mut second_server, 1),
        vec![numbered(7)]
    );
    assert!(listener.is_listening());
}
