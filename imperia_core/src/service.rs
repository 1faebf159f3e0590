//! Request handling for the scenario server.
//!
//! One [`ScenarioServer`] owns the authoritative [`Scenario`], the listener
//! and every connected client socket. `tick` is a single pass of the reactor
//! loop: accept, read, answer, drop closed connections.

use imperia_net::{
    ListenScope, ListenerEvent, SocketEvent, SocketOptions, TransportError, TransportListener,
    TransportSocket, Value,
};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::scenario::{Scenario, ScenarioError};

pub const SUMMARY_TOPIC: &str = "scenario.summary";
pub const TERRAIN_TOPIC: &str = "scenario.terrain";
pub const ERROR_TOPIC: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Summary,
    Terrain { column: i32, row: i32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("message has no string `request` field")]
    MissingRequest,
    #[error("unknown request {0:?}")]
    UnknownRequest(String),
    #[error("request field {0:?} must be an integer")]
    InvalidField(&'static str),
}

fn int_field(message: &Value, field: &'static str) -> Result<i32, RequestError> {
    message
        .get(field)
        .and_then(Value::as_i64)
        .and_then(|value| i32::try_from(value).ok())
        .ok_or(RequestError::InvalidField(field))
}

pub fn parse_request(message: &Value) -> Result<Request, RequestError> {
    let kind = message
        .get("request")
        .and_then(Value::as_str)
        .ok_or(RequestError::MissingRequest)?;
    match kind {
        "summary" => Ok(Request::Summary),
        "terrain" => Ok(Request::Terrain {
            column: int_field(message, "column")?,
            row: int_field(message, "row")?,
        }),
        other => Err(RequestError::UnknownRequest(other.to_string())),
    }
}

pub fn error_message(reason: impl ToString) -> Value {
    Value::map([
        ("topic", Value::from(ERROR_TOPIC)),
        ("reason", Value::from(reason.to_string())),
    ])
}

/// Sent to every client on arrival and in answer to `summary`.
pub fn summary_message(scenario: &Scenario) -> Value {
    let title = scenario
        .title()
        .map(Value::from)
        .unwrap_or(Value::Null);
    let description = scenario
        .description()
        .map(Value::from)
        .unwrap_or(Value::Null);
    Value::map([
        ("topic", Value::from(SUMMARY_TOPIC)),
        ("title", title),
        ("description", description),
        ("columns", Value::from(scenario.columns())),
        ("rows", Value::from(scenario.rows())),
        ("provinces", Value::Int(scenario.provinces().len() as i64)),
        ("nations", Value::Int(scenario.nations().len() as i64)),
    ])
}

fn terrain_message(scenario: &Scenario, column: i32, row: i32) -> Result<Value, ScenarioError> {
    let terrain = scenario.terrain_at(column, row)?;
    let resource = scenario.resource_at(column, row)?;
    let name = scenario
        .terrain_name(terrain)
        .map(Value::from)
        .unwrap_or(Value::Null);
    let province = scenario
        .get_province_at(column, row)
        .map(|province| Value::from(province.0))
        .unwrap_or(Value::Null);
    Ok(Value::map([
        ("topic", Value::from(TERRAIN_TOPIC)),
        ("column", Value::from(column)),
        ("row", Value::from(row)),
        ("terrain", Value::from(terrain)),
        ("resource", Value::from(resource)),
        ("name", name),
        ("province", province),
    ]))
}

/// Reply for one decoded client message. Failures become `error` messages.
pub fn handle_message(scenario: &Scenario, message: &Value) -> Value {
    let reply = match parse_request(message) {
        Ok(Request::Summary) => Ok(summary_message(scenario)),
        Ok(Request::Terrain { column, row }) => {
            terrain_message(scenario, column, row).map_err(|err| err.to_string())
        }
        Err(err) => Err(err.to_string()),
    };
    reply.unwrap_or_else(|reason| {
        debug!(target: "imperia::server", %reason, "request.rejected");
        error_message(reason)
    })
}

pub struct ScenarioServer {
    scenario: Scenario,
    listener: TransportListener,
    clients: Vec<TransportSocket>,
}

impl ScenarioServer {
    pub fn new(scenario: Scenario, options: SocketOptions) -> Self {
        Self {
            scenario,
            listener: TransportListener::new(options),
            clients: Vec::new(),
        }
    }

    pub fn start(&mut self, port: u16, scope: ListenScope) -> Result<SocketAddr, TransportError> {
        self.listener.start(port, scope)
    }

    pub fn stop(&mut self) {
        self.listener.stop();
        for client in &mut self.clients {
            client.disconnect();
        }
        self.clients.clear();
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn scenario_mut(&mut self) -> &mut Scenario {
        &mut self.scenario
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// One reactor pass. Returns the number of messages answered.
    pub fn tick(&mut self) -> usize {
        for event in self.listener.poll() {
            match event {
                ListenerEvent::NewClient(mut socket) => {
                    let summary = summary_message(&self.scenario);
                    if let Err(err) = socket.send(&summary) {
                        warn!(target: "imperia::server", error = %err, "client.greeting_failed");
                        continue;
                    }
                    info!(
                        target: "imperia::server",
                        peer = ?socket.peer_address(),
                        clients = self.clients.len() + 1,
                        "client.joined"
                    );
                    self.clients.push(socket);
                }
                ListenerEvent::AcceptError(kind) => {
                    warn!(target: "imperia::server", ?kind, "client.accept_failed");
                }
            }
        }

        let mut answered = 0;
        for client in &mut self.clients {
            for event in client.poll() {
                match event {
                    SocketEvent::Received(message) => {
                        trace!(target: "imperia::server", ?message, "request.received");
                        let reply = handle_message(&self.scenario, &message);
                        if let Err(err) = client.send(&reply) {
                            warn!(target: "imperia::server", error = %err, "reply.failed");
                        } else {
                            answered += 1;
                        }
                    }
                    SocketEvent::Error(kind) => {
                        warn!(
                            target: "imperia::server",
                            peer = ?client.peer_address(),
                            ?kind,
                            "client.error"
                        );
                    }
                    SocketEvent::Connected | SocketEvent::Disconnected => {}
                }
            }
        }

        self.clients.retain_mut(|client| {
            if client.is_connected() {
                return true;
            }
            info!(target: "imperia::server", peer = ?client.peer_address(), "client.left");
            client.disconnect();
            false
        });
        answered
    }
}
