#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use imperia_core::scenario::TITLE;
use imperia_core::{Scenario, TilePosition};
use imperia_net::{
    ListenScope, ListenerEvent, SocketEvent, SocketOptions, TransportListener, TransportSocket,
    Value,
};
use rand::{rngs::SmallRng, Rng};

pub const DEADLINE: Duration = Duration::from_secs(5);

/// Poll `socket` until `want` events were collected or the deadline passes.
pub fn collect_events(socket: &mut TransportSocket, want: usize) -> Vec<SocketEvent> {
    let deadline = Instant::now() + DEADLINE;
    let mut events = Vec::new();
    while events.len() < want && Instant::now() < deadline {
        events.extend(socket.poll());
        thread::sleep(Duration::from_millis(2));
    }
    events
}

/// Messages only, skipping lifecycle events.
pub fn collect_messages(socket: &mut TransportSocket, want: usize) -> Vec<Value> {
    let deadline = Instant::now() + DEADLINE;
    let mut messages = Vec::new();
    while messages.len() < want && Instant::now() < deadline {
        for event in socket.poll() {
            if let SocketEvent::Received(value) = event {
                messages.push(value);
            }
        }
        thread::sleep(Duration::from_millis(2));
    }
    messages
}

pub fn accept_one(listener: &mut TransportListener) -> TransportSocket {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        for event in listener.poll() {
            match event {
                ListenerEvent::NewClient(socket) => return socket,
                ListenerEvent::AcceptError(kind) => panic!("accept failed: {kind:?}"),
            }
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("no client connected before the deadline");
}

/// Listener plus a connected client/server socket pair on loopback.
pub fn connected_pair() -> (TransportListener, TransportSocket, TransportSocket) {
    let mut listener = TransportListener::default();
    let addr = listener
        .start(0, ListenScope::Local)
        .expect("loopback listener starts");
    let mut client = TransportSocket::new(SocketOptions::default());
    client
        .connect("local", addr.port())
        .expect("client connects to loopback listener");
    let server = accept_one(&mut listener);
    (listener, client, server)
}

/// Random but valid scenario: populated map, provinces with tiles and
/// properties, nations owning at least one province.
pub fn random_scenario(rng: &mut SmallRng) -> Scenario {
    let columns = rng.gen_range(1..30);
    let rows = rng.gen_range(1..30);
    let mut scenario = Scenario::default();
    scenario.set_property(TITLE, format!("Scenario {}", rng.gen::<u16>()));
    scenario.set_property("start.year", rng.gen_range(1800..1900));
    scenario.set_property("difficulty", rng.gen_range(0.0..1.0));
    scenario.create_map(columns, rows).expect("positive dimensions");

    for row in 0..rows {
        for column in 0..columns {
            scenario
                .set_terrain_at(column, row, rng.gen_range(0..12))
                .expect("in bounds");
            if rng.gen_bool(0.2) {
                scenario
                    .set_resource_at(column, row, rng.gen_range(1..6))
                    .expect("in bounds");
            }
        }
    }

    let province_count = rng.gen_range(1..8);
    for index in 0..province_count {
        let province = scenario.new_province();
        scenario
            .set_province_property(province, "name", format!("Province {index}"))
            .expect("province exists");
        for _ in 0..rng.gen_range(1..6) {
            let tile = TilePosition::new(rng.gen_range(0..columns), rng.gen_range(0..rows));
            scenario
                .add_province_tile(province, tile)
                .expect("tile in bounds");
        }
    }

    let nation_count = rng.gen_range(1..4);
    for index in 0..nation_count {
        let nation = scenario.new_nation();
        scenario
            .set_nation_property(nation, "name", format!("Nation {index}"))
            .expect("nation exists");
    }
    for province in scenario.all_provinces().collect::<Vec<_>>() {
        let nation = imperia_core::NationId(rng.gen_range(0..nation_count));
        scenario
            .transfer_province_to_nation(province, nation)
            .expect("ids exist");
    }

    let river: Vec<TilePosition> = (0..rng.gen_range(0..5))
        .map(|_| TilePosition::new(rng.gen_range(0..columns), rng.gen_range(0..rows)))
        .collect();
    scenario.add_river("River", river).expect("tiles in bounds");
    scenario
}
