//! Behavioural tests for accepting, serving and draining WebSocket clients.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use shuttle_config::{CodecKind, Config, LogFormat, ServerEndpoint};

use crate::demo::DemoTimings;
use crate::dispatch::{Connection, DelimitedCodec, Envelope, Message};
use crate::server::{self, ActiveConnections, RunningServer};
use crate::transport::{
    ListenerError, ListenerHandle, SocketListener, WebSocketTransport, WebSocketUpgrade,
};

use super::support::EchoClient;

const PATH: &str = "/echo";
const SETTLE: Duration = Duration::from_secs(2);

type Stopping = JoinHandle<Result<usize, String>>;

struct LifecycleWorld {
    endpoint: ServerEndpoint,
    listener: Option<ListenerHandle>,
    connections: ActiveConnections,
    address: Option<SocketAddr>,
    clients: HashMap<String, EchoClient>,
    bind_error: Option<ListenerError>,
    reserved: Option<TcpListener>,
    server: Option<RunningServer>,
    stopping: Option<Stopping>,
}

impl LifecycleWorld {
    fn new() -> Self {
        Self {
            endpoint: ServerEndpoint::new("127.0.0.1", 0, PATH),
            listener: None,
            connections: ActiveConnections::default(),
            address: None,
            clients: HashMap::new(),
            bind_error: None,
            reserved: None,
            server: None,
            stopping: None,
        }
    }

    fn start_ping_listener(&mut self) {
        let tracked = self.connections.clone();
        let setup = move |connection: Connection<WebSocketTransport>| {
            let _open = tracked.enter();
            connection
                .codec(DelimitedCodec)
                .handle("ping", |request: &Envelope| {
                    Ok(Message::new("pong", request.payload().clone()))
                })
                .listen()
        };
        let upgrade = WebSocketUpgrade::new(PATH, setup);
        let started = SocketListener::bind(&self.endpoint).and_then(|listener| {
            self.address = listener.local_addr();
            listener.start(Arc::new(upgrade))
        });
        match started {
            Ok(handle) => self.listener = Some(handle),
            Err(error) => self.bind_error = Some(error),
        }
    }

    fn start_echo_server(&mut self) {
        let config = Config {
            endpoint: self.endpoint.clone(),
            log_format: LogFormat::Compact,
            codec: CodecKind::Delimited,
            shutdown_timeout_ms: 5_000,
            ..Config::default()
        };
        let timings = DemoTimings {
            request1: Duration::from_millis(10),
            request2: Duration::from_millis(10),
        };
        let running = server::start(&config, timings).expect("start server");
        self.address = running.local_addr();
        self.server = Some(running);
    }

    fn connect(&mut self, name: &str) {
        let addr = self.address.expect("listener address set");
        let client = EchoClient::connect(addr, PATH).expect("client upgrades");
        self.clients.insert(name.to_owned(), client);
    }

    fn client(&mut self, name: &str) -> &mut EchoClient {
        self.clients.get_mut(name).expect("client connected")
    }

    fn refuses_new_clients(&self) -> bool {
        let addr = self.address.expect("listener address set");
        let deadline = Instant::now() + SETTLE;
        while Instant::now() < deadline {
            match EchoClient::connect(addr, PATH) {
                Err(_) => return true,
                Ok(late) => drop(late),
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl Drop for LifecycleWorld {
    fn drop(&mut self) {
        self.clients.clear();
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            handle.join().ok();
        }
        if let Some(running) = self.server.take() {
            running.stop().ok();
        }
        if let Some(stopping) = self.stopping.take() {
            stopping.join().ok();
        }
        self.reserved = None;
    }
}

#[fixture]
fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"')
}

#[given("a WebSocket listener answering ping requests")]
fn given_ping_listener(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().start_ping_listener();
    let bind_error = world.borrow().bind_error.as_ref().map(ToString::to_string);
    assert!(bind_error.is_none(), "listener start failed: {bind_error:?}");
}

#[given("a TCP socket is already bound")]
fn given_bound_port(world: &RefCell<LifecycleWorld>) {
    let reserved = TcpListener::bind(("127.0.0.1", 0)).expect("bind reserved port");
    let port = reserved.local_addr().expect("local addr").port();
    let mut world = world.borrow_mut();
    world.endpoint = ServerEndpoint::new("127.0.0.1", port, PATH);
    world.reserved = Some(reserved);
}

#[given("an echo server with one open client")]
fn given_echo_server_with_client(world: &RefCell<LifecycleWorld>) {
    let mut world = world.borrow_mut();
    world.start_echo_server();
    world.connect("open");
}

#[when(r#"clients "{first}" and "{second}" connect"#)]
fn when_clients_connect(world: &RefCell<LifecycleWorld>, first: String, second: String) {
    let mut world = world.borrow_mut();
    world.connect(strip_quotes(&first));
    world.connect(strip_quotes(&second));
}

#[when("a WebSocket listener starts on the same port")]
fn when_listener_starts_on_same_port(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().start_ping_listener();
}

#[when("the server begins stopping")]
fn when_server_begins_stopping(world: &RefCell<LifecycleWorld>) {
    let mut world = world.borrow_mut();
    let running = world.server.take().expect("server running");
    world.stopping = Some(thread::spawn(move || {
        running.stop().map_err(|error| error.to_string())
    }));
}

#[when("the open client disconnects")]
fn when_open_client_disconnects(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().clients.remove("open");
}

#[then("the listener tracks {count} open connections")]
fn then_listener_tracks(world: &RefCell<LifecycleWorld>, count: usize) {
    let connections = world.borrow().connections.clone();
    let deadline = Instant::now() + SETTLE;
    while connections.count() < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(connections.count(), count);
}

#[then(r#"client "{name}" is answered "{reply}""#)]
fn then_client_is_answered(world: &RefCell<LifecycleWorld>, name: String, reply: String) {
    let name = strip_quotes(&name);
    let mut world = world.borrow_mut();
    let client = world.client(name);
    client.send_text(&format!("ping##{name}"));
    assert_eq!(client.recv_text(), strip_quotes(&reply));
}

#[then("starting the listener fails with a bind error")]
fn then_bind_fails(world: &RefCell<LifecycleWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.bind_error, Some(ListenerError::BindTcp { .. })),
        "expected a bind error, got {:?}",
        world.bind_error
    );
}

#[then("new clients are refused")]
fn then_new_clients_refused(world: &RefCell<LifecycleWorld>) {
    assert!(
        world.borrow().refuses_new_clients(),
        "listener kept accepting after stop began"
    );
}

#[then("the open client is still answered")]
fn then_open_client_answered(world: &RefCell<LifecycleWorld>) {
    let mut world = world.borrow_mut();
    let client = world.client("open");
    client.send_text("request1##late");
    assert_eq!(client.recv_text(), "response1##echo: late");
}

#[then("the server stops with no connections left open")]
fn then_server_stops_drained(world: &RefCell<LifecycleWorld>) {
    let stopping = world.borrow_mut().stopping.take().expect("stop in progress");
    let remaining = stopping.join().expect("stop thread");
    assert_eq!(remaining, Ok(0));
}

#[scenario(
    path = "tests/features/listener_lifecycle.feature",
    name = "Each upgraded client is served on its own connection"
)]
fn upgraded_clients_are_served(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/listener_lifecycle.feature",
    name = "A port that is already bound cannot be reused"
)]
fn bound_port_is_rejected(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/listener_lifecycle.feature",
    name = "Stopping the server drains open connections"
)]
fn stopping_drains_connections(#[from(world)] world: RefCell<LifecycleWorld>) {
    drop(world);
}
