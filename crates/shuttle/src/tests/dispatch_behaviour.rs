//! Behavioural tests for the echo server over real WebSocket connections.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use shuttle_config::{CodecKind, Config, LogFormat, ServerEndpoint};

use crate::demo::DemoTimings;
use crate::server::{self, RunningServer};

use super::support::EchoClient;

const PATH: &str = "/echo";

struct DispatchWorld {
    server: Option<RunningServer>,
    address: Option<SocketAddr>,
    client: Option<EchoClient>,
    upgrade_error: Option<String>,
}

impl DispatchWorld {
    fn new() -> Self {
        Self {
            server: None,
            address: None,
            client: None,
            upgrade_error: None,
        }
    }

    fn start_server(&mut self, codec: CodecKind) {
        let config = Config {
            endpoint: ServerEndpoint::new("127.0.0.1", 0, PATH),
            log_format: LogFormat::Compact,
            codec,
            shutdown_timeout_ms: 1_000,
            ..Config::default()
        };
        let timings = DemoTimings {
            request1: Duration::from_millis(10),
            request2: Duration::from_millis(400),
        };
        let server = server::start(&config, timings).expect("start server");
        self.address = server.local_addr();
        self.server = Some(server);
    }

    fn connect(&mut self, path: &str) {
        let addr = self.address.expect("server address set");
        match EchoClient::connect(addr, path) {
            Ok(client) => self.client = Some(client),
            Err(error) => self.upgrade_error = Some(error),
        }
    }

    fn client(&mut self) -> &mut EchoClient {
        if self.client.is_none() {
            self.connect(PATH);
        }
        self.client.as_mut().expect("client connected")
    }

    fn next_json_reply(&mut self) -> Value {
        let text = self.client().recv_text();
        serde_json::from_str(&text).expect("reply is JSON")
    }
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        self.client = None;
        if let Some(server) = self.server.take() {
            server.stop().ok();
        }
    }
}

#[fixture]
fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::new())
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"')
}

#[given("an echo server using the {codec} codec")]
fn given_echo_server(world: &RefCell<DispatchWorld>, codec: String) {
    let codec: CodecKind = codec.parse().expect("known codec");
    world.borrow_mut().start_server(codec);
}

#[when(r#"the client sends "{first}" and then "{second}""#)]
fn when_client_sends_two(world: &RefCell<DispatchWorld>, first: String, second: String) {
    let mut world = world.borrow_mut();
    let client = world.client();
    client.send_text(strip_quotes(&first));
    client.send_text(strip_quotes(&second));
}

#[when(r#"the client sends the frame "{frame}""#)]
fn when_client_sends_frame(world: &RefCell<DispatchWorld>, frame: String) {
    world.borrow_mut().client().send_text(strip_quotes(&frame));
}

#[when(r#"the client sends a JSON "{message_type}" request with message "{message}""#)]
fn when_client_sends_json_message(
    world: &RefCell<DispatchWorld>,
    message_type: String,
    message: String,
) {
    let frame = json!({
        "type": strip_quotes(&message_type),
        "body": { "message": strip_quotes(&message) },
    });
    world.borrow_mut().client().send_text(&frame.to_string());
}

#[when(r#"the client sends a JSON "{message_type}" request with body "{body}""#)]
fn when_client_sends_json_body(world: &RefCell<DispatchWorld>, message_type: String, body: String) {
    let frame = json!({
        "type": strip_quotes(&message_type),
        "body": strip_quotes(&body),
    });
    world.borrow_mut().client().send_text(&frame.to_string());
}

#[when("the client sends a JSON frame without a type")]
fn when_client_sends_untyped_json(world: &RefCell<DispatchWorld>) {
    world
        .borrow_mut()
        .client()
        .send_text(r#"{"body":"no type"}"#);
}

#[when(r#"a client connects on path "{path}""#)]
fn when_client_connects_on_path(world: &RefCell<DispatchWorld>, path: String) {
    world.borrow_mut().connect(strip_quotes(&path));
}

#[then(r#"the next reply is "{expected}""#)]
fn then_next_reply_is(world: &RefCell<DispatchWorld>, expected: String) {
    let reply = world.borrow_mut().client().recv_text();
    assert_eq!(reply, strip_quotes(&expected));
}

#[then("the next reply is an error")]
fn then_next_reply_is_error(world: &RefCell<DispatchWorld>) {
    let reply = world.borrow_mut().next_json_reply();
    assert_eq!(reply["type"], json!("error"), "unexpected reply: {reply}");
}

#[then(r#"the next reply has type "{message_type}" and body "{body}""#)]
fn then_next_reply_has(world: &RefCell<DispatchWorld>, message_type: String, body: String) {
    let reply = world.borrow_mut().next_json_reply();
    assert_eq!(
        reply,
        json!({ "type": strip_quotes(&message_type), "body": strip_quotes(&body) })
    );
}

#[then("the upgrade is refused")]
fn then_upgrade_refused(world: &RefCell<DispatchWorld>) {
    let world = world.borrow();
    assert!(world.client.is_none(), "upgrade unexpectedly succeeded");
    assert!(
        world.upgrade_error.is_some(),
        "expected the handshake to report an error"
    );
}

#[scenario(
    path = "tests/features/echo_dispatch.feature",
    name = "Replies arrive in completion order"
)]
fn replies_in_completion_order(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/echo_dispatch.feature",
    name = "Unknown request types are answered with an error"
)]
fn unknown_types_answered(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/echo_dispatch.feature",
    name = "JSON request1 replies with the message field"
)]
fn json_request1_replies(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/echo_dispatch.feature",
    name = "Malformed JSON frames are answered with an error"
)]
fn malformed_json_answered(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/echo_dispatch.feature",
    name = "Upgrades on other paths are refused"
)]
fn other_paths_refused(#[from(world)] world: RefCell<DispatchWorld>) {
    drop(world);
}
