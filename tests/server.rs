//! Socket-level protocol tests: the server is driven through a real TCP
//! connection on an ephemeral port.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use trualias::config::SharedConfig;
use trualias::daemon::{Identity, StatsRegistry, serve};
use trualias::{Mode, compile};

struct TestServer {
    addr: std::net::SocketAddr,
    shared: SharedConfig,
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    fn start(source: &str, mode: Mode) -> TestServer {
        let set = compile(source).expect("config should compile");
        let shared = SharedConfig::new(set);
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let shared = shared.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                serve(
                    listener,
                    shared,
                    StatsRegistry::new(),
                    mode,
                    Arc::new(Identity),
                    shutdown,
                )
                .expect("serve");
            })
        };
        TestServer {
            addr,
            shared,
            shutdown,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> (BufReader<TcpStream>, TcpStream) {
        let stream = TcpStream::connect(self.addr).expect("connect");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        (reader, stream)
    }

    fn query(&self, request: &str) -> String {
        let (mut reader, mut writer) = self.connect();
        writeln!(writer, "{request}").expect("write request");
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response");
        line.trim_end().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const CONFIG: &str =
    "ACCOUNT foo MATCHES \"%account%-%ident%-%code%\" WITH CHAR(1,-), CHARS();\n";

#[test]
fn get_resolves_and_misses() {
    let server = TestServer::start(CONFIG, Mode::Account);
    assert_eq!(server.query("get foo-macys-m5"), "200 foo");
    assert_eq!(server.query("get foo-macys-m6"), "500 not found");
    assert_eq!(server.query("get nobody"), "500 not found");
}

#[test]
fn malformed_requests_get_400() {
    let server = TestServer::start(CONFIG, Mode::Account);
    assert!(server.query("put foo").starts_with("400 "));
    assert!(server.query("get a b").starts_with("400 "));
    assert!(server.query("get foo%2").starts_with("400 "));
}

#[test]
fn keys_are_percent_decoded_and_replies_encoded() {
    let server = TestServer::start(CONFIG, Mode::Account);
    // "foo-macys-m5" with an escaped dash.
    assert_eq!(server.query("get foo%2Dmacys-m5"), "200 foo");
}

#[test]
fn one_connection_serves_many_requests() {
    let server = TestServer::start(CONFIG, Mode::Account);
    let (mut reader, mut writer) = server.connect();
    let mut line = String::new();
    for (request, expected) in [
        ("get foo-macys-m5", "200 foo"),
        ("get foo-google-g6", "200 foo"),
        ("get foo-google-g5", "500 not found"),
    ] {
        writeln!(writer, "{request}").expect("write");
        line.clear();
        reader.read_line(&mut line).expect("read");
        assert_eq!(line.trim_end(), expected);
    }
}

#[test]
fn virtual_mode_maps_within_the_domain() {
    let source = format!("ALIAS DOMAINS: example.com\n{CONFIG}");
    let server = TestServer::start(&source, Mode::Virtual);
    assert_eq!(server.query("get foo-macys-m5@example.com"), "200 foo@example.com");
    assert_eq!(server.query("get foo-macys-m5@other.org"), "500 not found");
    assert_eq!(server.query("get foo-macys-m5"), "500 not found");
}

#[test]
fn stats_and_jstats_commands() {
    let server = TestServer::start(CONFIG, Mode::Account);
    let _ = server.query("get foo-macys-m5");

    let (mut reader, mut writer) = server.connect();
    writeln!(writer, "jstats").expect("write");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let parsed: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    let names: Vec<&str> = parsed
        .as_array()
        .expect("array")
        .iter()
        .map(|b| b["name"].as_str().expect("name"))
        .collect();
    assert!(names.contains(&"success"));
    assert!(names.contains(&"connections"));

    writeln!(writer, "stats").expect("write");
    let mut seen = 0;
    for _ in 0..names.len() {
        line.clear();
        reader.read_line(&mut line).expect("read");
        if line.is_empty() {
            break;
        }
        seen += 1;
    }
    assert_eq!(seen, names.len());
}

// Queries interleaved with a reload see either the old set or the new set,
// never a mixture.
#[test]
fn reload_is_atomic_under_load() {
    let server = TestServer::start(CONFIG, Mode::Account);
    let (mut reader, mut writer) = server.connect();
    let mut line = String::new();

    // Old set: foo resolves, bar does not.
    writeln!(writer, "get foo-macys-m5").expect("write");
    line.clear();
    reader.read_line(&mut line).expect("read");
    assert_eq!(line.trim_end(), "200 foo");

    // Swap in a configuration where bar replaces foo.
    let next = compile("ACCOUNT bar MATCHES \"%account%-%ident%-%code%\" WITH CHAR(1,-), CHARS();\n")
        .expect("compile");
    server.shared.install(next);

    for _ in 0..16 {
        writeln!(writer, "get foo-macys-m5").expect("write");
        line.clear();
        reader.read_line(&mut line).expect("read");
        assert_eq!(line.trim_end(), "500 not found");

        writeln!(writer, "get bar-macys-m5").expect("write");
        line.clear();
        reader.read_line(&mut line).expect("read");
        assert_eq!(line.trim_end(), "200 bar");
    }
}
