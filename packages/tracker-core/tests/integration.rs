//! End-to-end tests running real tracker listeners on the loopback
//! interface: a scripted client session against one tracker, and two
//! sibling trackers converging through replication.
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use peergrid_primitives::PeerAddress;
use peergrid_tracker_core::handler::CommandHandler;
use peergrid_tracker_core::replication::Replicator;
use peergrid_tracker_core::session::run_tracker;
use peergrid_tracker_core::state::TrackerState;
use peergrid_wire_protocol::framing::{read_frame, write_frame};
use peergrid_worker_pool::WorkerPool;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

async fn start_tracker(siblings: Vec<PeerAddress>) -> (PeerAddress, Arc<TrackerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = PeerAddress::from(listener.local_addr().unwrap());

    let state = Arc::new(TrackerState::new());
    let handler = Arc::new(CommandHandler::new(&state));
    let replicator = Arc::new(Replicator::new(siblings));

    tokio::spawn(run_tracker(listener, handler, replicator, WorkerPool::new(4)));

    (address, state)
}

fn listen_address(port: u16) -> PeerAddress {
    PeerAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn sample_manifest_wire(group: &str, owner: &str, listen: PeerAddress) -> String {
    format!(
        "report.pdf|/home/{owner}/report.pdf|{owner}|{group}|1048676|524288|{full}|{p0},{p1},{p2}|{owner}:{ip}:{port}|{owner}:/home/{owner}/report.pdf",
        full = "f".repeat(64),
        p0 = "a".repeat(64),
        p1 = "b".repeat(64),
        p2 = "c".repeat(64),
        ip = listen.ip,
        port = listen.port,
    )
}

struct ScriptedClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ScriptedClient {
    /// Connects and performs the `<ip>  <port>` handshake announcing
    /// `listen` as this peer's piece-serving address.
    async fn connect(tracker: PeerAddress, listen: PeerAddress) -> Self {
        let stream = TcpStream::connect(tracker.socket_addr()).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer,
        };

        client
            .writer
            .write_all(format!("{}  {}\n", listen.ip, listen.port).as_bytes())
            .await
            .unwrap();

        client
    }

    async fn send(&mut self, line: &str) -> String {
        self.writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        self.read_line().await
    }

    async fn read_line(&mut self) -> String {
        let mut reply = String::new();
        self.reader.read_line(&mut reply).await.unwrap();
        reply.trim_end().to_string()
    }

    async fn send_framed(&mut self, body: &str) {
        write_frame(&mut self.writer, body.as_bytes()).await.unwrap();
    }

    async fn send_expecting_frame(&mut self, line: &str) -> String {
        self.writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        let frame = read_frame(&mut self.reader).await.unwrap();
        String::from_utf8(frame).unwrap()
    }
}

#[tokio::test]
async fn a_client_should_register_login_and_share_a_file_over_the_wire() {
    let (tracker, state) = start_tracker(Vec::new()).await;
    let listen = listen_address(7001);

    let mut client = ScriptedClient::connect(tracker, listen).await;

    assert_eq!(
        client.send("create_user alice secret").await,
        "User created successfully. Please login now."
    );
    assert_eq!(client.send("login alice secret").await, "Login successful.");
    assert_eq!(client.send("create_group g1").await, "Group is registered as g1.");
    assert_eq!(client.send("list_groups").await, "g1");

    // Upload: gate, then the framed manifest.
    assert_eq!(
        client.send("upload_file g1 /home/alice/report.pdf").await,
        "send_all_data."
    );
    client
        .send_framed(&format!("upload_file_data {}", sample_manifest_wire("g1", "alice", listen)))
        .await;
    assert_eq!(
        client.read_line().await,
        "File name report.pdf is successfully added in group g1."
    );

    assert!(state.files.exists("g1", "report.pdf"));
    assert_eq!(client.send("list_files g1").await, "report.pdf");
}

#[tokio::test]
async fn a_download_reply_should_arrive_framed() {
    let (tracker, _state) = start_tracker(Vec::new()).await;

    let alice_listen = listen_address(7002);
    let mut alice = ScriptedClient::connect(tracker, alice_listen).await;
    alice.send("create_user alice secret").await;
    alice.send("login alice secret").await;
    alice.send("create_group g1").await;
    alice.send("upload_file g1 /home/alice/report.pdf").await;
    alice
        .send_framed(&format!("upload_file_data {}", sample_manifest_wire("g1", "alice", alice_listen)))
        .await;
    alice.read_line().await;

    let mut bob = ScriptedClient::connect(tracker, listen_address(7003)).await;
    bob.send("create_user bob hunter2").await;
    bob.send("login bob hunter2").await;
    bob.send("join_group g1").await;
    alice.send("accept_request g1 bob").await;

    let reply = bob.send_expecting_frame("download_file g1 report.pdf").await;

    assert!(reply.starts_with("file_data "), "unexpected reply: {reply}");
    assert!(reply.contains(&format!("alice:{}:{}", alice_listen.ip, alice_listen.port)));

    // Failure replies on this path are framed too.
    let missing = bob.send_expecting_frame("download_file g1 nope.pdf").await;
    assert!(missing.contains("does not exist"));
}

#[tokio::test]
async fn a_malformed_command_should_keep_the_session_open() {
    let (tracker, _state) = start_tracker(Vec::new()).await;
    let mut client = ScriptedClient::connect(tracker, listen_address(7004)).await;

    assert_eq!(client.send("login alice").await, "Usage: login <username> <password>");
    assert_eq!(client.send("frobnicate").await, "Please, Enter valid command.");

    // Still usable afterwards.
    assert_eq!(
        client.send("create_user alice secret").await,
        "User created successfully. Please login now."
    );
}

#[tokio::test]
async fn two_sibling_trackers_should_converge_on_a_created_group() {
    let (tracker_b, state_b) = start_tracker(Vec::new()).await;
    let (tracker_a, state_a) = start_tracker(vec![tracker_b]).await;

    let mut client = ScriptedClient::connect(tracker_a, listen_address(7005)).await;
    client.send("create_user alice secret").await;
    client.send("login alice secret").await;
    client.send("create_group g1").await;

    assert!(state_a.groups.exists("g1"));

    // Replication is asynchronous; poll the sibling until it converges.
    let mut converged = false;
    for _ in 0..100 {
        if state_b.groups.exists("g1") && state_b.users.is_logged_in("alice") {
            converged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(converged, "sibling tracker never applied the replicated mutations");
    assert_eq!(state_b.groups.owner_of("g1"), Some("alice".to_string()));
}

#[tokio::test]
async fn an_unexpected_disconnect_should_log_the_user_out() {
    let (tracker, state) = start_tracker(Vec::new()).await;

    {
        let mut client = ScriptedClient::connect(tracker, listen_address(7006)).await;
        client.send("create_user alice secret").await;
        client.send("login alice secret").await;
        assert!(state.users.is_logged_in("alice"));
        // Dropped without logout or exit.
    }

    let mut logged_out = false;
    for _ in 0..100 {
        if !state.users.is_logged_in("alice") {
            logged_out = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(logged_out, "implicit logout never happened");
}
