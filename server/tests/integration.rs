//! End-to-end tests: a real listener on an ephemeral port, driven through
//! the public packet codec the way a client would.

use std::sync::Arc;

use common::{
    net::{MessageType, Packet, StreamReader, StreamWriter, BUFFER_SIZE},
    utils::net::{recv_packet, send_packet},
};
use filehub_server::{handlers::serve, ServerConfig, ServerCtx};
use tempfile::TempDir;
use tokio::{net::TcpListener, net::TcpStream, sync::Mutex};

struct TestServer {
    addr: std::net::SocketAddr,
    storage: std::path::PathBuf,
    _dir: TempDir,
}

async fn start_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage_root: dir.path().join("files"),
        data_dir: dir.path().join("data"),
    };
    let storage = config.storage_root.clone();
    let ctx = Arc::new(ServerCtx::new(config).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, ctx));

    TestServer {
        addr,
        storage,
        _dir: dir,
    }
}

struct TestClient {
    rd: StreamReader,
    wt: StreamWriter,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wt) = stream.into_split();
        Self {
            rd: Arc::new(Mutex::new(rd)),
            wt: Arc::new(Mutex::new(wt)),
        }
    }

    async fn send(&self, packet: &Packet) {
        send_packet(&self.wt, packet).await.unwrap();
    }

    async fn recv(&self) -> Packet {
        recv_packet(&self.rd).await.unwrap()
    }

    /// One request, one terminal response.
    async fn cmd(&self, kind: MessageType, payload: &str) -> Packet {
        self.send(&Packet::text(kind, payload)).await;
        self.recv().await
    }

    async fn login(&self, username: &str, password: &str) {
        let reply = self
            .cmd(MessageType::Register, &format!("{username} {password}"))
            .await;
        assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
        let reply = self
            .cmd(MessageType::Login, &format!("{username} {password}"))
            .await;
        assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
    }

    /// Uploads `contents` under `name`, returning the terminal response.
    async fn upload(&self, name: &str, contents: &[u8]) -> Packet {
        let reply = self
            .cmd(MessageType::UploadReq, &format!("{name} {}", contents.len()))
            .await;
        if reply.kind != MessageType::Success {
            return reply;
        }
        for chunk in contents.chunks(BUFFER_SIZE) {
            self.send(&Packet::new(MessageType::FileData, chunk.to_vec()))
                .await;
        }
        self.send(&Packet::empty(MessageType::FileEnd)).await;
        self.recv().await
    }

    /// Downloads `name`; `Ok` carries the file bytes, `Err` the ERROR text.
    async fn download(&self, name: &str) -> Result<Vec<u8>, String> {
        let reply = self.cmd(MessageType::DownloadReq, name).await;
        if reply.kind == MessageType::Error {
            return Err(reply.as_text());
        }
        assert_eq!(reply.kind, MessageType::Success);
        let expected: usize = reply.as_text().parse().unwrap();

        let mut contents = Vec::with_capacity(expected);
        loop {
            let packet = self.recv().await;
            match packet.kind {
                MessageType::FileData => contents.extend_from_slice(&packet.payload),
                MessageType::FileEnd => break,
                other => panic!("unexpected packet during download: {other:?}"),
            }
        }
        Ok(contents)
    }

    /// Lists a directory, gathering the chunked LIST_RESPONSE frames up
    /// to their SUCCESS terminator. Returns the first frame unchanged on
    /// an error reply.
    async fn list(&self, path: &str) -> (MessageType, String) {
        self.send(&Packet::text(MessageType::ListFiles, path)).await;
        let first = self.recv().await;
        if first.kind != MessageType::ListResponse {
            return (first.kind, first.as_text());
        }
        let mut text = first.as_text();
        loop {
            let next = self.recv().await;
            match next.kind {
                MessageType::ListResponse => text.push_str(&next.as_text()),
                MessageType::Success => break,
                other => panic!("unexpected packet during listing: {other:?}"),
            }
        }
        (MessageType::ListResponse, text)
    }
}

fn group_id_from_reply(text: &str) -> i64 {
    text.rsplit("ID: ")
        .next()
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn login_state_machine() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;

    // Mutations require authentication.
    let reply = client.cmd(MessageType::CreateFolder, "docs").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Login required");

    let reply = client.cmd(MessageType::Register, "alice pw1").await;
    assert_eq!(reply.kind, MessageType::Success);
    assert!(reply.as_text().contains("ID: 1"), "{}", reply.as_text());

    // Bad credentials do not reveal which half was wrong.
    let reply = client.cmd(MessageType::Login, "alice wrong").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Invalid username or password");

    let reply = client.cmd(MessageType::Login, "alice pw1").await;
    assert_eq!(reply.kind, MessageType::Success);
    assert!(reply.as_text().contains("Welcome alice"));

    // LOGIN while authenticated is rejected, session untouched.
    let reply = client.cmd(MessageType::Login, "alice pw1").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Already logged in");
    let reply = client.cmd(MessageType::CreateFolder, "docs").await;
    assert_eq!(reply.kind, MessageType::Success);

    let reply = client.cmd(MessageType::Logout, "").await;
    assert_eq!(reply.kind, MessageType::Success);
    let reply = client.cmd(MessageType::Logout, "").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Login required");
}

#[tokio::test]
async fn change_pass_and_delete_account() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    let reply = client.cmd(MessageType::ChangePass, "wrong pw2").await;
    assert_eq!(reply.kind, MessageType::Error);
    let reply = client.cmd(MessageType::ChangePass, "pw1 pw2").await;
    assert_eq!(reply.kind, MessageType::Success);

    let reply = client.cmd(MessageType::Logout, "").await;
    assert_eq!(reply.kind, MessageType::Success);
    let reply = client.cmd(MessageType::Login, "alice pw1").await;
    assert_eq!(reply.kind, MessageType::Error);
    let reply = client.cmd(MessageType::Login, "alice pw2").await;
    assert_eq!(reply.kind, MessageType::Success);

    let reply = client.cmd(MessageType::DeleteAccount, "").await;
    assert_eq!(reply.kind, MessageType::Success);
    let reply = client.cmd(MessageType::Login, "alice pw2").await;
    assert_eq!(reply.kind, MessageType::Error);
}

#[tokio::test]
async fn group_membership_gates_uploads() {
    let server = start_server().await;

    let alice = TestClient::connect(server.addr).await;
    alice.login("alice", "pw1").await;
    let reply = alice.cmd(MessageType::CreateGroup, "eng").await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
    let g = group_id_from_reply(&reply.as_text());

    let bob = TestClient::connect(server.addr).await;
    bob.login("bob", "pw2").await;
    let reply = bob.cmd(MessageType::JoinGroup, &g.to_string()).await;
    assert_eq!(reply.kind, MessageType::Success);

    // Pending membership is not enough to write.
    let path = format!("Group_{g}/notes.txt");
    let reply = bob.upload(&path, b"draft").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied: not a group member");
    assert!(!server.storage.join(&path).exists());

    // Owner approves bob; the upload now lands.
    let reply = alice
        .cmd(MessageType::ApproveMember, &format!("{g} 2"))
        .await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
    let reply = bob.upload(&path, b"approved notes").await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
    assert_eq!(
        std::fs::read(server.storage.join(&path)).unwrap(),
        b"approved notes"
    );

    // A third user who never joined is rejected.
    let carol = TestClient::connect(server.addr).await;
    carol.login("carol", "pw3").await;
    let reply = carol.upload(&format!("Group_{g}/sneaky.txt"), b"x").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied: not a group member");

    // Group-owned paths: delete is owner-only.
    let reply = bob.cmd(MessageType::DeleteItem, &path).await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied: group owner only");
    let reply = alice.cmd(MessageType::DeleteItem, &path).await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
}

#[tokio::test]
async fn upload_download_round_trip() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    // Deliberately not a multiple of the chunk size.
    let contents: Vec<u8> = (0..2 * 1024 * 1024 + 7).map(|i| (i % 251) as u8).collect();
    let reply = client.upload("big.bin", &contents).await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());

    let downloaded = client.download("big.bin").await.unwrap();
    assert_eq!(downloaded.len(), contents.len());
    assert_eq!(downloaded, contents);
}

#[tokio::test]
async fn delete_during_download_is_busy() {
    let server = start_server().await;

    // Large enough that the server blocks on socket backpressure while
    // the reader sits on the data, keeping the shared lock held.
    let contents = vec![42u8; 8 * 1024 * 1024];
    std::fs::write(server.storage.join("held.bin"), &contents).unwrap();

    let reader = TestClient::connect(server.addr).await;
    let deleter = TestClient::connect(server.addr).await;
    deleter.login("bob", "pw2").await;

    // Once the SUCCESS length reply arrives the shared lock is held.
    let reply = reader.cmd(MessageType::DownloadReq, "held.bin").await;
    assert_eq!(reply.kind, MessageType::Success);
    assert_eq!(reply.as_text(), contents.len().to_string());

    let reply = deleter.cmd(MessageType::DeleteItem, "held.bin").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "File is busy");

    // Drain the stream; the file was not deleted out from under it.
    let mut received = Vec::new();
    loop {
        let packet = reader.recv().await;
        match packet.kind {
            MessageType::FileData => received.extend_from_slice(&packet.payload),
            MessageType::FileEnd => break,
            other => panic!("unexpected packet: {other:?}"),
        }
    }
    assert_eq!(received, contents);

    // With the transfer finished the delete goes through.
    let reply = deleter.cmd(MessageType::DeleteItem, "held.bin").await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    let reply = client.cmd(MessageType::ListFiles, "../").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied");

    let reply = client.cmd(MessageType::DeleteItem, "../../etc/passwd").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied");

    let reply = client
        .cmd(MessageType::CreateFolder, "a/../../escape")
        .await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Access denied");
}

#[tokio::test]
async fn listing_marks_directories() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    let (kind, listing) = client.list("").await;
    assert_eq!(kind, MessageType::ListResponse);
    assert_eq!(listing, "(empty)");

    assert_eq!(
        client.cmd(MessageType::CreateFolder, "docs").await.kind,
        MessageType::Success
    );
    let reply = client.upload("readme.txt", b"hello").await;
    assert_eq!(reply.kind, MessageType::Success);

    let (kind, listing) = client.list("").await;
    assert_eq!(kind, MessageType::ListResponse);
    assert_eq!(listing, "docs/\nreadme.txt");

    let (kind, text) = client.list("missing").await;
    assert_eq!(kind, MessageType::Error);
    assert_eq!(text, "Folder not found");
}

#[tokio::test]
async fn large_listing_spans_frames_without_dropping_the_connection() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    // Enough names that the rendered listing cannot fit one frame.
    let stem = "x".repeat(24);
    for i in 0..200 {
        std::fs::write(server.storage.join(format!("file-{i:04}-{stem}.txt")), b"x").unwrap();
    }

    let (kind, listing) = client.list("").await;
    assert_eq!(kind, MessageType::ListResponse);
    assert!(listing.len() > BUFFER_SIZE);
    assert_eq!(listing.lines().count(), 200);
    assert!(listing.lines().next().unwrap().starts_with("file-0000-"));

    // The session survives and keeps serving requests.
    let reply = client.cmd(MessageType::CreateFolder, "after").await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
}

#[tokio::test]
async fn out_of_band_types_get_error_response() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;

    let reply = client.cmd(MessageType::FileEnd, "").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Unknown command");

    // The connection stays usable afterwards.
    let (kind, listing) = client.list("").await;
    assert_eq!(kind, MessageType::ListResponse);
    assert_eq!(listing, "(empty)");
}

#[tokio::test]
async fn oversized_frame_tears_down_the_connection() {
    use tokio::io::AsyncWriteExt;

    let server = start_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let mut frame = Vec::new();
    frame.extend_from_slice(&(MessageType::FileData as u32).to_le_bytes());
    frame.extend_from_slice(&((BUFFER_SIZE as i32) + 1).to_le_bytes());
    stream.write_all(&frame).await.unwrap();

    // The server drops the connection without reading further.
    let (rd, _wt) = stream.into_split();
    let rd: StreamReader = Arc::new(Mutex::new(rd));
    assert!(recv_packet(&rd).await.is_err());

    // And keeps serving new connections.
    let client = TestClient::connect(server.addr).await;
    let reply = client.cmd(MessageType::Connect, "").await;
    assert_eq!(reply.kind, MessageType::Success);
}

#[tokio::test]
async fn rename_collision_leaves_both_files() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    assert_eq!(client.upload("a.txt", b"aaa").await.kind, MessageType::Success);
    assert_eq!(client.upload("b.txt", b"bbb").await.kind, MessageType::Success);

    let reply = client.cmd(MessageType::RenameItem, "a.txt b.txt").await;
    assert_eq!(reply.kind, MessageType::Error);
    assert_eq!(reply.as_text(), "Destination already exists");

    assert_eq!(client.download("a.txt").await.unwrap(), b"aaa");
    assert_eq!(client.download("b.txt").await.unwrap(), b"bbb");
}

#[tokio::test]
async fn copy_then_delete_source_keeps_duplicate() {
    let server = start_server().await;
    let client = TestClient::connect(server.addr).await;
    client.login("alice", "pw1").await;

    assert_eq!(
        client.cmd(MessageType::CreateFolder, "backup").await.kind,
        MessageType::Success
    );
    assert_eq!(
        client.upload("data.csv", b"1,2,3\n").await.kind,
        MessageType::Success
    );

    let reply = client.cmd(MessageType::CopyItem, "data.csv backup").await;
    assert_eq!(reply.kind, MessageType::Success, "{}", reply.as_text());
    let reply = client.cmd(MessageType::DeleteItem, "data.csv").await;
    assert_eq!(reply.kind, MessageType::Success);

    assert_eq!(client.download("backup/data.csv").await.unwrap(), b"1,2,3\n");
    assert!(client.download("data.csv").await.is_err());
}
