//! End-to-end tests over a real TCP socket.

use bytes::BytesMut;
use protocol::frame::{self, Frame};
use protocol::handshake;
use protocol::messages::DeltaEntry;
use protocol::{Opcode, ServerMessage};
use server::Config;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const MASK: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

async fn start_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = Config::default();
    config.server.seed = Some(7);
    config.orbs.target = 5;
    tokio::spawn(server::serve(listener, config));
    addr
}

struct Client {
    stream: TcpStream,
    buf: BytesMut,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET / HTTP/1.1\r\nHost: {addr}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {KEY}\r\nSec-WebSocket-Version: 13\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut buf = BytesMut::with_capacity(4096);
        let end = loop {
            if let Some(end) = handshake::find_header_end(&buf) {
                break end;
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert!(n > 0, "server closed during handshake");
        };
        let head = buf.split_to(end);
        let head = String::from_utf8(head.to_vec()).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(head.contains(&format!("Sec-WebSocket-Accept: {}", handshake::accept_key(KEY))));

        Self { stream, buf }
    }

    async fn send_text(&mut self, text: &str) {
        let bytes = frame::encode_masked(Opcode::Text, text.as_bytes(), MASK);
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = frame::decode(&mut self.buf, 1 << 20).unwrap() {
                return frame;
            }
            let n = timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    async fn next_message(&mut self) -> ServerMessage {
        loop {
            let frame = self.next_frame().await;
            if frame.opcode == Opcode::Text {
                return serde_json::from_str(frame.text().unwrap()).unwrap();
            }
        }
    }

    /// Read until the server sends a close frame or hangs up.
    async fn wait_closed(&mut self) {
        loop {
            if let Some(frame) = frame::decode(&mut self.buf, 1 << 20).unwrap() {
                if frame.opcode == Opcode::Close {
                    return;
                }
                continue;
            }
            let read = timeout(Duration::from_secs(5), self.stream.read_buf(&mut self.buf))
                .await
                .expect("server kept the connection open");
            if matches!(read, Ok(0) | Err(_)) {
                return;
            }
        }
    }

    async fn join(&mut self, name: &str) -> String {
        self.next_message().await;
        self.send_text(&format!(r#"{{"type":"join","name":"{name}"}}"#)).await;
        self.wait_for(|message| match message {
            ServerMessage::Welcome { id, .. } => Some(id),
            _ => None,
        })
        .await
    }

    /// Skip deltas and other traffic until `pick` accepts a message.
    async fn wait_for<T>(&mut self, mut pick: impl FnMut(ServerMessage) -> Option<T>) -> T {
        loop {
            if let Some(found) = pick(self.next_message().await) {
                return found;
            }
        }
    }
}

#[tokio::test]
async fn test_handshake_hello_and_join() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;

    match client.next_message().await {
        ServerMessage::Hello {
            arena_size, orbs, ..
        } => {
            assert_eq!(arena_size, 2000.0);
            assert_eq!(orbs.len(), 5);
        }
        other => panic!("expected hello, got {:?}", other),
    }

    client
        .send_text(r#"{"type":"join","name":"ada","avatar":"robot"}"#)
        .await;
    let (id, players) = client
        .wait_for(|message| match message {
            ServerMessage::Welcome { id, players, .. } => Some((id, players)),
            _ => None,
        })
        .await;
    let me = players.iter().find(|p| p.id == id).unwrap();
    assert_eq!(me.name, "ada");
    assert_eq!(me.avatar, "robot");
    assert!(me.alive);
}

#[tokio::test]
async fn test_second_client_sees_spawn() {
    let addr = start_server().await;
    let mut first = Client::connect(addr).await;
    first.next_message().await;
    first.send_text(r#"{"type":"join","name":"one"}"#).await;
    first
        .wait_for(|m| matches!(m, ServerMessage::Welcome { .. }).then_some(()))
        .await;

    let mut second = Client::connect(addr).await;
    second.next_message().await;
    second.send_text(r#"{"type":"auto"}"#).await;

    let spawned = first
        .wait_for(|message| match message {
            ServerMessage::Spawn { player } if player.name != "one" => Some(player),
            _ => None,
        })
        .await;
    assert!(!spawned.name.is_empty());
}

#[tokio::test]
async fn test_ping_is_answered() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    client.next_message().await;

    let ping = frame::encode_masked(Opcode::Ping, b"lan", MASK);
    client.stream.write_all(&ping).await.unwrap();

    loop {
        let frame = client.next_frame().await;
        if frame.opcode == Opcode::Pong {
            assert_eq!(&frame.payload[..], b"lan");
            break;
        }
    }
}

#[tokio::test]
async fn test_bad_handshake_is_dropped_without_reply() {
    let addr = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: lan\r\n\r\n")
        .await
        .unwrap();

    let mut buf = Vec::new();
    let n = timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server kept the connection open")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_close_frame_ends_session() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    client.next_message().await;

    let close = frame::encode_masked(Opcode::Close, b"", MASK);
    client.stream.write_all(&close).await.unwrap();

    // The server answers with its own close frame and then hangs up.
    loop {
        let frame = client.next_frame().await;
        if frame.opcode == Opcode::Close {
            break;
        }
    }
}

#[tokio::test]
async fn test_oversized_frame_drops_connection() {
    let addr = start_server().await;
    let mut watcher = Client::connect(addr).await;
    watcher.next_message().await;
    let mut client = Client::connect(addr).await;
    let id = client.join("big").await;

    // Text frame declaring a 1 MiB payload, far above the configured cap.
    let mut header = vec![0x81, 0x80 | 127];
    header.extend_from_slice(&(1u64 << 20).to_be_bytes());
    header.extend_from_slice(&MASK);
    client.stream.write_all(&header).await.unwrap();
    client.wait_closed().await;

    let gone = watcher
        .wait_for(|message| match message {
            ServerMessage::Despawn { id } => Some(id),
            _ => None,
        })
        .await;
    assert_eq!(gone, id);
}

#[tokio::test]
async fn test_invalid_text_and_binary_frames_are_ignored() {
    let addr = start_server().await;
    let mut client = Client::connect(addr).await;
    let id = client.join("steady").await;

    let invalid = frame::encode_masked(Opcode::Text, &[0xff, 0xfe, 0xfd], MASK);
    client.stream.write_all(&invalid).await.unwrap();
    let binary = frame::encode_masked(Opcode::Binary, &[1, 2, 3], MASK);
    client.stream.write_all(&binary).await.unwrap();
    client.send_text(r#"{"type":"input","boost":true}"#).await;

    let boosted = client
        .wait_for(|message| match message {
            ServerMessage::Delta { players } => players
                .into_iter()
                .find(|entry: &DeltaEntry| entry.id() == id && entry.5),
            _ => None,
        })
        .await;
    assert!(boosted.4);
}
