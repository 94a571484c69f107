//! Socket runtime.
//!
//! The accept loop enforces connection limits, each connection performs the
//! upgrade handshake and then runs a reader and a writer task. Readers turn
//! frames into [`Event`]s for the game task; writers drain the connection's
//! outbound queue.

use crate::config::Config;
use bytes::BytesMut;
use protocol::{Opcode, ProtocolError, frame, handshake};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod game;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionId, Outbound};
pub use game::{Event, GameState, Task, run_game_loop};
pub use registry::{NamePool, Registry};

/// Frames a connection may have queued before it counts as backed up.
const OUTBOUND_CAPACITY: usize = 256;
/// Events queued for the game task before readers wait.
const EVENT_CAPACITY: usize = 1024;
/// Time allowed to complete the upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after an accept failure that is not tied to a single peer.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound streams for the accept loop.
pub trait Acceptor {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn poll_accept(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<(Self::Stream, SocketAddr)>>;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::poll_accept(self, cx).map_ok(|(stream, addr)| {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }
            (stream, addr)
        })
    }
}

/// Why a connection was turned away at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    ServerFull,
    AddressLimit,
}

/// Total and per-address caps on open connections.
#[derive(Debug)]
struct Admission {
    max_total: usize,
    max_per_ip: usize,
    open: Mutex<HashMap<IpAddr, usize>>,
}

impl Admission {
    fn new(max_total: usize, max_per_ip: usize) -> Arc<Self> {
        Arc::new(Self {
            max_total,
            max_per_ip,
            open: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, usize>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a seat for `ip`. The seat is given back when dropped.
    fn admit(self: &Arc<Self>, ip: IpAddr) -> Result<Seat, Refusal> {
        let mut open = self.lock();
        if open.values().sum::<usize>() >= self.max_total {
            return Err(Refusal::ServerFull);
        }
        let here = open.entry(ip).or_insert(0);
        if *here >= self.max_per_ip {
            return Err(Refusal::AddressLimit);
        }
        *here += 1;
        Ok(Seat {
            admission: Arc::clone(self),
            ip,
        })
    }
}

/// An admitted connection's share of the caps.
#[derive(Debug)]
struct Seat {
    admission: Arc<Admission>,
    ip: IpAddr,
}

impl Drop for Seat {
    fn drop(&mut self) {
        let mut open = self.admission.lock();
        if let Entry::Occupied(mut entry) = open.entry(self.ip) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }
}

/// How long to wait before accepting again after `error`.
fn accept_backoff(error: &io::Error) -> Duration {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => Duration::ZERO,
        _ => ACCEPT_BACKOFF,
    }
}

/// Bind the configured address and run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);
    serve(listener, config).await
}

/// Run the game server on an already-bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
    let game = GameState::new(config.clone(), Instant::now());
    tokio::spawn(run_game_loop(game, events_rx));

    accept_loop(listener, events_tx, config).await;
    Ok(())
}

/// Accept connections forever, spawning a task per admitted peer.
///
/// Accept failures are logged and retried; they never end the loop.
async fn accept_loop<A>(mut acceptor: A, events: mpsc::Sender<Event>, config: Config)
where
    A: Acceptor,
{
    let admission = Admission::new(config.server.max_connections, config.server.ip_limit);
    let mut next_id: ConnectionId = 0;

    loop {
        let (stream, addr) = match std::future::poll_fn(|cx| acceptor.poll_accept(cx)).await {
            Ok(accepted) => accepted,
            Err(e) => {
                let pause = accept_backoff(&e);
                warn!("Accept failed: {} (retrying in {:?})", e, pause);
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                continue;
            }
        };

        let seat = match admission.admit(addr.ip()) {
            Ok(seat) => seat,
            Err(Refusal::ServerFull) => {
                warn!("Connection rejected (server full): {}", addr);
                continue;
            }
            Err(Refusal::AddressLimit) => {
                warn!("Connection rejected (too many from address): {}", addr);
                continue;
            }
        };

        next_id += 1;
        let id = next_id;
        let events = events.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let _seat = seat;
            if let Err(e) = handle_connection(stream, id, addr, events, &config).await {
                warn!("Connection {} from {} ended with error: {}", id, addr, e);
            }
        });
    }
}

/// Read the upgrade request, answer it and return any bytes that followed
/// the request head.
async fn accept_handshake<S>(stream: &mut S, max_bytes: usize) -> anyhow::Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let head_len = loop {
        if let Some(end) = handshake::find_header_end(&buf) {
            break end;
        }
        if buf.len() >= max_bytes {
            return Err(ProtocolError::MalformedRequest.into());
        }
        if stream.read_buf(&mut buf).await? == 0 {
            anyhow::bail!("connection closed during handshake");
        }
    };

    let head = buf.split_to(head_len);
    let request = handshake::parse_upgrade_request(&head)?;
    let response = handshake::switching_protocols_response(&handshake::accept_key(&request.key));
    stream.write_all(response.as_bytes()).await?;
    debug!("Upgraded request for {}", request.path);
    Ok(buf)
}

/// Handle a single connection over any byte stream.
pub async fn handle_connection<S>(
    mut stream: S,
    id: ConnectionId,
    addr: SocketAddr,
    events: mpsc::Sender<Event>,
    config: &Config,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = match tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        accept_handshake(&mut stream, config.server.max_handshake_bytes),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("handshake timed out"),
    };

    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
    let (closed_tx, closed_rx) = oneshot::channel::<()>();

    events
        .send(Event::Connected {
            id,
            addr,
            tx: out_tx,
        })
        .await?;

    tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Frame(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        debug!("Write to connection {} failed: {}", id, e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = writer.write_all(&frame::close()).await;
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
        let _ = closed_tx.send(());
    });

    let result = read_frames(
        &mut reader,
        &mut buf,
        id,
        &events,
        closed_rx,
        config.server.max_frame_bytes,
    )
    .await;

    let _ = events.send(Event::Disconnected { id }).await;
    if let Err(e) = &result {
        match e.downcast_ref::<ProtocolError>() {
            Some(protocol_error) => warn!("Protocol error from {}: {}", addr, protocol_error),
            None => error!("Connection error from {}: {}", addr, e),
        }
    }
    result
}

/// Decode frames from the read half and forward them to the game task until
/// the peer closes, the writer stops or the stream errors.
async fn read_frames<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    id: ConnectionId,
    events: &mpsc::Sender<Event>,
    mut closed_rx: oneshot::Receiver<()>,
    max_payload: usize,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        while let Some(frame) = frame::decode(buf, max_payload)? {
            let event = match frame.opcode {
                Opcode::Text => match frame.text() {
                    Ok(text) => Event::Message {
                        id,
                        text: text.to_string(),
                    },
                    Err(e) => {
                        debug!("Connection {} sent invalid text: {}", id, e);
                        Event::Pong { id }
                    }
                },
                Opcode::Close => {
                    info!("Connection {} sent close", id);
                    return Ok(());
                }
                Opcode::Ping => Event::Ping {
                    id,
                    payload: frame.payload,
                },
                Opcode::Pong => Event::Pong { id },
                Opcode::Binary | Opcode::Continuation => {
                    debug!("Ignoring {:?} frame from connection {}", frame.opcode, id);
                    Event::Pong { id }
                }
            };
            events.send(event).await?;
        }

        tokio::select! {
            read = reader.read_buf(buf) => {
                if read? == 0 {
                    return Ok(());
                }
            }
            _ = &mut closed_rx => return Ok(()),
        }
    }
}
