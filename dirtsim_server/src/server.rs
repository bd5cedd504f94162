// TCP server and main event loop for the DirtSim simulation server.
//
// Architecture: thread-per-reader with a central `mpsc` channel. A listener
// thread hands off new connections, one reader thread per client pushes
// inbound requests onto a channel, and a single main thread owns all
// mutable state and is the only writer to any client socket.
//
// There is no turn batching and no broadcast here. Every `Request` gets
// exactly one `Response`, written back to the connection it arrived on.
// The main thread also drives the fixed-rate tick loop itself
// (`recv_timeout` at the tick cadence, stepping the world whenever the
// channel goes quiet for a full tick) — this is the "single owner thread
// drives the active world" model: there is never more than one thread
// touching a `WorldSession`.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dirtsim_core::config::DirtConfig;
use dirtsim_protocol::framing::{read_message, write_message};
use dirtsim_protocol::message::Command;
use dirtsim_protocol::{Request, Response};

use crate::session::WorldSession;

/// Identifies one connected TCP client for the lifetime of its connection.
/// Invented by this server, never sent over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ClientId(u64);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection { stream: TcpStream },
    RequestFrom { client_id: ClientId, request: Request },
    Disconnected { client_id: ClientId },
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a DirtSim server.
pub struct ServerConfig {
    pub port: u16,
    pub width: i32,
    pub height: i32,
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 7878, width: 160, height: 90, seed: 1 }
    }
}

/// Start the server on a background thread. Returns a handle for stopping
/// it and the actual bound address (useful when port 0 is used to let the
/// OS pick a free port).
pub fn start_server(config: ServerConfig) -> std::io::Result<(ServerHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_server(listener, config, keep_running_clone);
    });

    Ok((ServerHandle { keep_running, thread: Some(thread) }, addr))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(listener: TcpListener, config: ServerConfig, keep_running: Arc<AtomicBool>) {
    let mut session = WorldSession::new(config.width, config.height, config.seed);
    let mut writers: BTreeMap<ClientId, BufWriter<TcpStream>> = BTreeMap::new();
    let next_client_id = Arc::new(AtomicU64::new(1));

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running periodically.
    listener.set_nonblocking(true).ok();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(_) => break,
            }
        }
    });

    let tick_duration = Duration::from_secs_f32(DirtConfig::default().dt_seconds());

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(tick_duration) {
            Ok(event) => {
                handle_event(&mut session, &mut writers, event, &tx, &keep_running, &next_client_id);
                // Drain any additional events that arrived during handling
                // before falling back to the tick timeout.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, &mut writers, event, &tx, &keep_running, &next_client_id);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => session.tick(),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Dispatch a single event against the session, writing a response back to
/// the originating client when the event carried a request.
fn handle_event(
    session: &mut WorldSession,
    writers: &mut BTreeMap<ClientId, BufWriter<TcpStream>>,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
    next_client_id: &Arc<AtomicU64>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(stream, writers, tx, keep_running, next_client_id);
        }
        InternalEvent::RequestFrom { client_id, request } => {
            let correlation_id = request.correlation_id;
            let result = session.handle(request.command);
            send_response(writers, client_id, &Response { correlation_id, result });
        }
        InternalEvent::Disconnected { client_id } => {
            writers.remove(&client_id);
        }
    }
}

/// Register a new connection's write half and spawn its reader thread.
fn handle_new_connection(
    stream: TcpStream,
    writers: &mut BTreeMap<ClientId, BufWriter<TcpStream>>,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
    next_client_id: &Arc<AtomicU64>,
) {
    let client_id = ClientId(next_client_id.fetch_add(1, Ordering::SeqCst));
    let Ok(reader_stream) = stream.try_clone() else { return };
    let Ok(writer_stream) = stream.try_clone() else { return };
    writers.insert(client_id, BufWriter::new(writer_stream));

    let tx_reader = tx.clone();
    let keep_running_reader = keep_running.clone();
    thread::spawn(move || {
        reader_loop(BufReader::new(reader_stream), client_id, tx_reader, keep_running_reader);
    });
}

/// Reader loop for a single client. Runs in its own thread, reading framed
/// `Request`s until the socket errs, the peer closes, or an `Exit` command
/// arrives.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    client_id: ClientId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<Request>(&bytes) {
                Ok(request) => {
                    let is_exit = request.command == Command::Exit;
                    let _ = tx.send(InternalEvent::RequestFrom { client_id, request });
                    if is_exit {
                        let _ = tx.send(InternalEvent::Disconnected { client_id });
                        break;
                    }
                }
                Err(_) => {
                    let _ = tx.send(InternalEvent::Disconnected { client_id });
                    break;
                }
            },
            Err(_) => {
                let _ = tx.send(InternalEvent::Disconnected { client_id });
                break;
            }
        }
    }
}

/// Serialize and write one response to its originating client; drop the
/// client's writer on any I/O failure rather than retrying.
fn send_response(writers: &mut BTreeMap<ClientId, BufWriter<TcpStream>>, client_id: ClientId, response: &Response) {
    let Some(writer) = writers.get_mut(&client_id) else { return };
    let Ok(json) = serde_json::to_vec(response) else { return };
    if write_message(writer, &json).is_err() {
        writers.remove(&client_id);
    }
}
