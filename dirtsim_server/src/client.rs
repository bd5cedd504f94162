// TCP client for talking to a DirtSim server.
//
// Provides a non-blocking interface for a caller (a game engine's main
// thread, an integration test, a CLI tool) to issue commands without ever
// blocking on network I/O:
// - `connect()` opens the TCP socket and spawns a background reader thread.
// - The reader thread calls `read_message()` in a loop, deserializes
//   `Response`s, and pushes them into an `mpsc` channel.
// - The calling thread holds a `BufWriter<TcpStream>` for sending and calls
//   `send_command()` to assign a fresh correlation id and write a `Request`.
// - `poll()` drains the inbox non-blocking, returning all queued responses;
//   the caller matches each one's `correlation_id` back to the command it
//   sent.
//
// There is no handshake — the first exchange is whatever command the
// caller sends first — and every sent command gets exactly one reply.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use dirtsim_protocol::framing::{read_message, write_message};
use dirtsim_protocol::message::Command;
use dirtsim_protocol::types::CorrelationId;
use dirtsim_protocol::{Request, Response};

/// TCP client for talking to a DirtSim server.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Response>,
    _reader_thread: Option<JoinHandle<()>>,
    next_correlation_id: u64,
}

impl NetClient {
    /// Connect to a DirtSim server and spawn a reader thread. There is no
    /// handshake at this layer — the first exchange is whatever command the
    /// caller sends first.
    pub fn connect(addr: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect failed: {e}"))?;
        let reader_stream = stream.try_clone().map_err(|e| format!("clone failed: {e}"))?;
        let writer = BufWriter::new(stream);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(BufReader::new(reader_stream), tx);
        });

        Ok(Self { writer, inbox: rx, _reader_thread: Some(reader_thread), next_correlation_id: 1 })
    }

    /// Send a command, assigning it a fresh correlation id. The matching
    /// `Response` arrives later through `poll()`.
    pub fn send_command(&mut self, command: Command) -> Result<CorrelationId, String> {
        let correlation_id = CorrelationId(self.next_correlation_id);
        self.next_correlation_id += 1;
        let request = Request { correlation_id, command };
        let json = serde_json::to_vec(&request).map_err(|e| e.to_string())?;
        write_message(&mut self.writer, &json).map_err(|e| e.to_string())?;
        Ok(correlation_id)
    }

    /// Send `Exit` and let the connection close once the server acks it.
    pub fn disconnect(&mut self) {
        let _ = self.send_command(Command::Exit);
    }

    /// Drain all queued responses (non-blocking).
    pub fn poll(&self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Ok(response) = self.inbox.try_recv() {
            responses.push(response);
        }
        responses
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<Response>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<Response>(&bytes) {
            Ok(response) => {
                if tx.send(response).is_err() {
                    break; // Caller dropped the receiver.
                }
            }
            Err(_) => break, // Malformed message.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{start_server, ServerConfig};
    use std::time::{Duration, Instant};

    fn wait_for<T>(mut poll: impl FnMut() -> Option<T>, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(value) = poll() {
                return Some(value);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn round_trips_a_scenario_switch_command() {
        let config = ServerConfig { port: 0, ..Default::default() };
        let (handle, addr) = start_server(config).unwrap();
        let mut client = NetClient::connect(&addr.to_string()).unwrap();

        let id = client
            .send_command(Command::ScenarioSwitch { scenario_id: "forest_clearing".into() })
            .unwrap();

        let response = wait_for(
            || client.poll().into_iter().find(|r| r.correlation_id == id),
            Duration::from_secs(2),
        );
        assert!(response.is_some(), "expected a response for correlation id {id:?}");
        assert!(response.unwrap().result.is_ok());

        client.disconnect();
        handle.stop();
    }
}
