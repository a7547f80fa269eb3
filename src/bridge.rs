//! Line-oriented message relay between the pond and whatever shell hosts it.
//!
//! Inbound lines are JSON `{"type": ..., "payload": {"message": ...}}` and only
//! ever change the status text. Outbound traffic is the single `loaded` line.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread;

pub const LOADED_SIGNAL: &str = "loaded";
pub const INIT_DATA: &str = "INIT_DATA";

/// Lines buffered between the reader thread and the frame loop.
const INBOX_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("host channel i/o: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Payload,
}

impl HostMessage {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Status text shown for this message.
    pub fn status(&self) -> String {
        if self.kind == INIT_DATA {
            self.payload.message.clone()
        } else {
            format!("Received from host: {}", self.payload.message)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: usize,
    pub rejected: usize,
}

pub struct HostBridge {
    outbox: Option<Box<dyn Write>>,
    inbox: Option<Receiver<String>>,
    loaded_sent: bool,
    status: String,
    stats: BridgeStats,
}

impl HostBridge {
    /// A bridge with no host attached. Everything is a no-op except [`HostBridge::receive`].
    pub fn detached() -> Self {
        Self::new(None, None)
    }

    pub fn new(outbox: Option<Box<dyn Write>>, inbox: Option<Receiver<String>>) -> Self {
        Self {
            outbox,
            inbox,
            loaded_sent: false,
            status: String::new(),
            stats: BridgeStats::default(),
        }
    }

    /// Opens the configured channels. `inbox` is a path or `-` for stdin;
    /// `outbox` is opened for append.
    pub fn connect(inbox: Option<&str>, outbox: Option<&Path>) -> Result<Self, BridgeError> {
        let outbox = match outbox {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| BridgeError::Open {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Some(Box::new(file) as Box<dyn Write>)
            }
            None => None,
        };

        let inbox = match inbox {
            Some("-") => Some(spawn_reader(BufReader::new(io::stdin()), "stdin")),
            Some(path) => {
                let file = File::open(path).map_err(|source| BridgeError::Open {
                    path: PathBuf::from(path),
                    source,
                })?;
                Some(spawn_reader(BufReader::new(file), path))
            }
            None => None,
        };

        log::info!(
            "host bridge: inbox {}, outbox {}",
            if inbox.is_some() { "attached" } else { "none" },
            if outbox.is_some() { "attached" } else { "none" }
        );
        Ok(Self::new(outbox, inbox))
    }

    /// Handles one inbound message. Errors end up in the status text, never in the caller.
    pub fn receive(&mut self, raw: &str) {
        match HostMessage::parse(raw) {
            Ok(msg) => {
                log::debug!("host message type={:?}", msg.kind);
                self.status = msg.status();
                self.stats.received += 1;
            }
            Err(e) => {
                log::warn!("rejected host message: {e}");
                self.status = format!("Message parse error: {e}");
                self.stats.rejected += 1;
            }
        }
    }

    /// Drains whatever the inbox has without blocking. Returns the number of lines handled.
    pub fn pump(&mut self) -> usize {
        let mut lines = Vec::new();
        let mut closed = false;
        if let Some(rx) = &self.inbox {
            loop {
                match rx.try_recv() {
                    Ok(line) => lines.push(line),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        if closed {
            log::info!("host inbox closed");
            self.inbox = None;
        }
        for line in &lines {
            if !line.trim().is_empty() {
                self.receive(line);
            }
        }
        lines.len()
    }

    /// Sends `loaded` once. Later calls and a missing outbox are no-ops.
    pub fn notify_loaded(&mut self) -> Result<(), BridgeError> {
        if self.loaded_sent {
            return Ok(());
        }
        self.loaded_sent = true;
        let Some(out) = self.outbox.as_mut() else {
            return Ok(());
        };
        writeln!(out, "{LOADED_SIGNAL}")?;
        out.flush()?;
        log::info!("sent {LOADED_SIGNAL} to host");
        Ok(())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn loaded_sent(&self) -> bool {
        self.loaded_sent
    }
}

fn spawn_reader<R>(reader: R, name: &str) -> Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(INBOX_CAPACITY);
    let name = name.to_string();
    let spawned = thread::Builder::new()
        .name("host-inbox".into())
        .spawn(move || read_lines(reader, tx, &name));
    if let Err(e) = spawned {
        log::error!("could not start host inbox reader: {e}");
    }
    rx
}

fn read_lines<R: BufRead>(reader: R, tx: SyncSender<String>, name: &str) {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("host inbox {name}: {e}");
                break;
            }
        };
        match tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!("host inbox full, dropping line"),
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    log::debug!("host inbox {name} reader finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_message_is_prefixed() {
        let mut b = HostBridge::detached();
        b.receive(r#"{"type":"PING","payload":{"message":"hi there"}}"#);
        assert_eq!(b.status(), "Received from host: hi there");
    }

    #[test]
    fn init_data_shows_the_bare_message() {
        let mut b = HostBridge::detached();
        b.receive(r#"{"type":"INIT_DATA","payload":{"message":"welcome"},"extra":1}"#);
        assert_eq!(b.status(), "welcome");
    }

    #[test]
    fn malformed_message_is_reported_then_recovered_from() {
        let mut b = HostBridge::detached();
        b.receive("{not json");
        assert!(b.status().starts_with("Message parse error: "), "{}", b.status());

        b.receive(r#"{"type":"X","payload":{"message":"ok"}}"#);
        assert_eq!(b.status(), "Received from host: ok");
        assert_eq!(b.stats(), BridgeStats { received: 1, rejected: 1 });
    }

    #[test]
    fn missing_payload_is_a_parse_error() {
        assert!(matches!(
            HostMessage::parse(r#"{"type":"X"}"#),
            Err(BridgeError::Parse(_))
        ));
    }

    #[test]
    fn loaded_goes_out_exactly_once() {
        let sink = Sink::default();
        let mut b = HostBridge::new(Some(Box::new(sink.clone())), None);
        b.notify_loaded().unwrap();
        b.notify_loaded().unwrap();
        assert_eq!(String::from_utf8(sink.0.borrow().clone()).unwrap(), "loaded\n");
        assert!(b.loaded_sent());
    }

    #[test]
    fn loaded_without_outbox_is_fine() {
        let mut b = HostBridge::detached();
        assert!(b.notify_loaded().is_ok());
    }

    #[test]
    fn pump_drains_the_inbox_in_order() {
        let (tx, rx) = mpsc::sync_channel(8);
        let mut b = HostBridge::new(None, Some(rx));
        tx.send(r#"{"type":"A","payload":{"message":"one"}}"#.to_string()).unwrap();
        tx.send(String::new()).unwrap();
        tx.send(r#"{"type":"A","payload":{"message":"two"}}"#.to_string()).unwrap();
        assert_eq!(b.pump(), 3);
        assert_eq!(b.status(), "Received from host: two");
        assert_eq!(b.stats().received, 2);

        drop(tx);
        assert_eq!(b.pump(), 0);
        assert_eq!(b.pump(), 0);
    }

    #[test]
    fn reader_thread_forwards_lines() {
        let input = io::Cursor::new(b"first\nsecond\n".to_vec());
        let rx = spawn_reader(input, "cursor");
        let got: Vec<String> = rx.iter().collect();
        assert_eq!(got, vec!["first".to_string(), "second".to_string()]);
    }
}
