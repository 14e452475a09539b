//! Observers receive snapshots and the termination marker.
//!
//! The broadcaster does not care where the states end up. Three observers
//! ship with the crate:
//! - `ConsoleObserver`: one table row per snapshot on any `std::io::Write`
//! - `LineObserver`: one philosopher's status line on any `AsyncWrite`
//!   (a file or named pipe read by a separate viewer)
//! - `ChannelObserver`: JSON frames fanned out over an `async_broadcast` channel

use crate::core::errors::{DiningError, Result};
use crate::table::{PhilState, Snapshot};
use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Marker written by `LineObserver` when the simulation ends
pub const EXIT_MARKER: &str = "CODE EXIT";

/// Consumer of table snapshots
#[async_trait]
pub trait Observer: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> String;

    async fn publish(&self, snapshot: &Snapshot) -> Result<()>;

    /// Called once, after the last snapshot
    async fn publish_termination(&self) -> Result<()>;
}

struct ConsoleState<W> {
    writer: W,
    header_written: bool,
}

/// Renders the whole table as tab-separated rows
pub struct ConsoleObserver<W: Write + Send> {
    inner: Mutex<ConsoleState<W>>,
}

impl ConsoleObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(ConsoleState {
                writer,
                header_written: false,
            }),
        }
    }

    /// Give back the writer, e.g. to inspect captured output
    pub fn into_inner(self) -> W {
        self.inner.into_inner().writer
    }

    fn header(actors: usize) -> String {
        let mut line = String::from("Philosopher ID |");
        for id in 0..actors {
            line.push_str(&format!("\t{}", id));
        }
        line
    }

    fn row(snapshot: &Snapshot) -> String {
        let mut line = String::from("States         |");
        for (_, state) in snapshot.iter() {
            line.push('\t');
            line.push(state.letter());
        }
        line
    }
}

#[async_trait]
impl<W: Write + Send> Observer for ConsoleObserver<W> {
    fn name(&self) -> String {
        "console".to_string()
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.header_written {
            let header = Self::header(snapshot.len());
            writeln!(inner.writer, "{}", header)
                .map_err(|e| DiningError::observer(self.name(), "write header", e))?;
            inner.header_written = true;
        }
        writeln!(inner.writer, "{}", Self::row(snapshot))
            .map_err(|e| DiningError::observer(self.name(), "write row", e))?;
        inner
            .writer
            .flush()
            .map_err(|e| DiningError::observer(self.name(), "flush", e))
    }

    async fn publish_termination(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .writer
            .flush()
            .map_err(|e| DiningError::observer(self.name(), "flush", e))
    }
}

/// Streams one philosopher's state as text lines, ending with `EXIT_MARKER`
pub struct LineObserver<W: AsyncWrite + Unpin + Send> {
    id: usize,
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> LineObserver<W> {
    pub fn new(id: usize, writer: W) -> Self {
        Self {
            id,
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, line: &str, operation: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| DiningError::observer(self.name(), operation, e))?;
        writer
            .flush()
            .await
            .map_err(|e| DiningError::observer(self.name(), "flush", e))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Observer for LineObserver<W> {
    fn name(&self) -> String {
        format!("line-{}", self.id)
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        match snapshot.get(self.id) {
            Some(state) => self.write_line(state.sentence(), "write state").await,
            None => {
                debug!(observer = %self.name(), "snapshot has no seat for this observer");
                Ok(())
            }
        }
    }

    async fn publish_termination(&self) -> Result<()> {
        self.write_line(EXIT_MARKER, "write exit marker").await?;
        let mut writer = self.writer.lock().await;
        writer
            .shutdown()
            .await
            .map_err(|e| DiningError::observer(self.name(), "shutdown", e))
    }
}

/// Wire format for remote observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverFrame {
    Snapshot {
        sequence: u64,
        states: Vec<PhilState>,
        at: DateTime<Utc>,
    },
    Terminated {
        at: DateTime<Utc>,
    },
}

impl ObserverFrame {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

/// Fans frames out to any number of subscribers.
///
/// Overflow is enabled: a slow subscriber loses its oldest frames instead of
/// holding up the broadcaster.
pub struct ChannelObserver {
    sender: Sender<String>,
    // keeps the channel open while nobody is subscribed
    _keepalive: InactiveReceiver<String>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(capacity.max(1));
        sender.set_overflow(true);
        Self {
            sender,
            _keepalive: receiver.deactivate(),
        }
    }

    /// New subscriber; sees frames published from now on
    pub fn subscribe(&self) -> Receiver<String> {
        self.sender.new_receiver()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, frame: ObserverFrame) -> Result<()> {
        let text = frame.encode()?;
        match self.sender.try_broadcast(text) {
            Ok(_) => Ok(()),
            Err(TrySendError::Inactive(_)) => {
                debug!("no active subscribers, frame dropped");
                Ok(())
            }
            Err(e @ TrySendError::Full(_)) | Err(e @ TrySendError::Closed(_)) => {
                Err(DiningError::observer(self.name(), "broadcast frame", e))
            }
        }
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    fn name(&self) -> String {
        "channel".to_string()
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        self.send(ObserverFrame::Snapshot {
            sequence: snapshot.sequence,
            states: snapshot.states.clone(),
            at: Utc::now(),
        })
    }

    async fn publish_termination(&self) -> Result<()> {
        self.send(ObserverFrame::Terminated { at: Utc::now() })?;
        self.sender.close();
        Ok(())
    }
}
