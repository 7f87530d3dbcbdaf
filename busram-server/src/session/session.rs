use std::sync::atomic::{AtomicU64, Ordering};

use busram_protocol::{InboundMessage, OutboundEvent, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::mcp::ProtocolState;
use crate::observability::Metrics;

/// Outcome reported back to the POST that submitted a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed; an event was put on the stream
    Enqueued,
    /// Processed; nothing to emit (notification)
    Silent,
    /// The session closed before the message was processed
    Gone,
}

/// One queued inbound message
#[derive(Debug)]
pub struct Submission {
    /// Position in the session's submission order, starting at 1
    pub seq: u64,
    pub message: InboundMessage,
    pub reply: oneshot::Sender<Delivery>,
}

/// Receiving halves handed to the stream owner
#[derive(Debug)]
pub struct SessionChannels {
    pub inbound_rx: mpsc::UnboundedReceiver<Submission>,
    pub outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
}

/// A single agent connection
pub struct Session {
    id: SessionId,
    state: Mutex<ProtocolState>,
    inbound_tx: mpsc::UnboundedSender<Submission>,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    next_seq: AtomicU64,
    /// Last processed submission
    inbound_cursor: AtomicU64,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(id: SessionId, cancel: CancellationToken) -> (Self, SessionChannels) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let session = Self {
            id,
            state: Mutex::new(ProtocolState::Connected),
            inbound_tx,
            outbound_tx,
            next_seq: AtomicU64::new(0),
            inbound_cursor: AtomicU64::new(0),
            cancel,
            created_at: Utc::now(),
        };

        (
            session,
            SessionChannels {
                inbound_rx,
                outbound_rx,
            },
        )
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ProtocolState) {
        *self.state.lock() = state;
    }

    /// Queue a message and wait until the session has processed it
    ///
    /// Resolves to [`Delivery::Gone`] if the session closes first, including
    /// when the message was still waiting in the queue.
    pub async fn submit(&self, message: InboundMessage) -> Delivery {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, receipt) = oneshot::channel();

        let submission = Submission {
            seq,
            message,
            reply,
        };
        if self.inbound_tx.send(submission).is_err() {
            return Delivery::Gone;
        }

        receipt.await.unwrap_or(Delivery::Gone)
    }

    /// Put an event on the stream; false if the stream is gone
    pub fn emit(&self, event: OutboundEvent) -> bool {
        let sent = self.outbound_tx.send(event).is_ok();
        if sent {
            Metrics::global().record_event();
        }
        sent
    }

    /// Resolves when the stream's receiving side is dropped
    pub async fn stream_closed(&self) {
        self.outbound_tx.closed().await
    }

    pub fn is_stream_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }

    /// Resolves when the session is closed or the server shuts down
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mark closed and stop the run loop
    pub fn close(&self) {
        self.set_state(ProtocolState::Closed);
        self.cancel.cancel();
    }

    pub(crate) fn advance_cursor(&self, seq: u64) {
        self.inbound_cursor.fetch_max(seq, Ordering::SeqCst);
    }

    /// Sequence number of the last processed submission
    pub fn inbound_cursor(&self) -> u64 {
        self.inbound_cursor.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("inbound_cursor", &self.inbound_cursor())
            .field("stream_closed", &self.is_stream_closed())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
