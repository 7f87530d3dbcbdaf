//! Session run loop
//!
//! Drains a session's inbound queue one message at a time, so replies reach
//! the stream in submission order. Tool calls run on their own task; if the
//! stream goes away mid-call the task is left to finish and its result is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use busram_protocol::OutboundEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::error::McpError;
use super::machine::{Action, ProtocolMachine, ProtocolState};
use crate::observability::Metrics;
use crate::session::{Delivery, Session, Submission};
use crate::tools::ToolError;

/// Why a run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client dropped the stream
    Disconnected,
    /// The session was destroyed or the server is shutting down
    Cancelled,
}

/// Drive one session until its stream closes or it is cancelled
pub async fn run_session(
    session: Arc<Session>,
    mut inbound_rx: mpsc::UnboundedReceiver<Submission>,
    mut machine: ProtocolMachine,
    keepalive: Duration,
) -> CloseReason {
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;

            _ = session.cancelled() => break CloseReason::Cancelled,

            _ = session.stream_closed() => break CloseReason::Disconnected,

            _ = ticker.tick() => {
                if !session.emit(OutboundEvent::keep_alive()) {
                    break CloseReason::Disconnected;
                }
            }

            next = inbound_rx.recv() => {
                let Some(submission) = next else {
                    break CloseReason::Disconnected;
                };
                if let Some(reason) = process(&session, &mut machine, submission).await {
                    break reason;
                }
            }
        }
    };

    machine.close();
    session.set_state(ProtocolState::Closed);
    info!(session = %session.id(), ?reason, cursor = session.inbound_cursor(), "session loop ended");
    reason
}

/// Handle one submission; `Some` means the loop must stop
async fn process(
    session: &Session,
    machine: &mut ProtocolMachine,
    submission: Submission,
) -> Option<CloseReason> {
    let Submission {
        seq,
        message,
        reply,
    } = submission;

    let method = message.payload.method().to_string();
    Metrics::global().record_message(&method);
    debug!(
        session = %session.id(),
        seq,
        method = %method,
        notification = message.is_notification(),
        "processing message"
    );

    let delivery = match machine.handle(&message) {
        Action::Reply(event) => emit(session, event),
        Action::Silent => Delivery::Silent,
        Action::CallTool {
            correlation_id,
            tool_name,
            arguments,
        } => {
            let tools = Arc::clone(machine.tools());
            let name = tool_name.clone();
            let mut task = tokio::spawn(async move { tools.execute(&name, &arguments).await });

            let joined = tokio::select! {
                biased;

                _ = session.stream_closed() => {
                    debug!(session = %session.id(), tool = %tool_name, "stream closed during tool call, discarding result");
                    let _ = reply.send(Delivery::Gone);
                    return Some(CloseReason::Disconnected);
                }

                _ = session.cancelled() => {
                    let _ = reply.send(Delivery::Gone);
                    return Some(CloseReason::Cancelled);
                }

                joined = &mut task => joined,
            };

            match tool_event(correlation_id, &tool_name, joined) {
                Some(event) => emit(session, event),
                None => Delivery::Silent,
            }
        }
    };

    session.advance_cursor(seq);
    session.set_state(machine.state());
    let _ = reply.send(delivery);
    None
}

fn tool_event(
    correlation_id: Option<Value>,
    tool_name: &str,
    joined: Result<Result<String, ToolError>, JoinError>,
) -> Option<OutboundEvent> {
    match joined {
        Ok(outcome) => match correlation_id {
            Some(id) => Some(ProtocolMachine::tool_call_event(id, tool_name, outcome)),
            None => {
                debug!(tool = %tool_name, ok = outcome.is_ok(), "tool notification finished");
                None
            }
        },
        Err(e) => {
            error!(tool = %tool_name, "tool task failed: {}", e);
            let err = McpError::Internal(format!("tool '{}' failed", tool_name));
            Metrics::global().record_error(err.kind());
            Some(OutboundEvent::error(correlation_id, err.into()))
        }
    }
}

fn emit(session: &Session, event: OutboundEvent) -> Delivery {
    if session.emit(event) {
        Delivery::Enqueued
    } else {
        Delivery::Gone
    }
}
