// src/io/slcan/events.rs
//
// Events delivered from the pipeline workers to the owning application.

use serde::Serialize;
use std::sync::mpsc;

use super::frame::CanFrame;

/// Everything the pipeline reports, in the order it happened.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SlcanEvent {
    /// A frame line arrived from the bus.
    FrameReceived(CanFrame),
    /// A queued frame was written and the device acknowledged it.
    FrameWritten(CanFrame),
    /// A queued frame was written but no ack arrived in time.
    WriteTimeout(CanFrame),
    /// Trace line for anything worth surfacing (unknown tokens, ...).
    Diagnostic(String),
    /// A worker stopped because its transport failed or was closed.
    Terminated(String),
}

impl SlcanEvent {
    /// Human-readable form for logs and the CLI.
    pub fn describe(&self) -> String {
        match self {
            SlcanEvent::FrameReceived(frame) => format!("Received \t msg = {}", frame),
            SlcanEvent::FrameWritten(frame) => format!("Written \t msg = {}", frame),
            SlcanEvent::WriteTimeout(frame) => format!("Write Error \t msg = {}", frame),
            SlcanEvent::Diagnostic(text) => text.clone(),
            SlcanEvent::Terminated(reason) => format!("Terminated \t {}", reason),
        }
    }
}

/// Sending side handed to the workers.
pub type EventSender = mpsc::Sender<SlcanEvent>;

/// Receiving side returned to the application.
pub type EventReceiver = mpsc::Receiver<SlcanEvent>;
