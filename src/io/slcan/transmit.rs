// src/io/slcan/transmit.rs
//
// Transmit loop: one frame on the wire at a time.
//
// For every queued frame the encoded line is written under the transport
// mutex, then the loop waits (bounded) for the receive loop to see the
// device's ack. A missed ack is reported and the next frame goes out anyway.
// A failed write is terminal: the loop reports it, closes its queue and stops.

use std::sync::Arc;
use std::time::Duration;

use super::ack::PendingAck;
use super::codec::encode_line;
use super::events::{EventSender, SlcanEvent};
use super::frame::CanFrame;
use crate::io::channel::BlockingChannel;
use crate::io::error::IoError;
use crate::io::transport::{SharedTransport, Transport};

/// Default bound on the ack wait.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Consumer of the outbound frame queue.
pub struct TransmitEngine<T: Transport> {
    outbound: Arc<BlockingChannel<CanFrame>>,
    transport: SharedTransport<T>,
    ack: Arc<PendingAck>,
    events: EventSender,
    ack_timeout: Duration,
}

impl<T: Transport> TransmitEngine<T> {
    pub fn new(
        outbound: Arc<BlockingChannel<CanFrame>>,
        transport: SharedTransport<T>,
        ack: Arc<PendingAck>,
        events: EventSender,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            transport,
            ack,
            events,
            ack_timeout,
        }
    }

    /// Write one frame and wait for its ack.
    ///
    /// `Ok(true)` if acknowledged in time, `Ok(false)` on timeout, `Err` if
    /// the transport write failed.
    pub fn send_one(&self, frame: &CanFrame) -> Result<bool, IoError> {
        let line = encode_line(frame);
        {
            let mut transport = self.transport.lock().unwrap_or_else(|e| e.into_inner());
            self.ack.reset();
            transport.write_all(&line)?;
        }
        Ok(self.ack.wait_timeout(self.ack_timeout))
    }

    /// Run until the outbound queue is closed or the transport fails.
    pub fn run(self) {
        tlog!(
            "[slcan] Transmit loop started (ack timeout {} ms)",
            self.ack_timeout.as_millis()
        );

        while let Some(frame) = self.outbound.pop() {
            let event = match self.send_one(&frame) {
                Ok(true) => SlcanEvent::FrameWritten(frame),
                Ok(false) => SlcanEvent::WriteTimeout(frame),
                Err(e) => {
                    tlog!("[slcan] Transmit loop stopping: {}", e);
                    self.outbound.close();
                    let _ = self.events.send(SlcanEvent::Terminated(e.to_string()));
                    return;
                }
            };
            let _ = self.events.send(event);
        }

        tlog!("[slcan] Transmit loop stopped");
    }
}
