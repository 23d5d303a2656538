// src/io/slcan/receive.rs
//
// Receive loop: raw text chunks in, typed events out.
//
// Each chunk is split into terminator-closed tokens which are classified in
// arrival order. Ack tokens release the transmit loop through PendingAck,
// frame tokens become FrameReceived events, everything else is reported as
// a diagnostic and otherwise ignored.

use std::sync::Arc;

use super::ack::PendingAck;
use super::codec::{decode_frame, TERMINATOR};
use super::events::{EventSender, SlcanEvent};
use super::splitter::split_with_tail;
use crate::io::channel::BlockingChannel;

/// BEL, sent by the device when it rejects a command.
pub const BELL: char = '\x07';

/// Longest unterminated tail kept between chunks (an extended frame with
/// eight data bytes is 26 characters).
const MAX_TAIL_LEN: usize = 64;

/// Classification of one inbound token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `t`, `T`, `r` or `R` line carrying a frame.
    CanFrame,
    /// Bare `z`, `Z`, `t` or `T` line acknowledging the last command.
    Ack,
    /// BEL, the device rejected the last command.
    Bell,
    /// Anything else.
    Unknown,
}

/// Classify a token (terminator included).
pub fn classify(token: &str) -> TokenKind {
    // Bare acks first: "t\r" and "T\r" would otherwise look like frames
    if matches!(token, "z\r" | "Z\r" | "t\r" | "T\r") {
        return TokenKind::Ack;
    }
    if token.starts_with(BELL) {
        return TokenKind::Bell;
    }
    if token.ends_with(TERMINATOR) && token.starts_with(&['t', 'T', 'r', 'R'][..]) {
        return TokenKind::CanFrame;
    }
    TokenKind::Unknown
}

/// Consumer of the inbound text queue.
pub struct ReceiveEngine {
    inbound: Arc<BlockingChannel<String>>,
    ack: Arc<PendingAck>,
    events: EventSender,
    carry_partial: bool,
    tail: String,
}

impl ReceiveEngine {
    /// With `carry_partial` set, an unterminated run at the end of a chunk is
    /// kept and prepended to the next chunk instead of being dropped.
    pub fn new(
        inbound: Arc<BlockingChannel<String>>,
        ack: Arc<PendingAck>,
        events: EventSender,
        carry_partial: bool,
    ) -> Self {
        Self {
            inbound,
            ack,
            events,
            carry_partial,
            tail: String::new(),
        }
    }

    fn emit(&self, event: SlcanEvent) {
        // Nobody listening is not an error for the receive loop
        let _ = self.events.send(event);
    }

    /// Classify and act on every complete token in `chunk`. Returns the
    /// number of frames emitted.
    pub fn process_chunk(&mut self, chunk: &str) -> usize {
        if chunk.contains(BELL) {
            self.emit(SlcanEvent::Diagnostic(
                "Device rejected a command (BELL)".to_string(),
            ));
        }

        let joined;
        let text = if self.tail.is_empty() {
            chunk
        } else {
            joined = std::mem::take(&mut self.tail) + chunk;
            joined.as_str()
        };

        let (tokens, tail) = split_with_tail(text);
        let mut frames = 0;

        for token in tokens {
            match classify(token) {
                TokenKind::Ack => self.ack.set(),
                TokenKind::CanFrame => {
                    self.emit(SlcanEvent::FrameReceived(decode_frame(token)));
                    frames += 1;
                }
                TokenKind::Bell | TokenKind::Unknown => {
                    self.emit(SlcanEvent::Diagnostic(format!(
                        "Unknown msg: \t{}",
                        token.escape_debug()
                    )));
                }
            }
        }

        if self.carry_partial && tail.len() <= MAX_TAIL_LEN {
            self.tail = tail.to_string();
        }

        frames
    }

    /// Run until the inbound queue is closed and drained.
    pub fn run(mut self) {
        tlog!("[slcan] Receive loop started");
        while let Some(chunk) = self.inbound.pop() {
            self.process_chunk(&chunk);
        }
        tlog!("[slcan] Receive loop stopped");
    }
}
