// src/io/slcan/mod.rs
//
// slcan (Serial Line CAN) protocol driver for USBtin and other USB-CAN
// adapters using the Lawicel/slcan ASCII protocol.
//
// Protocol reference: http://www.can232.com/docs/can232_v3.pdf

pub mod ack;
pub mod codec;
pub mod device;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod receive;
pub mod splitter;
pub mod transmit;

pub use codec::{decode_frame, encode_frame, encode_line, parse_frame, TERMINATOR};
pub use device::{find_bitrate_command, OpenMode, SlcanDevice};
pub use events::{EventReceiver, EventSender, SlcanEvent};
pub use frame::CanFrame;
pub use pipeline::{InboundFeed, PipelineConfig, SlcanPipeline};
pub use receive::{classify, ReceiveEngine, TokenKind};
pub use splitter::split_frames;
pub use transmit::TransmitEngine;
