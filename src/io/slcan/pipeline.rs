// src/io/slcan/pipeline.rs
//
// Wiring of the two slcan worker loops.
//
//   application --send()--> outbound queue --> TransmitEngine --write--> transport
//   transport --InboundFeed--> inbound queue --> ReceiveEngine --ack--> TransmitEngine
//                                                      `--events--> application
//
// The workers share nothing but the two queues, the ack signal and the
// transport mutex. Closing the queues stops them.

use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::ack::PendingAck;
use super::events::{EventReceiver, EventSender, SlcanEvent};
use super::frame::CanFrame;
use super::receive::ReceiveEngine;
use super::transmit::{TransmitEngine, DEFAULT_ACK_TIMEOUT};
use crate::io::channel::BlockingChannel;
use crate::io::error::IoError;
use crate::io::transport::{SharedTransport, Transport};

/// Tunables for the worker loops.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub ack_timeout: Duration,
    /// Keep an unterminated tail across inbound chunks instead of dropping it.
    pub carry_partial_tokens: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            carry_partial_tokens: false,
        }
    }
}

/// Entry point for inbound text from the transport's reader.
///
/// Chunks are queued under the transport mutex so they are ordered with
/// respect to lines written by the transmit loop and setup helpers.
pub struct InboundFeed<T: Transport> {
    transport: SharedTransport<T>,
    inbound: Arc<BlockingChannel<String>>,
    events: EventSender,
}

impl<T: Transport> Clone for InboundFeed<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            inbound: self.inbound.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: Transport> InboundFeed<T> {
    /// Queue a raw chunk. Returns `false` once the pipeline is shut down.
    pub fn push_bytes(&self, bytes: &[u8]) -> bool {
        self.push_str(&String::from_utf8_lossy(bytes))
    }

    pub fn push_str(&self, chunk: &str) -> bool {
        let _guard = self.transport.lock().unwrap_or_else(|e| e.into_inner());
        self.inbound.push(chunk.to_string()).is_ok()
    }

    /// The transport's read side has failed or closed: report it and let the
    /// receive loop drain and stop.
    pub fn terminate(&self, reason: &str) {
        self.inbound.close();
        let _ = self.events.send(SlcanEvent::Terminated(reason.to_string()));
    }
}

/// Running transmit + receive loops over one transport.
pub struct SlcanPipeline<T: Transport> {
    transport: SharedTransport<T>,
    outbound: Arc<BlockingChannel<CanFrame>>,
    inbound: Arc<BlockingChannel<String>>,
    events: EventSender,
    transmit_handle: Option<JoinHandle<()>>,
    receive_handle: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> SlcanPipeline<T> {
    /// Spawn both worker threads. Events arrive on the returned receiver.
    pub fn start(
        transport: SharedTransport<T>,
        config: PipelineConfig,
    ) -> Result<(Self, EventReceiver), IoError> {
        let (events, receiver) = mpsc::channel();
        let outbound = Arc::new(BlockingChannel::new());
        let inbound = Arc::new(BlockingChannel::new());
        let ack = Arc::new(PendingAck::new());

        let receive = ReceiveEngine::new(
            inbound.clone(),
            ack.clone(),
            events.clone(),
            config.carry_partial_tokens,
        );
        let receive_handle = thread::Builder::new()
            .name("slcan-rx".to_string())
            .spawn(move || receive.run())
            .map_err(|e| IoError::state(format!("spawn receive loop: {}", e)))?;

        let transmit = TransmitEngine::new(
            outbound.clone(),
            transport.clone(),
            ack,
            events.clone(),
            config.ack_timeout,
        );
        let transmit_handle = match thread::Builder::new()
            .name("slcan-tx".to_string())
            .spawn(move || transmit.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                inbound.close();
                let _ = receive_handle.join();
                return Err(IoError::state(format!("spawn transmit loop: {}", e)));
            }
        };

        let pipeline = Self {
            transport,
            outbound,
            inbound,
            events,
            transmit_handle: Some(transmit_handle),
            receive_handle: Some(receive_handle),
        };
        Ok((pipeline, receiver))
    }
}

impl<T: Transport> SlcanPipeline<T> {
    /// Queue a frame for transmission. Never blocks.
    pub fn send(&self, frame: CanFrame) -> Result<(), IoError> {
        self.outbound
            .push(frame)
            .map_err(|_| IoError::state("transmit loop is not running"))
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbound_feed(&self) -> InboundFeed<T> {
        InboundFeed {
            transport: self.transport.clone(),
            inbound: self.inbound.clone(),
            events: self.events.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn inbound_queue(&self) -> Arc<BlockingChannel<String>> {
        self.inbound.clone()
    }

    /// Close both queues and wait for the workers. Frames still queued are
    /// written first; a frame waiting for its ack finishes its wait.
    pub fn shutdown(&mut self) {
        self.outbound.close();
        self.inbound.close();
        if let Some(handle) = self.transmit_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.receive_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Transport> Drop for SlcanPipeline<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::mock::MockTransport;
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    /// Transport that acknowledges selected writes by pushing "z\r" straight
    /// into the inbound queue, and timestamps every write.
    #[derive(Clone, Default)]
    struct AckingTransport {
        inbound: Arc<OnceLock<Arc<BlockingChannel<String>>>>,
        writes: Arc<Mutex<Vec<(String, Instant)>>>,
        ack_every: usize,
    }

    impl Transport for AckingTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), IoError> {
            let mut writes = self.writes.lock().unwrap();
            writes.push((String::from_utf8_lossy(bytes).into_owned(), Instant::now()));
            if self.ack_every > 0 && writes.len() % self.ack_every == 0 {
                if let Some(inbound) = self.inbound.get() {
                    let _ = inbound.push("z\r".to_string());
                }
            }
            Ok(())
        }
    }

    fn start_acking(
        ack_every: usize,
        ack_timeout: Duration,
    ) -> (SlcanPipeline<AckingTransport>, AckingTransport, EventReceiver) {
        let transport = AckingTransport {
            ack_every,
            ..Default::default()
        };
        let config = PipelineConfig {
            ack_timeout,
            carry_partial_tokens: false,
        };
        let (pipeline, events) =
            SlcanPipeline::start(Arc::new(Mutex::new(transport.clone())), config).unwrap();
        transport.inbound.set(pipeline.inbound_queue()).ok().unwrap();
        (pipeline, transport, events)
    }

    fn collect(events: &EventReceiver, n: usize) -> Vec<SlcanEvent> {
        (0..n)
            .map(|_| events.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect()
    }

    #[test]
    fn test_acked_frames_written_in_order() {
        let (mut pipeline, transport, events) = start_acking(1, Duration::from_secs(2));

        let frames: Vec<_> = (0..20u32).map(|i| CanFrame::new(i, &[i as u8])).collect();
        for frame in &frames {
            pipeline.send(frame.clone()).unwrap();
        }

        let got = collect(&events, frames.len());
        let expected: Vec<_> = frames.iter().cloned().map(SlcanEvent::FrameWritten).collect();
        assert_eq!(got, expected);

        pipeline.shutdown();
        let lines: Vec<_> = transport.writes.lock().unwrap().iter().map(|(l, _)| l.clone()).collect();
        let expected: Vec<_> = frames.iter().map(|f| format!("{}\r", f)).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_missing_ack_times_out_and_next_frame_is_sent() {
        // Every second write is acknowledged
        let (mut pipeline, transport, events) = start_acking(2, Duration::from_millis(50));

        for i in 0..4u32 {
            pipeline.send(CanFrame::new(i, &[])).unwrap();
        }

        let got = collect(&events, 4);
        assert_eq!(
            got,
            vec![
                SlcanEvent::WriteTimeout(CanFrame::new(0, &[])),
                SlcanEvent::FrameWritten(CanFrame::new(1, &[])),
                SlcanEvent::WriteTimeout(CanFrame::new(2, &[])),
                SlcanEvent::FrameWritten(CanFrame::new(3, &[])),
            ]
        );

        pipeline.shutdown();

        // A frame is never written before the previous ack wait resolved
        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 4);
        assert!(writes[1].1.duration_since(writes[0].1) >= Duration::from_millis(50));
        assert!(writes[3].1.duration_since(writes[2].1) >= Duration::from_millis(50));
    }

    #[test]
    fn test_inbound_frames_become_events() {
        let mock = MockTransport::default();
        let (mut pipeline, events) =
            SlcanPipeline::start(Arc::new(Mutex::new(mock)), PipelineConfig::default()).unwrap();
        let feed = pipeline.inbound_feed();

        assert!(feed.push_str("t1230\rz\rt00121122\r"));
        assert!(feed.push_bytes(b"junk\rT12345678197\rr0037\r"));

        let frames: Vec<_> = collect(&events, 5)
            .into_iter()
            .filter_map(|e| match e {
                SlcanEvent::FrameReceived(frame) => Some(frame),
                _ => None,
            })
            .collect();
        assert_eq!(
            frames,
            vec![
                CanFrame::new(0x123, &[]),
                CanFrame::new(0x001, &[0x11, 0x22]),
                CanFrame::with_flags(0x12345678, true, false, &[0x97], 1),
                CanFrame::remote(0x003, false, 7),
            ]
        );

        pipeline.shutdown();
        assert!(!feed.push_str("t1230\r"));
    }

    #[test]
    fn test_send_after_shutdown_fails() {
        let mock = MockTransport::default();
        let (mut pipeline, _events) =
            SlcanPipeline::start(Arc::new(Mutex::new(mock)), PipelineConfig::default()).unwrap();
        pipeline.shutdown();
        assert!(matches!(
            pipeline.send(CanFrame::new(1, &[])),
            Err(IoError::State(_))
        ));
    }

    #[test]
    fn test_transport_failure_terminates_transmit_loop() {
        let mock = MockTransport::default();
        mock.fail_writes();
        let (mut pipeline, events) =
            SlcanPipeline::start(Arc::new(Mutex::new(mock)), PipelineConfig::default()).unwrap();

        pipeline.send(CanFrame::new(1, &[])).unwrap();
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            SlcanEvent::Terminated(_)
        ));

        // The loop closed its own queue
        assert!(pipeline.send(CanFrame::new(2, &[])).is_err());
        pipeline.shutdown();
    }

    #[test]
    fn test_read_side_termination() {
        let mock = MockTransport::default();
        let (mut pipeline, events) =
            SlcanPipeline::start(Arc::new(Mutex::new(mock)), PipelineConfig::default()).unwrap();
        let feed = pipeline.inbound_feed();

        feed.push_str("t1230\r");
        feed.terminate("port closed");

        let got = collect(&events, 2);
        assert!(got.contains(&SlcanEvent::FrameReceived(CanFrame::new(0x123, &[]))));
        assert!(got.contains(&SlcanEvent::Terminated("port closed".to_string())));
        assert!(!feed.push_str("t1230\r"));
        pipeline.shutdown();
    }
}
