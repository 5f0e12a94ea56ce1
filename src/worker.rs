use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::frame::RawFrame;
use crate::processor::{FrameProcessor, ProcessorState};

/// What the presentation layer observes from the scan worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    State(ProcessorState),
    /// Recoverable per-frame failure; the pipeline keeps running.
    Error(String),
}

/// Single-slot mailbox: a frame arriving while another is still pending
/// replaces it. The newest frame always wins and nothing queues up.
#[derive(Default)]
struct Mailbox {
    latest: Option<RawFrame>,
    reset_requested: bool,
    shutdown: bool,
}

impl Mailbox {
    /// Returns true when an undelivered frame was replaced.
    fn push(&mut self, frame: RawFrame) -> bool {
        self.latest.replace(frame).is_some()
    }
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    available: Condvar,
}

/// Runs a `FrameProcessor` on its own thread so the camera producer is never
/// blocked by analysis or inference. Frames are handed over with
/// latest-only semantics; state transitions and recoverable errors flow back
/// over the event channel.
pub struct ScanWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<FrameProcessor>>,
}

impl ScanWorker {
    pub fn spawn(mut processor: FrameProcessor) -> (Self, Receiver<ScanEvent>) {
        let (events_tx, events_rx) = mpsc::channel();
        let states = processor.subscribe();

        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox::default()),
            available: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("inkscan-worker".into())
            .spawn(move || {
                info!("🎬 ScanWorker: started");
                Self::run(&thread_shared, &mut processor, &states, &events_tx);
                info!("🗑️ ScanWorker: stopped");
                processor
            })
            .expect("failed to spawn scan worker thread");

        (
            Self {
                shared,
                handle: Some(handle),
            },
            events_rx,
        )
    }

    fn run(
        shared: &Shared,
        processor: &mut FrameProcessor,
        states: &Receiver<ProcessorState>,
        events: &Sender<ScanEvent>,
    ) {
        loop {
            let mut mailbox = shared.mailbox.lock().unwrap();
            while mailbox.latest.is_none() && !mailbox.reset_requested && !mailbox.shutdown {
                mailbox = shared.available.wait(mailbox).unwrap();
            }

            if mailbox.shutdown {
                return;
            }

            if mailbox.reset_requested {
                mailbox.reset_requested = false;
                mailbox.latest = None;
                drop(mailbox);
                processor.reset();
                Self::forward_states(states, events);
                continue;
            }

            let frame = mailbox.latest.take().expect("woken without a frame");
            drop(mailbox);

            if let Err(e) = processor.process(&frame) {
                warn!("frame processing failed: {}", e);
                events.send(ScanEvent::Error(e.to_string())).ok();
            }
            Self::forward_states(states, events);
        }
    }

    fn forward_states(states: &Receiver<ProcessorState>, events: &Sender<ScanEvent>) {
        for state in states.try_iter() {
            events.send(ScanEvent::State(state)).ok();
        }
    }

    /// Hand a frame to the worker. Never blocks the producer; an undelivered
    /// previous frame is dropped in favor of this one.
    pub fn submit(&self, frame: RawFrame) {
        let mut mailbox = self.shared.mailbox.lock().unwrap();
        if mailbox.shutdown {
            return;
        }
        mailbox.push(frame);
        self.shared.available.notify_one();
    }

    /// Asynchronously reset the processor; any pending frame is discarded.
    pub fn reset(&self) {
        let mut mailbox = self.shared.mailbox.lock().unwrap();
        mailbox.reset_requested = true;
        self.shared.available.notify_one();
    }

    /// Stop the worker, join its thread, and get the processor back (the
    /// caller decides when to `release()` the model). Safe to call while an
    /// inference is in flight; the worker finishes the frame first.
    pub fn shutdown(mut self) -> Option<FrameProcessor> {
        self.request_shutdown();
        self.handle.take().and_then(|h| h.join().ok())
    }

    fn request_shutdown(&self) {
        let mut mailbox = self.shared.mailbox.lock().unwrap();
        mailbox.shutdown = true;
        self.shared.available.notify_one();
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}
