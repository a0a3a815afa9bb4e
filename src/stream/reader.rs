//! Pull-based access to the dataset
//!
//! [`RecordStream`] runs [`parse_dataset`] on a reader thread and hands events
//! across a bounded channel, so the consumer pulls records one at a time and
//! memory stays bounded by the channel capacity, not by the card count.

use crate::error::StreamError;
use crate::progress::ProgressState;
use crate::stream::seed::{parse_dataset, EventSink};
use crate::types::StreamEvent;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::io::{self, BufReader, Read};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

pub type StreamItem = Result<StreamEvent, StreamError>;

/// Wraps a reader and adds every byte it yields to `ProgressState::bytes_read`
pub struct CountingReader<R> {
    inner: R,
    progress: Arc<ProgressState>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, progress: Arc<ProgressState>) -> Self {
        CountingReader { inner, progress }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.add_bytes(n as u64);
        Ok(n)
    }
}

struct ChannelSink(Sender<StreamItem>);

impl EventSink for ChannelSink {
    fn emit(&mut self, event: StreamEvent) -> bool {
        self.0.send(Ok(event)).is_ok()
    }
}

/// Lazy, forward-only sequence of dataset events
pub struct RecordStream {
    rx: Receiver<StreamItem>,
    producer: Option<JoinHandle<()>>,
    finished: bool,
}

impl RecordStream {
    /// Events buffered between the reader thread and the consumer
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new<R>(reader: R, progress: Arc<ProgressState>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::with_capacity(reader, progress, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity<R>(reader: R, progress: Arc<ProgressState>, capacity: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = bounded::<StreamItem>(capacity.max(1));

        let producer = std::thread::spawn(move || {
            let reader = BufReader::new(CountingReader::new(reader, progress));
            let mut sink = ChannelSink(tx);
            match parse_dataset(reader, &mut sink) {
                Ok(()) => debug!("input fully parsed"),
                Err(StreamError::Closed) => debug!("record stream dropped before end of input"),
                Err(err) => {
                    // The consumer may already be gone; nothing else to tell
                    let _ = sink.0.send(Err(err));
                }
            }
        });

        RecordStream {
            rx,
            producer: Some(producer),
            finished: false,
        }
    }

    fn join_producer(&mut self) -> Option<StreamItem> {
        let handle = self.producer.take()?;
        match handle.join() {
            Ok(()) => None,
            Err(_) => Some(Err(StreamError::Read(io::Error::new(
                io::ErrorKind::Other,
                "input reader thread panicked",
            )))),
        }
    }
}

impl Iterator for RecordStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        if self.finished {
            return None;
        }

        match self.rx.recv() {
            Ok(Ok(event)) => Some(Ok(event)),
            Ok(Err(err)) => {
                self.finished = true;
                self.join_producer();
                Some(Err(err))
            }
            Err(_) => {
                // Sender dropped: the reader thread is done
                self.finished = true;
                self.join_producer()
            }
        }
    }
}
