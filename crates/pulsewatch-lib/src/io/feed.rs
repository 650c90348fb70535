use crate::{io::text::decode_sample_bytes, signal::MonitorClock, signal::RawSample};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};
use std::io::BufRead;
use std::thread::JoinHandle;

/// Tick-side end of the transport queue.
///
/// The transport pushes stamped samples from its own thread; the tick driver
/// drains everything pending without blocking.
#[derive(Debug)]
pub struct SampleFeed {
    rx: Receiver<RawSample>,
    closed: bool,
}

impl SampleFeed {
    pub fn channel() -> (Sender<RawSample>, SampleFeed) {
        let (tx, rx) = unbounded();
        (tx, SampleFeed { rx, closed: false })
    }

    /// Take every sample queued so far. Never blocks.
    pub fn drain(&mut self) -> Vec<RawSample> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(sample) => out.push(sample),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        out
    }

    /// True once the sender is gone and the queue has been emptied.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub decoded: u64,
    pub dropped: u64,
}

/// Read newline-delimited samples from `reader` on a background thread.
///
/// Each decoded line is stamped with `clock` on arrival. Garbled lines are
/// dropped and counted. The thread ends at EOF, on a read error, or when the
/// feed is dropped.
pub fn spawn_line_reader<R>(reader: R, clock: MonitorClock) -> (SampleFeed, JoinHandle<ReaderStats>)
where
    R: BufRead + Send + 'static,
{
    let (tx, feed) = SampleFeed::channel();
    let handle = std::thread::spawn(move || read_lines(reader, clock, tx));
    (feed, handle)
}

fn read_lines<R: BufRead>(mut reader: R, clock: MonitorClock, tx: Sender<RawSample>) -> ReaderStats {
    let mut stats = ReaderStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("transport read failed: {err}");
                break;
            }
        }
        match decode_sample_bytes(&line) {
            Ok(value) => {
                stats.decoded += 1;
                if tx.send(RawSample::new(value, clock.now())).is_err() {
                    break;
                }
            }
            Err(err) => {
                stats.dropped += 1;
                debug!("discarding transport line: {err}");
            }
        }
    }
    stats
}
