use crate::monitor::MonitorEvent;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use csv::{Writer, WriterBuilder};
use log::{debug, warn};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::thread::JoinHandle;

pub const LOG_HEADER: [&str; 5] = ["Timestamp", "Raw_Signal", "Filtered_Signal", "BPM", "Event"];

/// One line of the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub timestamp: f64,
    pub raw: i32,
    pub filtered: f64,
    pub bpm: Option<f64>,
    pub event: &'static str,
}

impl LogRow {
    fn record(&self) -> [String; 5] {
        [
            format!("{:.4}", self.timestamp),
            self.raw.to_string(),
            format!("{:.3}", self.filtered),
            self.bpm.map(|b| format!("{b:.1}")).unwrap_or_default(),
            self.event.to_string(),
        ]
    }
}

/// Rows for one tick's events: the tick row, then one per beat or alert.
///
/// Beat rows repeat the tick's raw and filtered values and carry the
/// instantaneous rate. Quality transitions add no row of their own; the tick
/// row is already tagged while the lead is off.
pub fn rows_for_tick(events: &[MonitorEvent]) -> Vec<LogRow> {
    let Some(MonitorEvent::Tick(record)) = events.first() else {
        return Vec::new();
    };
    let mut rows = vec![LogRow {
        timestamp: record.t,
        raw: record.raw,
        filtered: record.filtered,
        bpm: record.bpm,
        event: events[0].status_tag(),
    }];
    for event in &events[1..] {
        if let MonitorEvent::Beat(beat) | MonitorEvent::PrematureBeat(beat) = event {
            rows.push(LogRow {
                timestamp: beat.t,
                raw: record.raw,
                filtered: record.filtered,
                bpm: Some(beat.instant_bpm),
                event: event.status_tag(),
            });
        }
    }
    rows
}

/// CSV event log with the fixed five-column header.
pub struct EventLogWriter<W: Write> {
    writer: Writer<W>,
    rows: u64,
}

impl EventLogWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create event log {}", path.display()))?;
        Self::new(file)
    }
}

impl<W: Write> EventLogWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(inner);
        writer
            .write_record(LOG_HEADER)
            .context("writing event log header")?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_row(&mut self, row: &LogRow) -> Result<()> {
        self.writer
            .write_record(row.record())
            .context("writing event log row")?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flushing event log")
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow!("flushing event log: {}", err.error()))
    }
}

/// Runs an [`EventLogWriter`] on its own thread.
///
/// `submit` never blocks: when the queue is full the row is dropped and
/// counted, so a slow disk cannot stall the tick loop.
pub struct EventLogWorker {
    tx: Option<Sender<LogRow>>,
    handle: Option<JoinHandle<Result<u64>>>,
    dropped: u64,
}

impl EventLogWorker {
    pub fn spawn<W>(mut writer: EventLogWriter<W>, capacity: usize) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = bounded::<LogRow>(capacity.max(1));
        let handle = std::thread::spawn(move || -> Result<u64> {
            for row in rx.iter() {
                writer.write_row(&row)?;
            }
            writer.flush()?;
            Ok(writer.rows_written())
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
            dropped: 0,
        }
    }

    /// Queue `row`; returns false if it had to be dropped.
    pub fn submit(&mut self, row: LogRow) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(row) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped == 1 {
                    warn!("event log is falling behind; dropping rows");
                } else {
                    debug!("event log dropped {} rows so far", self.dropped);
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                warn!("event log writer stopped; dropping rows");
                self.tx = None;
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Close the queue, wait for pending rows and return how many were written.
    pub fn finish(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        self.tx = None;
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("event log thread panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for EventLogWorker {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("event log writer failed: {err:#}");
        }
    }
}
