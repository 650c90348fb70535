pub mod csv;
pub mod feed;
pub mod text;

pub use self::csv::{rows_for_tick, EventLogWorker, EventLogWriter, LogRow};
pub use feed::{spawn_line_reader, ReaderStats, SampleFeed};
pub use text::{decode_sample_line, TransientReadError};
