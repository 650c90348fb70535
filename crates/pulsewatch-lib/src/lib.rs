pub mod buffer;
pub mod config;
pub mod detectors;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod monitor;
pub mod plot;
pub mod signal;
pub mod stats;

pub use buffer::*;
pub use config::*;
pub use detectors::*;
pub use filters::*;
pub use metrics::*;
pub use monitor::*;
pub use signal::*;
