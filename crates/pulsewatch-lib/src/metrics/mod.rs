pub mod hrv;
pub mod rhythm;
pub mod sqi;

pub use hrv::*;
pub use rhythm::*;
pub use sqi::*;
