pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod signal;
pub mod store;

pub use config::*;
pub use detectors::*;
pub use error::*;
pub use metrics::*;
pub use pipeline::*;
pub use report::*;
pub use signal::*;
pub use store::*;
