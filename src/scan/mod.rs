//! Volume scans
//!
//! - `ScanRequest`: validated symbols, threshold and expiry filter
//! - `Scanner`: worker-pool orchestrator
//! - `ScanResult` / `ScanSummary`: ordered contracts and totals
//! - Progress events and sinks

pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod result;

pub use orchestrator::*;
pub use progress::*;
pub use request::*;
pub use result::*;
