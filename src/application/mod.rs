//! Application layer - services composed from ports.

pub mod pipeline;
pub mod selector;
pub mod status;

pub use pipeline::{Admission, IngestError, Pipeline, Toolchain, UploadRequest};
pub use selector::{SelectorSettings, StrategyReport, StrategySelector};
pub use status::{query_status, StatusView, ViewStatus};
