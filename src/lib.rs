mod client;
mod error;
pub mod format;
mod logger;
mod protocol;
mod types;
pub mod watcher;

pub use client::{apply_ac_changes, AcApi, SensiboClient, SensiboClientBuilder};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::DEFAULT_BASE_URL;
pub use types::*;
pub use watcher::{
    CycleReport, Decision, FailurePolicy, PodDecision, StopReason, Stopped, Thresholds, Watcher,
    WatcherBuilder,
};
