// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod model;

// Core pipeline
pub mod captions;
pub mod fingerprint;
pub mod summarize;
pub mod tracker;

// Sources, state, delivery
pub mod feed;
pub mod notify;
pub mod page;
pub mod store;

pub mod metrics;
pub mod monitor;
pub mod pacing;

// ---- Re-exports for stable public API ----
pub use crate::captions::CaptionPipeline;
pub use crate::config::MonitorConfig;
pub use crate::error::{FetchError, FetchResult};
pub use crate::fingerprint::fingerprint;
pub use crate::model::{Entry, Link, PageSnapshot, RawFeedEntry, Source, SourceKind, Update};
pub use crate::monitor::{CycleReport, CycleTiming, Monitor, MonitorParts};
pub use crate::notify::{Notifier, NotifierMux};
pub use crate::store::{JsonFileStore, MemoryStore, StateStore};
pub use crate::summarize::{ChunkedSummarizer, Summary};
pub use crate::tracker::{StateQuery, Tracker};
