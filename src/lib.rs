//! pageheat - Cursor heatmap and engagement dashboard engine
//!
//! pageheat turns batches of per-session behavior records captured on a web
//! page (cursor trails, click tags, dwell time) into a colored density heatmap
//! and a set of dashboard statistics through a deterministic pipeline:
//! record decoding → normalization → click classification → temporal
//! aggregation and density rasterization → color mapping.
//!
//! ## Modules
//!
//! - **Pipeline**: stateless one-shot processing of a record batch
//! - **Engine**: per-page-view state machine driven by the host (sans-IO)

pub mod aggregator;
pub mod classifier;
pub mod color;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
pub mod normalizer;
pub mod pipeline;
pub mod raster;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use color::{ColorRamp, ColorStop, HeatmapFrame};
pub use config::HeatmapConfig;
pub use dashboard::DashboardSummary;
pub use engine::{BearerToken, EngineState, HeatmapEngine, RecordSource, RefreshOutcome, RefreshTicket};
pub use error::{FetchError, HeatmapError};
pub use pipeline::{records_to_dashboard, render_records, HeatmapPipeline};
pub use types::{NormalizedPoint, Surface};

// Schema exports
pub use schema::{InputFormat, RecordAdapter, RecordBatch, SCHEMA_VERSION};

/// Library version embedded in every dashboard
pub const PAGEHEAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for dashboard payloads
pub const PRODUCER_NAME: &str = "pageheat";
