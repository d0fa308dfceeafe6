//! Behavior record input schema
//!
//! This module defines the wire format served by the record store and the
//! adapter that decodes whole batches with per-record and per-field fallback.

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
