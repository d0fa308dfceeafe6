//! Heatmap engine
//!
//! Owns one page view's heatmap: the credential, the point set of the last
//! successful load, the rendered frame and the dashboard. The engine never
//! performs I/O itself. A host calls [`HeatmapEngine::begin_refresh`], fetches
//! records however it likes, and hands the outcome back through
//! [`HeatmapEngine::complete_refresh`]. [`HeatmapEngine::refresh_with`] does
//! both for a synchronous [`RecordSource`].
//!
//! ```text
//! Unauthenticated ──authenticate──▶ Idle ──begin──▶ Loading ──ok──▶ Ready
//!        ▲                           ▲                 │              │ ▲
//!        └──────── 401 / sign_out ───┼── failure ──────┘         begin│ │ok / failure
//!                                    │                                ▼ │
//!                                    └───────────────────────────  Refreshing
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::color::HeatmapFrame;
use crate::config::HeatmapConfig;
use crate::dashboard::DashboardSummary;
use crate::error::{FetchError, HeatmapError};
use crate::pipeline::HeatmapPipeline;
use crate::raster::IntensityRaster;
use crate::schema::{InputFormat, RecordAdapter, RecordBatch};
use crate::types::{NormalizedPoint, Surface};

/// Opaque credential for the records endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Lifecycle state of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No credential; the host should show the login prompt
    Unauthenticated,
    /// Credential held, nothing loaded
    Idle,
    /// First load in flight
    Loading,
    /// Frame and dashboard available
    Ready,
    /// Reload in flight, previous frame still shown
    Refreshing,
    /// Torn down; every operation fails
    Disposed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Unauthenticated => "unauthenticated",
            EngineState::Idle => "idle",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Refreshing => "refreshing",
            EngineState::Disposed => "disposed",
        }
    }

    /// Stable numeric code for the C ABI
    pub fn code(&self) -> i32 {
        match self {
            EngineState::Unauthenticated => 0,
            EngineState::Idle => 1,
            EngineState::Loading => 2,
            EngineState::Ready => 3,
            EngineState::Refreshing => 4,
            EngineState::Disposed => 5,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, EngineState::Loading | EngineState::Refreshing)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for one outstanding fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    seq: u64,
}

impl RefreshTicket {
    /// Rebuild a ticket from its sequence number (C ABI hosts)
    pub fn from_seq(seq: u64) -> Self {
        Self { seq }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What a completion did to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New frame and dashboard installed
    Updated,
    /// Ticket was superseded; nothing changed
    Discarded,
    /// Credential rejected and dropped
    CredentialRejected,
    /// Fetch failed; previous frame kept if there was one
    Failed,
}

impl RefreshOutcome {
    /// Stable numeric code for the C ABI
    pub fn code(&self) -> i32 {
        match self {
            RefreshOutcome::Updated => 0,
            RefreshOutcome::Discarded => 1,
            RefreshOutcome::CredentialRejected => 2,
            RefreshOutcome::Failed => 3,
        }
    }
}

/// Something that can fetch a batch of records for a credential
pub trait RecordSource {
    fn fetch(&mut self, token: &BearerToken) -> Result<RecordBatch, FetchError>;
}

/// Record source backed by a file or an in-memory body
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    input: SourceInput,
    format: InputFormat,
}

#[derive(Debug, Clone)]
enum SourceInput {
    Body(String),
    File(PathBuf),
}

impl JsonRecordSource {
    pub fn from_body(body: impl Into<String>, format: InputFormat) -> Self {
        Self {
            input: SourceInput::Body(body.into()),
            format,
        }
    }

    /// Re-read on every fetch, so a refresh picks up file changes
    pub fn from_path(path: impl Into<PathBuf>, format: InputFormat) -> Self {
        Self {
            input: SourceInput::File(path.into()),
            format,
        }
    }
}

impl RecordSource for JsonRecordSource {
    fn fetch(&mut self, _token: &BearerToken) -> Result<RecordBatch, FetchError> {
        let parsed = match &self.input {
            SourceInput::Body(body) => RecordAdapter::parse(body, self.format),
            SourceInput::File(path) => std::fs::read_to_string(path)
                .map_err(HeatmapError::from)
                .and_then(|body| RecordAdapter::parse(&body, self.format)),
        };
        parsed.map_err(|e| FetchError::Network(e.to_string()))
    }
}

/// Heatmap engine for one page view
pub struct HeatmapEngine {
    pipeline: HeatmapPipeline,
    state: EngineState,
    token: Option<BearerToken>,
    surface: Surface,
    points: Arc<[NormalizedPoint]>,
    raster: Option<IntensityRaster>,
    frame: Option<HeatmapFrame>,
    dashboard: Option<DashboardSummary>,
    last_error: Option<HeatmapError>,
    in_flight: Option<u64>,
    next_seq: u64,
    clock: fn() -> DateTime<Utc>,
}

impl HeatmapEngine {
    /// Create an unauthenticated engine with an empty surface
    pub fn new(config: HeatmapConfig) -> Result<Self, HeatmapError> {
        Ok(Self {
            pipeline: HeatmapPipeline::new(&config)?,
            state: EngineState::Unauthenticated,
            token: None,
            surface: Surface::default(),
            points: Arc::from(Vec::new()),
            raster: None,
            frame: None,
            dashboard: None,
            last_error: None,
            in_flight: None,
            next_seq: 1,
            clock: Utc::now,
        })
    }

    /// Use a fixed time source for the rolling windows
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Start from a host-supplied surface, rejecting oversized ones
    pub fn with_surface(mut self, surface: Surface) -> Result<Self, HeatmapError> {
        self.pipeline.check_surface(surface)?;
        self.surface = surface;
        Ok(self)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&BearerToken> {
        self.token.as_ref()
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn frame(&self) -> Option<&HeatmapFrame> {
        self.frame.as_ref()
    }

    pub fn dashboard(&self) -> Option<&DashboardSummary> {
        self.dashboard.as_ref()
    }

    pub fn dashboard_json(&self) -> Result<Option<String>, HeatmapError> {
        self.dashboard
            .as_ref()
            .map(|d| self.pipeline.encode_dashboard(d))
            .transpose()
    }

    pub fn last_error(&self) -> Option<&HeatmapError> {
        self.last_error.as_ref()
    }

    pub fn radius(&self) -> u32 {
        self.pipeline.radius()
    }

    pub fn intensity(&self) -> f32 {
        self.pipeline.intensity()
    }

    /// Install a credential. Any outstanding ticket becomes stale; loaded
    /// data is kept.
    pub fn authenticate(&mut self, token: BearerToken) -> Result<(), HeatmapError> {
        self.ensure_live()?;
        self.token = Some(token);
        self.in_flight = None;
        let next = if self.frame.is_some() {
            EngineState::Ready
        } else {
            EngineState::Idle
        };
        self.transition(next);
        Ok(())
    }

    /// Drop the credential and everything loaded with it
    pub fn sign_out(&mut self) -> Result<(), HeatmapError> {
        self.ensure_live()?;
        self.token = None;
        self.in_flight = None;
        self.clear_loaded();
        self.transition(EngineState::Unauthenticated);
        Ok(())
    }

    /// Start a fetch. At most one may be outstanding.
    pub fn begin_refresh(&mut self) -> Result<RefreshTicket, HeatmapError> {
        self.ensure_live()?;
        if self.token.is_none() {
            return Err(HeatmapError::AuthRequired);
        }
        if self.in_flight.is_some() {
            return Err(HeatmapError::RefreshInFlight);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight = Some(seq);
        let next = if self.state == EngineState::Ready {
            EngineState::Refreshing
        } else {
            EngineState::Loading
        };
        self.transition(next);
        Ok(RefreshTicket { seq })
    }

    /// Apply the outcome of the fetch started with `ticket`
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        outcome: Result<RecordBatch, FetchError>,
    ) -> RefreshOutcome {
        if self.state == EngineState::Disposed || self.in_flight != Some(ticket.seq) {
            tracing::debug!(seq = ticket.seq, state = %self.state, "discarding stale refresh");
            return RefreshOutcome::Discarded;
        }
        self.in_flight = None;

        match outcome {
            Ok(batch) => {
                let processed = self.pipeline.process(&batch, (self.clock)());
                self.points = processed.points;
                self.dashboard = Some(processed.dashboard);
                self.last_error = None;
                self.rerender();
                self.transition(EngineState::Ready);
                RefreshOutcome::Updated
            }
            Err(FetchError::Unauthorized) => {
                tracing::warn!("credential rejected by record source");
                self.token = None;
                self.clear_loaded();
                self.last_error = Some(HeatmapError::AuthRequired);
                self.transition(EngineState::Unauthenticated);
                RefreshOutcome::CredentialRejected
            }
            Err(FetchError::Network(message)) => {
                tracing::warn!(error = %message, "record fetch failed");
                self.last_error = Some(HeatmapError::NetworkFailure(message));
                let next = if self.frame.is_some() {
                    EngineState::Ready
                } else {
                    EngineState::Idle
                };
                self.transition(next);
                RefreshOutcome::Failed
            }
        }
    }

    /// Begin, fetch from `source` and complete in one call
    pub fn refresh_with<S: RecordSource>(&mut self, source: &mut S) -> Result<RefreshOutcome, HeatmapError> {
        let ticket = self.begin_refresh()?;
        let outcome = match &self.token {
            Some(token) => source.fetch(token),
            None => Err(FetchError::Unauthorized),
        };
        Ok(self.complete_refresh(ticket, outcome))
    }

    /// Track a new surface size. Only the raster and frame are rebuilt.
    /// An oversized surface is rejected and the current frame kept.
    pub fn resize(&mut self, surface: Surface) -> Result<(), HeatmapError> {
        self.ensure_live()?;
        if surface == self.surface {
            return Ok(());
        }
        self.pipeline.check_surface(surface)?;
        self.surface = surface;
        if self.dashboard.is_some() {
            self.rerender();
        }
        Ok(())
    }

    pub fn set_radius(&mut self, radius_px: u32) -> Result<(), HeatmapError> {
        self.ensure_live()?;
        self.pipeline.set_radius(radius_px)?;
        if self.dashboard.is_some() {
            self.rerender();
        }
        Ok(())
    }

    /// Change the global intensity. The raster is reused.
    pub fn set_intensity(&mut self, intensity: f32) -> Result<(), HeatmapError> {
        self.ensure_live()?;
        self.pipeline.set_intensity(intensity)?;
        if let Some(raster) = &self.raster {
            self.frame = Some(self.pipeline.colorize(raster));
        }
        Ok(())
    }

    /// Release everything. Later completions are discarded.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        self.token = None;
        self.in_flight = None;
        self.last_error = None;
        self.clear_loaded();
        self.transition(EngineState::Disposed);
    }

    fn ensure_live(&self) -> Result<(), HeatmapError> {
        if self.state == EngineState::Disposed {
            Err(HeatmapError::Disposed)
        } else {
            Ok(())
        }
    }

    fn rerender(&mut self) {
        let raster = self.pipeline.rasterize(&self.points, self.surface);
        self.frame = Some(self.pipeline.colorize(&raster));
        self.raster = Some(raster);
    }

    fn clear_loaded(&mut self) {
        self.points = Arc::from(Vec::new());
        self.raster = None;
        self.frame = None;
        self.dashboard = None;
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "engine state changed");
            self.state = next;
        }
    }
}
