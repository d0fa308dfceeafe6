//! Engine configuration.
//!
//! Every field has a documented default, so an empty JSON object is a valid
//! configuration. `validate` is called by the engine before anything is
//! rendered.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::aggregator::{default_windows, TimeWindow};
use crate::classifier::{ClickLabelClassifier, FieldDictionary};
use crate::color::{ColorRamp, RampSettings};
use crate::dashboard::{DurationUnits, DEFAULT_TOP_CLICKS};
use crate::error::HeatmapError;
use crate::normalizer::DocumentDefaults;
use crate::raster::RasterSettings;

/// 8192 × 8192 pixels.
pub const DEFAULT_MAX_SURFACE_CELLS: usize = 8192 * 8192;

/// Heatmap engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Kernel radius, weighting and noise floor.
    pub raster: RasterSettings,

    /// Color stops, alpha boost and global intensity.
    pub ramp: RampSettings,

    /// Rolling windows shown on the dashboard.
    pub windows: Vec<TimeWindow>,

    /// Length of the ranked click list.
    pub top_clicks: usize,

    /// Document size assumed for trails without usable geometry.
    pub document: DocumentDefaults,

    /// Largest render surface, in pixels, the engine will allocate for.
    pub max_surface_cells: usize,

    /// Unit words used in dashboard duration text.
    pub duration_units: DurationUnits,

    /// Extra or overriding form field display names, keyed by DOM id.
    pub field_names: BTreeMap<String, String>,

    /// Logging configuration (used by the CLI).
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pageheat=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            raster: RasterSettings::default(),
            ramp: RampSettings::default(),
            windows: default_windows(),
            top_clicks: DEFAULT_TOP_CLICKS,
            document: DocumentDefaults::default(),
            max_surface_cells: DEFAULT_MAX_SURFACE_CELLS,
            duration_units: DurationUnits::default(),
            field_names: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl HeatmapConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, HeatmapError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file.
    pub fn load(path: &Path) -> Result<Self, HeatmapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load config from the standard location, falling back to defaults.
    pub fn load_or_default() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, HeatmapError> {
        serde_json::to_string_pretty(self).map_err(HeatmapError::JsonError)
    }

    /// Check every tunable for a usable value.
    pub fn validate(&self) -> Result<(), HeatmapError> {
        let raster = &self.raster;
        if raster.radius_px == 0 {
            return invalid("raster.radius_px must be positive");
        }
        if !(raster.weight_scale.is_finite() && raster.weight_scale > 0.0) {
            return invalid("raster.weight_scale must be a positive number");
        }
        if !(raster.min_weight.is_finite() && raster.min_weight > 0.0) {
            return invalid("raster.min_weight must be a positive number");
        }
        if !(raster.max_weight.is_finite() && raster.max_weight >= raster.min_weight) {
            return invalid("raster.max_weight must be at least raster.min_weight");
        }
        if !(raster.noise_floor.is_finite() && raster.noise_floor >= 0.0) {
            return invalid("raster.noise_floor must be non-negative");
        }

        let ramp = &self.ramp;
        if !(ramp.boost_factor.is_finite() && ramp.boost_factor > 0.0) {
            return invalid("ramp.boost_factor must be a positive number");
        }
        validate_intensity(ramp.intensity)?;
        ColorRamp::new(ramp.stops.clone())?;

        let mut names = HashSet::new();
        for window in &self.windows {
            if window.name.trim().is_empty() {
                return invalid("window names must not be empty");
            }
            if window.seconds <= 0 {
                return invalid(&format!("window {:?} must have a positive duration", window.name));
            }
            if !names.insert(window.name.as_str()) {
                return invalid(&format!("duplicate window {:?}", window.name));
            }
        }

        let doc = &self.document;
        if !(doc.width.is_finite() && doc.width > 0.0 && doc.height.is_finite() && doc.height > 0.0) {
            return invalid("document defaults must be positive");
        }

        if self.max_surface_cells == 0 {
            return invalid("max_surface_cells must be positive");
        }

        let units = &self.duration_units;
        if [&units.seconds, &units.minutes, &units.hours]
            .iter()
            .any(|unit| unit.trim().is_empty())
        {
            return invalid("duration_units must not be empty");
        }

        Ok(())
    }

    /// Validated color ramp built from `ramp.stops`.
    pub fn color_ramp(&self) -> Result<ColorRamp, HeatmapError> {
        ColorRamp::new(self.ramp.stops.clone())
    }

    /// Classifier using the default field table plus `field_names`.
    pub fn classifier(&self) -> ClickLabelClassifier {
        ClickLabelClassifier::new(FieldDictionary::with_overrides(&self.field_names))
    }
}

/// The global intensity control lives in `[0, 1]`.
pub fn validate_intensity(intensity: f32) -> Result<(), HeatmapError> {
    if (0.0..=1.0).contains(&intensity) {
        Ok(())
    } else {
        invalid(&format!("intensity must be within [0, 1], got {}", intensity))
    }
}

fn invalid(message: &str) -> Result<(), HeatmapError> {
    Err(HeatmapError::InvalidConfig(message.to_string()))
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("pageheat").join("config.json")
}
