//! Pipeline orchestration
//!
//! Wires the stages together: decoded records → normalizer → aggregator and
//! rasterizer → color ramp → frame and dashboard. The pipeline itself holds
//! only configuration; the engine owns the per-load state.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::aggregator::TemporalAggregator;
use crate::classifier::ClickLabelClassifier;
use crate::color::{colorize, ColorRamp, HeatmapFrame};
use crate::config::{validate_intensity, HeatmapConfig};
use crate::dashboard::{DashboardEncoder, DashboardSummary, InputQuality};
use crate::error::HeatmapError;
use crate::normalizer::RecordNormalizer;
use crate::raster::{DensityRasterizer, IntensityRaster};
use crate::schema::{InputFormat, RecordAdapter, RecordBatch};
use crate::types::{NormalizedPoint, Surface};

/// Surface-independent result of processing one batch
#[derive(Debug, Clone)]
pub struct ProcessedBatch {
    pub points: Arc<[NormalizedPoint]>,
    pub dashboard: DashboardSummary,
}

/// Convert a JSON array of records to dashboard JSON (stateless, one-shot).
///
/// # Arguments
/// * `records_json` - Response body of the records endpoint
/// * `now` - Reference instant for the rolling windows
///
/// # Example
/// ```ignore
/// let dashboard_json = records_to_dashboard(body, Utc::now())?;
/// ```
pub fn records_to_dashboard(records_json: &str, now: DateTime<Utc>) -> Result<String, HeatmapError> {
    let pipeline = HeatmapPipeline::new(&HeatmapConfig::default())?;
    let batch = RecordAdapter::parse_array(records_json)?;
    let processed = pipeline.process(&batch, now);
    pipeline.encode_dashboard(&processed.dashboard)
}

/// Decode, process and render a record body in one call.
pub fn render_records(
    body: &str,
    format: InputFormat,
    surface: Surface,
    config: &HeatmapConfig,
    now: DateTime<Utc>,
) -> Result<(HeatmapFrame, DashboardSummary), HeatmapError> {
    let pipeline = HeatmapPipeline::new(config)?;
    let batch = RecordAdapter::parse(body, format)?;
    let processed = pipeline.process(&batch, now);
    let frame = pipeline.render(&processed.points, surface)?;
    Ok((frame, processed.dashboard))
}

/// Configured chain of pipeline stages
pub struct HeatmapPipeline {
    normalizer: RecordNormalizer,
    classifier: ClickLabelClassifier,
    aggregator: TemporalAggregator,
    rasterizer: DensityRasterizer,
    ramp: ColorRamp,
    boost_factor: f32,
    intensity: f32,
    max_surface_cells: usize,
    encoder: DashboardEncoder,
}

impl HeatmapPipeline {
    /// Build every stage from a validated configuration
    pub fn new(config: &HeatmapConfig) -> Result<Self, HeatmapError> {
        config.validate()?;
        Ok(Self {
            normalizer: RecordNormalizer::new(config.document),
            classifier: config.classifier(),
            aggregator: TemporalAggregator::new(config.windows.clone()),
            rasterizer: DensityRasterizer::new(config.raster.clone()),
            ramp: config.color_ramp()?,
            boost_factor: config.ramp.boost_factor,
            intensity: config.ramp.intensity,
            max_surface_cells: config.max_surface_cells,
            encoder: DashboardEncoder::new(config.top_clicks)
                .with_units(config.duration_units.clone()),
        })
    }

    /// Replace the encoder's random instance ID
    pub fn with_instance_id(mut self, instance_id: String) -> Self {
        let top_clicks = self.encoder.top_clicks();
        let units = self.encoder.units().clone();
        self.encoder = DashboardEncoder::with_instance_id(instance_id, top_clicks).with_units(units);
        self
    }

    pub fn radius(&self) -> u32 {
        self.rasterizer.settings().radius_px
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn set_radius(&mut self, radius_px: u32) -> Result<(), HeatmapError> {
        if radius_px == 0 {
            return Err(HeatmapError::InvalidConfig(
                "radius must be positive".to_string(),
            ));
        }
        self.rasterizer.set_radius(radius_px);
        Ok(())
    }

    pub fn set_intensity(&mut self, intensity: f32) -> Result<(), HeatmapError> {
        validate_intensity(intensity)?;
        self.intensity = intensity;
        Ok(())
    }

    /// Normalize and aggregate a batch. The result does not depend on the
    /// surface, so it can be kept and re-rendered on resize.
    pub fn process(&self, batch: &RecordBatch, now: DateTime<Utc>) -> ProcessedBatch {
        // Stage 1: Normalize points, sum click labels, collect session scalars
        let normalized = self.normalizer.normalize_batch(&batch.records, &self.classifier);

        // Stage 2: Aggregate dwell over the rolling windows
        let temporal = self.aggregator.aggregate(&normalized.sessions, now);

        // Stage 3: Encode dashboard values
        let quality = InputQuality {
            rejected_records: batch.rejected.len(),
            records_with_issues: batch.records_with_issues(),
        };
        let dashboard = self.encoder.encode(
            &temporal,
            &normalized.click_totals,
            normalized.points.len(),
            quality,
            now,
        );

        ProcessedBatch {
            points: normalized.points.into(),
            dashboard,
        }
    }

    /// Reject surfaces above `max_surface_cells` before anything is allocated
    pub fn check_surface(&self, surface: Surface) -> Result<(), HeatmapError> {
        match surface.checked_cell_count() {
            Some(cells) if cells <= self.max_surface_cells => Ok(()),
            _ => Err(HeatmapError::InvalidConfig(format!(
                "surface {}x{} exceeds the {} pixel limit",
                surface.width, surface.height, self.max_surface_cells
            ))),
        }
    }

    /// The surface must already have passed [`Self::check_surface`]
    pub fn rasterize(&self, points: &[NormalizedPoint], surface: Surface) -> IntensityRaster {
        self.rasterizer.rasterize(points, surface)
    }

    pub fn colorize(&self, raster: &IntensityRaster) -> HeatmapFrame {
        colorize(raster, &self.ramp, self.boost_factor, self.intensity)
    }

    /// Check the surface, then rasterize and colorize
    pub fn render(&self, points: &[NormalizedPoint], surface: Surface) -> Result<HeatmapFrame, HeatmapError> {
        self.check_surface(surface)?;
        Ok(self.colorize(&self.rasterize(points, surface)))
    }

    pub fn encode_dashboard(&self, dashboard: &DashboardSummary) -> Result<String, HeatmapError> {
        self.encoder.encode_to_json(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn sample_records_json() -> &'static str {
        r#"[
            {
                "id": 1,
                "created_at": "2024-06-30T10:00:00",
                "time_on_page_seconds": "125",
                "buttons_clicked": "{\"Отправить заявку\": 2, \"input#name\": 1, \"div\": 4}",
                "cursor_hover_data": "{\"w\": 1000, \"h\": 2000, \"pts\": [[500, 1000], [510, 1010]]}"
            },
            {
                "id": 2,
                "created_at": "2024-06-20T10:00:00Z",
                "time_on_page_seconds": 45,
                "buttons_clicked": {"Отправить заявку": 1},
                "cursor_hover_data": {"w": 1000, "h": 2000, "pts": [[500, 1000]]}
            },
            {
                "id": 3,
                "created_at": "2023-01-01T00:00:00Z",
                "time_on_page_seconds": 30
            }
        ]"#
    }

    #[test]
    fn test_records_to_dashboard() {
        let json = records_to_dashboard(sample_records_json(), now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["producer"]["name"], "pageheat");
        assert_eq!(value["has_data"], true);
        assert_eq!(value["total_sessions"], 3);
        assert_eq!(value["total_points"], 3);
        assert_eq!(value["dwell"]["total_seconds"], 200);
        assert_eq!(value["dwell"]["max_text"], "2 мин 5 сек");
        assert_eq!(value["windows"][0]["name"], "day");
        assert_eq!(value["windows"][0]["session_count"], 1);
        assert_eq!(value["windows"][1]["session_count"], 1);
        assert_eq!(value["windows"][2]["session_count"], 2);
        assert_eq!(value["top_clicks"][0]["label"], "Отправить заявку");
        assert_eq!(value["top_clicks"][0]["count"], 3);
        assert_eq!(value["top_clicks"][1]["label"], "Поле «Имя»");
        assert_eq!(value["top_clicks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_three_sessions_without_timestamps() {
        let json = r#"[
            {"time_on_page_seconds": 10},
            {"time_on_page_seconds": 20},
            {"time_on_page_seconds": 30}
        ]"#;
        let pipeline = HeatmapPipeline::new(&HeatmapConfig::default()).unwrap();
        let batch = RecordAdapter::parse_array(json).unwrap();
        let processed = pipeline.process(&batch, now());
        let dashboard = &processed.dashboard;

        assert_eq!(dashboard.total_sessions, 3);
        assert_eq!(dashboard.dwell.total_seconds, 60);
        assert_eq!(dashboard.dwell.average_seconds, Some(20.0));
        assert_eq!(dashboard.dwell.max_seconds, 30);
        assert!(!dashboard.has_data);
        assert!(processed.points.is_empty());
        for window in &dashboard.windows {
            assert_eq!(window.session_count, 0);
            assert_eq!(window.average_dwell_text, None);
        }
    }

    #[test]
    fn test_render_two_identical_points() {
        let mut config = HeatmapConfig::default();
        config.raster.radius_px = 10;
        config.ramp.intensity = 1.0;
        let body = r#"[{"cursor_hover_data": {"w": 200, "h": 200, "pts": [[100, 100], [100, 100]]}}]"#;

        let (frame, dashboard) =
            render_records(body, InputFormat::Json, Surface::new(100, 100), &config, now()).unwrap();

        assert_eq!(dashboard.total_points, 2);
        assert_eq!(frame.pixel(50, 50), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_render_points_from_two_records() {
        let mut config = HeatmapConfig::default();
        config.raster.radius_px = 10;
        config.ramp.intensity = 1.0;
        let body = r#"[
            {"time_on_page_seconds": 4, "cursor_hover_data": {"w": 200, "h": 200, "pts": [[100, 100]]}},
            {"time_on_page_seconds": 6, "cursor_hover_data": "{\"w\": 400, \"h\": 800, \"pts\": [[200, 400]]}"}
        ]"#;

        let (frame, dashboard) =
            render_records(body, InputFormat::Json, Surface::new(100, 100), &config, now()).unwrap();

        assert_eq!(dashboard.total_sessions, 2);
        assert_eq!(dashboard.total_points, 2);
        assert_eq!(dashboard.dwell.total_seconds, 10);
        assert_eq!(frame.pixel(50, 50), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_oversized_surface_rejected() {
        let mut config = HeatmapConfig::default();
        config.max_surface_cells = 10_000;
        let pipeline = HeatmapPipeline::new(&config).unwrap();

        assert!(pipeline.check_surface(Surface::new(100, 100)).is_ok());
        assert!(matches!(
            pipeline.check_surface(Surface::new(101, 100)),
            Err(HeatmapError::InvalidConfig(_))
        ));

        let result = render_records(
            "[]",
            InputFormat::Json,
            Surface::new(u32::MAX, u32::MAX),
            &HeatmapConfig::default(),
            now(),
        );
        assert!(matches!(result, Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn test_configured_duration_units() {
        let mut config = HeatmapConfig::default();
        config.duration_units.seconds = "s".to_string();
        config.duration_units.minutes = "m".to_string();
        let pipeline = HeatmapPipeline::new(&config)
            .unwrap()
            .with_instance_id("fixed".to_string());
        let batch = RecordAdapter::parse_array(sample_records_json()).unwrap();
        let dashboard = pipeline.process(&batch, now()).dashboard;

        assert_eq!(dashboard.dwell.max_text, "2 m 5 s");
        assert_eq!(dashboard.producer.instance_id, "fixed");
    }

    #[test]
    fn test_empty_batch_renders_transparent() {
        let pipeline = HeatmapPipeline::new(&HeatmapConfig::default()).unwrap();
        let batch = RecordAdapter::parse_array("[]").unwrap();
        let processed = pipeline.process(&batch, now());
        let frame = pipeline.render(&processed.points, Surface::new(16, 16)).unwrap();

        assert!(frame.is_transparent());
        assert!(!processed.dashboard.has_data);
        assert_eq!(processed.dashboard.total_sessions, 0);
        assert_eq!(processed.dashboard.dwell.average_seconds, None);
    }

    #[test]
    fn test_settings_validated() {
        let mut pipeline = HeatmapPipeline::new(&HeatmapConfig::default()).unwrap();
        assert!(pipeline.set_radius(0).is_err());
        assert!(pipeline.set_intensity(1.2).is_err());
        pipeline.set_radius(15).unwrap();
        pipeline.set_intensity(0.3).unwrap();
        assert_eq!(pipeline.radius(), 15);
        assert_eq!(pipeline.intensity(), 0.3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = HeatmapConfig::default();
        config.ramp.boost_factor = -1.0;
        assert!(matches!(
            HeatmapPipeline::new(&config),
            Err(HeatmapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_quality_counts() {
        let pipeline = HeatmapPipeline::new(&HeatmapConfig::default())
            .unwrap()
            .with_instance_id("fixed".to_string());
        let batch = RecordAdapter::parse_array(r#"[1, {"buttons_clicked": "{nope"}]"#).unwrap();
        let dashboard = pipeline.process(&batch, now()).dashboard;

        assert_eq!(dashboard.producer.instance_id, "fixed");
        assert_eq!(dashboard.quality.rejected_records, 1);
        assert_eq!(dashboard.quality.records_with_issues, 1);
        assert_eq!(dashboard.total_sessions, 1);
    }
}
