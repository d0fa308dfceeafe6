//! Density rasterization
//!
//! Every normalized point stamps a radial falloff kernel onto a float raster
//! sized to the render surface. Stamps add up, so regions visited by many
//! sessions reinforce each other. The per-point weight adapts to the number
//! of points: thousands of samples must not wash the raster out, a handful
//! must still be visible.

use serde::{Deserialize, Serialize};

use crate::types::{NormalizedPoint, Surface};

/// Default kernel radius in pixels
pub const DEFAULT_RADIUS_PX: u32 = 30;

/// Numerator of the adaptive weight (`k / point_count`)
pub const DEFAULT_WEIGHT_SCALE: f32 = 40.0;

/// Lower bound of the adaptive per-point weight
pub const DEFAULT_MIN_WEIGHT: f32 = 0.04;

/// Upper bound of the adaptive per-point weight
pub const DEFAULT_MAX_WEIGHT: f32 = 0.35;

/// Accumulated values below this are floating-point residue
pub const DEFAULT_NOISE_FLOOR: f32 = 2.0 / 255.0;

/// Radial falloff shape; `t` is distance / radius
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalloffKernel {
    /// `1 - t`, the profile of a canvas radial gradient
    #[default]
    Linear,
    /// `(1 - t²)²`, flat top with soft edges
    Smooth,
}

impl FalloffKernel {
    /// Kernel value in `[0, 1]`: 1 at the center, 0 at and beyond the radius
    pub fn falloff(&self, t: f32) -> f32 {
        if !(0.0..1.0).contains(&t) {
            return 0.0;
        }
        match self {
            FalloffKernel::Linear => 1.0 - t,
            FalloffKernel::Smooth => {
                let s = 1.0 - t * t;
                s * s
            }
        }
    }
}

/// Tunables of the rasterizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    pub radius_px: u32,
    pub kernel: FalloffKernel,
    pub weight_scale: f32,
    pub min_weight: f32,
    pub max_weight: f32,
    pub noise_floor: f32,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_RADIUS_PX,
            kernel: FalloffKernel::default(),
            weight_scale: DEFAULT_WEIGHT_SCALE,
            min_weight: DEFAULT_MIN_WEIGHT,
            max_weight: DEFAULT_MAX_WEIGHT,
            noise_floor: DEFAULT_NOISE_FLOOR,
        }
    }
}

impl RasterSettings {
    /// `clamp(weight_scale / point_count, min_weight, max_weight)`
    pub fn adaptive_weight(&self, point_count: usize) -> f32 {
        if point_count == 0 {
            return self.max_weight;
        }
        (self.weight_scale / point_count as f32).clamp(self.min_weight, self.max_weight)
    }
}

/// Row-major grid of accumulated intensity
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityRaster {
    surface: Surface,
    cells: Vec<f32>,
}

impl IntensityRaster {
    /// All-zero raster for `surface`
    pub fn zeroed(surface: Surface) -> Self {
        Self {
            surface,
            cells: vec![0.0; surface.cell_count()],
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.surface.width || y >= self.surface.height {
            return None;
        }
        Some(self.cells[self.index(x, y)])
    }

    /// Global maximum, or `1.0` when every cell is zero
    pub fn max_intensity(&self) -> f32 {
        let max = self.cells.iter().copied().fold(0.0_f32, f32::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    }

    /// Coordinates of the first cell holding the maximum (row-major order)
    pub fn peak(&self) -> Option<(u32, u32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &value) in self.cells.iter().enumerate() {
            if value > 0.0 && best.map_or(true, |(_, b)| value > b) {
                best = Some((idx, value));
            }
        }
        best.map(|(idx, _)| {
            let width = self.surface.width as usize;
            ((idx % width) as u32, (idx / width) as u32)
        })
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|&v| v == 0.0)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.surface.width as usize + x as usize
    }

    /// Add one kernel stamp centered at `(cx, cy)` in pixel space
    fn stamp(&mut self, cx: f32, cy: f32, radius: f32, weight: f32, kernel: FalloffKernel) {
        let max_x = self.surface.width as f32 - 1.0;
        let max_y = self.surface.height as f32 - 1.0;
        let x0 = (cx - radius).ceil().max(0.0);
        let x1 = (cx + radius).floor().min(max_x);
        let y0 = (cy - radius).ceil().max(0.0);
        let y1 = (cy + radius).floor().min(max_y);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let width = self.surface.width as usize;
        for y in y0 as u32..=y1 as u32 {
            let dy = y as f32 - cy;
            let row = y as usize * width;
            for x in x0 as u32..=x1 as u32 {
                let dx = x as f32 - cx;
                let t = (dx * dx + dy * dy).sqrt() / radius;
                let contribution = weight * kernel.falloff(t);
                if contribution > 0.0 {
                    self.cells[row + x as usize] += contribution;
                }
            }
        }
    }

    fn apply_noise_floor(&mut self, floor: f32) {
        for cell in &mut self.cells {
            if *cell < floor {
                *cell = 0.0;
            }
        }
    }
}

/// Accumulates normalized points into an intensity raster
#[derive(Debug, Clone, Default)]
pub struct DensityRasterizer {
    settings: RasterSettings,
}

impl DensityRasterizer {
    pub fn new(settings: RasterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RasterSettings {
        &self.settings
    }

    pub fn set_radius(&mut self, radius_px: u32) {
        self.settings.radius_px = radius_px;
    }

    /// Build a fresh raster for `surface`. Cell `(x, y)` samples the kernels
    /// at the integer coordinate `(x, y)`; a point maps to
    /// `(x_pct * width, y_pct * height)`.
    pub fn rasterize(&self, points: &[NormalizedPoint], surface: Surface) -> IntensityRaster {
        let mut raster = IntensityRaster::zeroed(surface);
        if surface.is_empty() || points.is_empty() || self.settings.radius_px == 0 {
            return raster;
        }

        let weight = self.settings.adaptive_weight(points.len());
        let radius = self.settings.radius_px as f32;
        let width = surface.width as f32;
        let height = surface.height as f32;

        for point in points {
            raster.stamp(
                point.x_pct * width,
                point.y_pct * height,
                radius,
                weight,
                self.settings.kernel,
            );
        }
        raster.apply_noise_floor(self.settings.noise_floor);

        tracing::debug!(
            points = points.len(),
            width = surface.width,
            height = surface.height,
            weight,
            "rasterized density"
        );
        raster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rasterizer(radius_px: u32) -> DensityRasterizer {
        DensityRasterizer::new(RasterSettings {
            radius_px,
            ..RasterSettings::default()
        })
    }

    #[test]
    fn test_no_points_is_blank() {
        let raster = rasterizer(10).rasterize(&[], Surface::new(64, 48));
        assert!(raster.is_blank());
        assert_eq!(raster.cells().len(), 64 * 48);
        assert_eq!(raster.max_intensity(), 1.0);
        assert_eq!(raster.peak(), None);
    }

    #[test]
    fn test_single_point_peak_equals_weight() {
        let r = rasterizer(10);
        let raster = r.rasterize(&[NormalizedPoint::new(0.5, 0.5)], Surface::new(100, 100));
        let weight = r.settings().adaptive_weight(1);

        assert_eq!(weight, DEFAULT_MAX_WEIGHT);
        assert_eq!(raster.peak(), Some((50, 50)));
        assert_eq!(raster.get(50, 50), Some(weight));
        assert_eq!(raster.max_intensity(), weight);
    }

    #[test]
    fn test_identical_points_accumulate() {
        let r = rasterizer(10);
        let points = vec![NormalizedPoint::new(0.5, 0.5); 2];
        let raster = r.rasterize(&points, Surface::new(100, 100));
        let weight = r.settings().adaptive_weight(2);

        assert_eq!(raster.peak(), Some((50, 50)));
        let peak = raster.get(50, 50).unwrap();
        assert!((peak - 2.0 * weight).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_reaches_zero_at_radius() {
        let raster = rasterizer(10).rasterize(&[NormalizedPoint::new(0.5, 0.5)], Surface::new(100, 100));
        assert_eq!(raster.get(60, 50), Some(0.0));
        assert_eq!(raster.get(50, 39), Some(0.0));
        assert!(raster.get(55, 50).unwrap() > 0.0);
    }

    #[test]
    fn test_noise_floor_clears_residue() {
        // Many points drive the weight to its floor; kernel tails fall below
        // the noise floor and must be exactly zero.
        let points = vec![NormalizedPoint::new(0.5, 0.5); 1000];
        let r = DensityRasterizer::new(RasterSettings {
            radius_px: 10,
            noise_floor: 0.5,
            ..RasterSettings::default()
        });
        let raster = r.rasterize(&points, Surface::new(100, 100));
        // 1000 * 0.04 * (1 - 9/10) = 4.0 survives; nothing below 0.5 remains
        assert!(raster.cells().iter().all(|&v| v == 0.0 || v >= 0.5));
        assert!(raster.get(59, 50).unwrap() > 0.0);
    }

    #[test]
    fn test_points_on_edges_are_clipped() {
        let points = vec![NormalizedPoint::new(0.0, 0.0), NormalizedPoint::new(1.0, 1.0)];
        let raster = rasterizer(5).rasterize(&points, Surface::new(20, 10));
        assert!(raster.get(0, 0).unwrap() > 0.0);
        assert!(raster.get(19, 9).unwrap() > 0.0);
        assert_eq!(raster.get(20, 0), None);
    }

    #[test]
    fn test_empty_surface() {
        let raster = rasterizer(10).rasterize(&[NormalizedPoint::new(0.5, 0.5)], Surface::new(0, 10));
        assert!(raster.cells().is_empty());
        assert_eq!(raster.peak(), None);
    }

    #[test]
    fn test_smooth_kernel() {
        assert_eq!(FalloffKernel::Smooth.falloff(0.0), 1.0);
        assert_eq!(FalloffKernel::Smooth.falloff(1.0), 0.0);
        assert!(FalloffKernel::Smooth.falloff(0.5) > FalloffKernel::Linear.falloff(0.5));
        assert_eq!(FalloffKernel::Linear.falloff(-0.1), 0.0);
    }

    #[test]
    fn test_adaptive_weight_bounds() {
        let settings = RasterSettings::default();
        assert_eq!(settings.adaptive_weight(1), DEFAULT_MAX_WEIGHT);
        assert_eq!(settings.adaptive_weight(200), 0.2);
        assert_eq!(settings.adaptive_weight(100_000), DEFAULT_MIN_WEIGHT);
    }

    proptest! {
        #[test]
        fn prop_adaptive_weight_non_increasing(n in 1usize..100_000) {
            let settings = RasterSettings::default();
            prop_assert!(settings.adaptive_weight(n + 1) <= settings.adaptive_weight(n));
        }

        #[test]
        fn prop_raster_is_non_negative(
            coords in prop::collection::vec((0.0f32..=1.0, 0.0f32..=1.0), 0..20),
            radius in 1u32..20,
        ) {
            let points: Vec<_> = coords.into_iter().map(|(x, y)| NormalizedPoint::new(x, y)).collect();
            let raster = rasterizer(radius).rasterize(&points, Surface::new(32, 24));
            prop_assert!(raster.cells().iter().all(|&v| v >= 0.0 && v.is_finite()));
        }
    }
}
