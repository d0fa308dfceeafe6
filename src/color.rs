//! Color ramp mapping
//!
//! Normalized intensity is mapped through a fixed list of color stops with
//! per-channel linear interpolation. Alpha gets a boost so that mid-range
//! density stays legible over the page, scaled by the user's intensity
//! control. Both factors are presentation settings.

use serde::{Deserialize, Serialize};

use crate::error::HeatmapError;
use crate::raster::IntensityRaster;
use crate::types::Surface;

/// Default alpha boost applied to normalized intensity
pub const DEFAULT_BOOST_FACTOR: f32 = 1.6;

/// Default global intensity control
pub const DEFAULT_INTENSITY: f32 = 0.8;

/// RGBA8 color
pub type Rgba = [u8; 4];

/// A single gradient stop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub position: f32,
    pub rgb: [u8; 3],
}

impl ColorStop {
    pub const fn new(position: f32, rgb: [u8; 3]) -> Self {
        Self { position, rgb }
    }
}

/// blue → cyan → green → yellow → orange → red
pub const CANONICAL_STOPS: [ColorStop; 6] = [
    ColorStop::new(0.0, [0, 0, 255]),
    ColorStop::new(0.2, [0, 180, 255]),
    ColorStop::new(0.4, [0, 230, 120]),
    ColorStop::new(0.6, [255, 240, 0]),
    ColorStop::new(0.8, [255, 140, 0]),
    ColorStop::new(1.0, [255, 0, 0]),
];

/// Validated, immutable list of color stops
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self {
            stops: CANONICAL_STOPS.to_vec(),
        }
    }
}

impl ColorRamp {
    /// Stops must start at 0, end at 1 and strictly increase in between
    pub fn new(stops: Vec<ColorStop>) -> Result<Self, HeatmapError> {
        if stops.len() < 2 {
            return Err(HeatmapError::InvalidConfig(
                "color ramp needs at least two stops".to_string(),
            ));
        }
        let first = stops[0].position;
        let last = stops[stops.len() - 1].position;
        if first != 0.0 || last != 1.0 {
            return Err(HeatmapError::InvalidConfig(format!(
                "color ramp must span [0, 1], got [{}, {}]",
                first, last
            )));
        }
        if stops.windows(2).any(|pair| pair[1].position <= pair[0].position) {
            return Err(HeatmapError::InvalidConfig(
                "color stop positions must strictly increase".to_string(),
            ));
        }
        Ok(Self { stops })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Interpolated color at `t` (clamped to `[0, 1]`)
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        // First stop whose position is >= t; the pair before it brackets t
        let upper = self
            .stops
            .iter()
            .position(|stop| stop.position >= t)
            .unwrap_or(self.stops.len() - 1)
            .max(1);
        let lo = self.stops[upper - 1];
        let hi = self.stops[upper];

        let f = (t - lo.position) / (hi.position - lo.position);
        let mut rgb = [0u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            let a = lo.rgb[channel] as f32;
            let b = hi.rgb[channel] as f32;
            *out = (a + (b - a) * f).round().clamp(0.0, 255.0) as u8;
        }
        rgb
    }

    /// Color plus boosted, intensity-scaled alpha for a normalized value
    pub fn map_intensity(&self, t: f32, boost: f32, intensity: f32) -> Rgba {
        let [r, g, b] = self.sample(t);
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let alpha = ((t * boost).min(1.0) * 255.0 * intensity.clamp(0.0, 1.0)).round();
        [r, g, b, alpha.clamp(0.0, 255.0) as u8]
    }
}

/// Presentation settings for the ramp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampSettings {
    pub stops: Vec<ColorStop>,
    pub boost_factor: f32,
    pub intensity: f32,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            stops: CANONICAL_STOPS.to_vec(),
            boost_factor: DEFAULT_BOOST_FACTOR,
            intensity: DEFAULT_INTENSITY,
        }
    }
}

/// RGBA8 pixels of a rendered heatmap, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapFrame {
    surface: Surface,
    pixels: Vec<u8>,
}

impl HeatmapFrame {
    /// Fully transparent frame
    pub fn transparent(surface: Surface) -> Self {
        Self {
            surface,
            pixels: vec![0; surface.cell_count() * 4],
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.surface.width || y >= self.surface.height {
            return None;
        }
        let idx = (y as usize * self.surface.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn is_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Map every raster cell through the ramp. Zero cells stay transparent.
pub fn colorize(raster: &IntensityRaster, ramp: &ColorRamp, boost: f32, intensity: f32) -> HeatmapFrame {
    let mut frame = HeatmapFrame::transparent(raster.surface());
    let max = raster.max_intensity();

    for (cell, px) in raster.cells().iter().zip(frame.pixels.chunks_exact_mut(4)) {
        if *cell <= 0.0 {
            continue;
        }
        px.copy_from_slice(&ramp.map_intensity(cell / max, boost, intensity));
    }
    frame
}
