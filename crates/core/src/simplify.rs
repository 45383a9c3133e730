//! Geometry simplification: coordinate precision reduction and vertex sampling.
//!
//! Two independent reductions, both applied in place:
//!
//! - **Precision**: every coordinate is rounded to a fixed number of fractional
//!   digits (default 5, roughly 1 m at the equator). Coordinate text dominates
//!   GeoJSON file size, so this alone shrinks output substantially.
//! - **Vertex sampling**: rings and lines longer than [`MIN_RING_POINTS`]
//!   keep their first and last vertices and a uniform random subset of the
//!   interior. Polygon rings are re-closed by copying the first vertex to the
//!   last position, so the closed-ring invariant holds at any sample rate.
//!
//! Sampling is random rather than distance-based (contrast Douglas-Peucker):
//! at map scale the visual difference is acceptable and the cost is O(kept)
//! with no recursion over huge rings.
//!
//! Rings/lines at or below 10 vertices are never shortened - thinning them
//! produces visible distortion while saving almost nothing.

use geojson::{Geometry, Position, Value};
use rand::Rng;

/// Default number of fractional digits retained per coordinate.
pub const DEFAULT_PRECISION: u8 = 5;

/// Rings/lines at or below this vertex count are never shortened.
pub const MIN_RING_POINTS: usize = 10;

/// Configuration for geometry simplification.
#[derive(Debug, Clone, Copy)]
pub struct SimplifyOptions {
    /// Fractional digits retained per coordinate.
    pub precision: u8,
    /// Fraction of vertices retained per ring/line, in (0, 1]. 1.0 disables
    /// sampling entirely.
    pub sample_rate: f64,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            sample_rate: 1.0,
        }
    }
}

impl SimplifyOptions {
    /// Set the coordinate precision.
    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Set the vertex sample rate.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }
}

/// Round a single value to `precision` fractional digits.
#[inline]
fn round_to(v: f64, precision: u8) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (v * factor).round() / factor
}

fn round_position(pos: &mut Position, precision: u8) {
    for v in pos.iter_mut() {
        *v = round_to(*v, precision);
    }
}

fn round_line(line: &mut [Position], precision: u8) {
    for pos in line.iter_mut() {
        round_position(pos, precision);
    }
}

/// Thin one ring/line in place, keeping first and last vertices.
///
/// `close` marks polygon rings: the retained last vertex is forced to equal
/// the first one, regardless of what the original last vertex was.
fn sample_line(line: &mut Vec<Position>, rate: f64, close: bool, rng: &mut impl Rng) {
    if rate >= 1.0 || line.len() <= MIN_RING_POINTS {
        return;
    }

    let sample_size = MIN_RING_POINTS.max((line.len() as f64 * rate).round() as usize);
    if sample_size >= line.len() {
        return;
    }

    // Draw interior indices uniformly without replacement from 1..len-1.
    let interior = line.len() - 2;
    let mut indices: Vec<usize> = rand::seq::index::sample(rng, interior, sample_size - 2)
        .into_iter()
        .map(|i| i + 1)
        .collect();
    indices.sort_unstable();

    let first = line[0].clone();
    let last = if close {
        first.clone()
    } else {
        line[line.len() - 1].clone()
    };

    let mut sampled = Vec::with_capacity(sample_size);
    sampled.push(first);
    for i in indices {
        sampled.push(line[i].clone());
    }
    sampled.push(last);

    *line = sampled;
}

/// Simplify a geometry in place.
///
/// Each feature is processed exactly once per pipeline run, so in-place
/// mutation is safe and avoids reallocating the coordinate tree.
pub fn simplify_geometry(geometry: &mut Geometry, options: &SimplifyOptions, rng: &mut impl Rng) {
    simplify_value(&mut geometry.value, options, rng);
}

/// Simplify a raw geometry value in place. See [`simplify_geometry`].
pub fn simplify_value(value: &mut Value, options: &SimplifyOptions, rng: &mut impl Rng) {
    let rate = options.sample_rate;
    let precision = options.precision;

    match value {
        Value::Point(pos) => round_position(pos, precision),

        Value::MultiPoint(coords) | Value::LineString(coords) => {
            sample_line(coords, rate, false, rng);
            round_line(coords, precision);
        }

        Value::Polygon(rings) => {
            for ring in rings.iter_mut() {
                sample_line(ring, rate, true, rng);
                round_line(ring, precision);
            }
        }

        Value::MultiLineString(lines) => {
            for line in lines.iter_mut() {
                sample_line(line, rate, false, rng);
                round_line(line, precision);
            }
        }

        Value::MultiPolygon(polygons) => {
            for polygon in polygons.iter_mut() {
                for ring in polygon.iter_mut() {
                    sample_line(ring, rate, true, rng);
                    round_line(ring, precision);
                }
            }
        }

        // Anything else passes through unchanged.
        Value::GeometryCollection(_) => {}
    }
}

/// Total vertex count of a geometry value, used by the pipeline driver to
/// pick a sample rate per feature.
pub fn count_vertices(value: &Value) -> usize {
    match value {
        Value::Point(_) => 1,
        Value::MultiPoint(coords) | Value::LineString(coords) => coords.len(),
        Value::Polygon(rings) | Value::MultiLineString(rings) => {
            rings.iter().map(|r| r.len()).sum()
        }
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .map(|p| p.iter().map(|r| r.len()).sum::<usize>())
            .sum(),
        Value::GeometryCollection(geoms) => {
            geoms.iter().map(|g| count_vertices(&g.value)).sum()
        }
    }
}
