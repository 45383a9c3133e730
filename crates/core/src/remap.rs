//! Best-effort linear coordinate remapping with output clamping.
//!
//! The ecoregion source data arrived in a planar coordinate system that the
//! map client cannot render. A rigorous geodetic transform is out of scope;
//! instead each axis gets an independent linear scale-and-offset remap, and
//! the result is clamped to the target region's bounding box so a bad input
//! can never leave the map.
//!
//! Historically this took two rounds of empirical calibration against a
//! known-good rendering: a forward pass from raw planar coordinates, and a
//! later corrective pass applied on top of a previous run's output. Both are
//! expressed here as composable [`LinearPass`]es in a [`RemapChain`]; the
//! specific constants are calibration data for the California datasets, not
//! algorithmic content.

use geojson::{Geometry, Position, Value};

/// One axis of a linear remap: `apply(v) = v * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMap {
    pub scale: f64,
    pub offset: f64,
}

impl AxisMap {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Express the calibration form `base + (v + shift) / denom` as an
    /// [`AxisMap`].
    pub fn anchored(base: f64, shift: f64, denom: f64) -> Self {
        Self {
            scale: 1.0 / denom,
            offset: base + shift / denom,
        }
    }

    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        v * self.scale + self.offset
    }
}

/// A single remap pass: independent x (longitude) and y (latitude) axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPass {
    pub x: AxisMap,
    pub y: AxisMap,
}

impl LinearPass {
    pub fn new(x: AxisMap, y: AxisMap) -> Self {
        Self { x, y }
    }
}

/// Geographic bounds the remapped output is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl Bounds {
    pub fn new(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Self {
        Self {
            lon_min,
            lat_min,
            lon_max,
            lat_max,
        }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }
}

/// California bounding box used to clamp remapped ecoregion coordinates.
pub const CALIFORNIA_BOUNDS: Bounds = Bounds {
    lon_min: -124.409591,
    lat_min: 32.534156,
    lon_max: -114.131211,
    lat_max: 42.009518,
};

/// Zero or more linear passes applied in order, followed by a clamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapChain {
    passes: Vec<LinearPass>,
    bounds: Bounds,
}

impl RemapChain {
    /// An empty chain: no linear passes, clamp only.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            passes: Vec::new(),
            bounds,
        }
    }

    /// Append a pass to the chain.
    pub fn with_pass(mut self, pass: LinearPass) -> Self {
        self.passes.push(pass);
        self
    }

    /// Forward transform from the raw planar source system into approximate
    /// WGS84 for the California ecoregion dataset.
    ///
    /// Calibration: `lon = -124.4096 + (x + 151189) / 300000`,
    /// `lat = 32.5343 + (y + 12434) / 250000`.
    pub fn california_forward() -> Self {
        Self::new(CALIFORNIA_BOUNDS).with_pass(LinearPass::new(
            AxisMap::anchored(-124.4096, 151_189.0, 300_000.0),
            AxisMap::anchored(32.5343, 12_434.0, 250_000.0),
        ))
    }

    /// Corrective pass applied to the output of an earlier mis-scaled run:
    /// `lon' = lon * 0.85 - 18.0`, `lat' = lat * 0.85 + 5.0`.
    pub fn california_corrective() -> Self {
        Self::new(CALIFORNIA_BOUNDS).with_pass(LinearPass::new(
            AxisMap::new(0.85, -18.0),
            AxisMap::new(0.85, 5.0),
        ))
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Remap one coordinate pair through every pass, then clamp each axis
    /// independently to the chain's bounds.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let (mut lon, mut lat) = (x, y);
        for pass in &self.passes {
            lon = pass.x.apply(lon);
            lat = pass.y.apply(lat);
        }
        (
            lon.clamp(self.bounds.lon_min, self.bounds.lon_max),
            lat.clamp(self.bounds.lat_min, self.bounds.lat_max),
        )
    }
}

fn remap_position(pos: &mut Position, chain: &RemapChain) {
    if pos.len() < 2 {
        return;
    }
    let (lon, lat) = chain.apply(pos[0], pos[1]);
    pos[0] = lon;
    pos[1] = lat;
}

fn remap_line(line: &mut [Position], chain: &RemapChain) {
    for pos in line.iter_mut() {
        remap_position(pos, chain);
    }
}

/// Remap every coordinate of a geometry in place.
pub fn remap_geometry(geometry: &mut Geometry, chain: &RemapChain) {
    remap_value(&mut geometry.value, chain);
}

/// Remap every coordinate of a raw geometry value in place.
pub fn remap_value(value: &mut Value, chain: &RemapChain) {
    match value {
        Value::Point(pos) => remap_position(pos, chain),
        Value::MultiPoint(coords) | Value::LineString(coords) => remap_line(coords, chain),
        Value::Polygon(rings) | Value::MultiLineString(rings) => {
            for ring in rings.iter_mut() {
                remap_line(ring, chain);
            }
        }
        Value::MultiPolygon(polygons) => {
            for polygon in polygons.iter_mut() {
                for ring in polygon.iter_mut() {
                    remap_line(ring, chain);
                }
            }
        }
        Value::GeometryCollection(geoms) => {
            for geom in geoms.iter_mut() {
                remap_value(&mut geom.value, chain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== AxisMap Tests ==========

    #[test]
    fn test_axis_map_apply() {
        let axis = AxisMap::new(0.85, -18.0);
        assert!((axis.apply(-120.0) - (-120.0 * 0.85 - 18.0)).abs() < 1e-12);
    }

    #[test]
    fn test_anchored_matches_calibration_form() {
        // base + (v + shift) / denom must equal v * scale + offset.
        let axis = AxisMap::anchored(-124.4096, 151_189.0, 300_000.0);
        for x in [-151_189.0, 0.0, 12_345.0, 2_000_000.0] {
            let expected = -124.4096 + (x + 151_189.0) / 300_000.0;
            assert!((axis.apply(x) - expected).abs() < 1e-9, "x = {x}");
        }
    }

    // ========== RemapChain Tests ==========

    #[test]
    fn test_forward_pass_maps_origin_into_california() {
        let chain = RemapChain::california_forward();
        // The planar origin should land at the calibration anchor. The anchor
        // longitude sits a hair below the clamp floor, so clamping wins there.
        let (lon, lat) = chain.apply(-151_189.0, -12_434.0);
        assert!((lon - CALIFORNIA_BOUNDS.lon_min).abs() < 1e-9);
        assert!((lat - 32.5343).abs() < 1e-9);
    }

    #[test]
    fn test_corrective_pass_constants() {
        let chain = RemapChain::california_corrective();
        let (lon, lat) = chain.apply(-120.0, 35.0);
        assert!((lon - (-120.0 * 0.85 - 18.0)).abs() < 1e-9);
        assert!((lat - (35.0 * 0.85 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_invariant_for_arbitrary_input() {
        let chain = RemapChain::california_forward();
        let inputs = [
            (0.0, 0.0),
            (1e9, -1e9),
            (-1e9, 1e9),
            (f64::MAX, f64::MIN),
            (123.456, 789.012),
        ];
        for (x, y) in inputs {
            let (lon, lat) = chain.apply(x, y);
            assert!(
                chain.bounds().contains(lon, lat),
                "({x}, {y}) escaped the clamp box: ({lon}, {lat})"
            );
        }
    }

    #[test]
    fn test_two_pass_composition() {
        // Forward then corrective, as the historical two-round calibration ran.
        let chain = RemapChain::new(CALIFORNIA_BOUNDS)
            .with_pass(LinearPass::new(
                AxisMap::anchored(-124.4096, 151_189.0, 300_000.0),
                AxisMap::anchored(32.5343, 12_434.0, 250_000.0),
            ))
            .with_pass(LinearPass::new(
                AxisMap::new(0.85, -18.0),
                AxisMap::new(0.85, 5.0),
            ));

        let forward = RemapChain::california_forward();
        let (x, y): (f64, f64) = (1_500_000.0, 1_000_000.0);
        // Compose manually: forward without clamp, then corrective.
        let mid_lon = -124.4096 + (x + 151_189.0) / 300_000.0;
        let mid_lat = 32.5343 + (y + 12_434.0) / 250_000.0;
        let expected_lon = (mid_lon * 0.85 - 18.0).clamp(-124.409591, -114.131211);
        let expected_lat = (mid_lat * 0.85 + 5.0).clamp(32.534156, 42.009518);

        let (lon, lat) = chain.apply(x, y);
        assert!((lon - expected_lon).abs() < 1e-9);
        assert!((lat - expected_lat).abs() < 1e-9);

        // Single-pass chain must differ from the composition in general.
        let (f_lon, _) = forward.apply(x, y);
        assert!((f_lon - lon).abs() > 1e-9);
    }

    #[test]
    fn test_empty_chain_only_clamps() {
        let chain = RemapChain::new(CALIFORNIA_BOUNDS);
        let (lon, lat) = chain.apply(-118.25, 34.05);
        assert_eq!((lon, lat), (-118.25, 34.05));

        let (lon, lat) = chain.apply(-300.0, 90.0);
        assert_eq!((lon, lat), (CALIFORNIA_BOUNDS.lon_min, CALIFORNIA_BOUNDS.lat_max));
    }

    // ========== Geometry Walking Tests ==========

    #[test]
    fn test_remap_multipolygon_in_place() {
        let mut value = Value::MultiPolygon(vec![vec![vec![
            vec![1_500_000.0, 1_200_000.0],
            vec![1_600_000.0, 1_250_000.0],
            vec![1_500_000.0, 1_200_000.0],
        ]]]);
        let chain = RemapChain::california_forward();
        remap_value(&mut value, &chain);

        if let Value::MultiPolygon(polygons) = &value {
            for pos in polygons.iter().flatten().flatten() {
                assert!(chain.bounds().contains(pos[0], pos[1]));
            }
        } else {
            panic!("Expected MultiPolygon");
        }
    }

    #[test]
    fn test_remap_preserves_ring_closure() {
        let ring = vec![
            vec![100.0, 200.0],
            vec![300.0, 400.0],
            vec![500.0, 600.0],
            vec![100.0, 200.0],
        ];
        let mut value = Value::Polygon(vec![ring]);
        remap_value(&mut value, &RemapChain::california_forward());

        if let Value::Polygon(rings) = value {
            assert_eq!(rings[0].first(), rings[0].last());
        } else {
            panic!("Expected Polygon");
        }
    }
}
