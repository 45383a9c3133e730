//! Pipeline driver - wires together reading, filtering, simplification,
//! remapping, attribute projection, and output writing.
//!
//! Each dataset kind (fire perimeters, ecoregions) runs as one independent
//! linear pass: read (streaming) -> filter -> per-feature (simplify, remap if
//! configured, project) -> write. There is no shared state between passes; a
//! failure in one dataset never blocks the other.
//!
//! Output is written to a temporary sibling path and renamed into place, so a
//! downstream reader never observes a partially written collection.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use geojson::{FeatureCollection, JsonObject};
use rand::Rng;
use serde_json::Value as JsonValue;

use crate::filter::{FilterOptions, MetadataCollector};
use crate::project::{project_properties, DatasetKind};
use crate::reader::FeatureReader;
use crate::remap::{remap_geometry, RemapChain};
use crate::simplify::{count_vertices, simplify_geometry, SimplifyOptions, DEFAULT_PRECISION};
use crate::{Error, Result};

/// Log reading progress every this many features.
const PROGRESS_INTERVAL: usize = 1000;

/// Vertex-count thresholds driving the per-feature sample rate.
///
/// Large polygons tolerate aggressive thinning with acceptable visual loss at
/// map scale; small polygons are left intact since thinning them creates
/// visible distortion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleProfile {
    /// No vertex sampling, precision rounding only.
    Off,
    /// Rates used for the fire perimeter pass.
    Standard,
    /// Rates used for the coordinate-remap (ecoregion) pass.
    Aggressive,
}

impl SampleProfile {
    /// Pick a sample rate from a feature's total vertex count.
    pub fn rate_for(&self, vertex_count: usize) -> f64 {
        match self {
            SampleProfile::Off => 1.0,
            SampleProfile::Standard => match vertex_count {
                n if n > 1000 => 0.1,
                n if n > 500 => 0.2,
                n if n > 200 => 0.5,
                _ => 1.0,
            },
            SampleProfile::Aggressive => match vertex_count {
                n if n > 1000 => 0.05,
                n if n > 500 => 0.1,
                n if n > 200 => 0.2,
                _ => 1.0,
            },
        }
    }
}

/// Configuration for one dataset pass.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Coordinate precision in fractional digits.
    pub precision: u8,
    /// Vertex sampling profile.
    pub profile: SampleProfile,
    /// Coordinate remap chain, if this dataset needs one.
    pub remap: Option<RemapChain>,
    /// Inclusion predicates applied before the transforms.
    pub filter: FilterOptions,
    /// Whether to emit the `metadata` block (distinct years/counties or
    /// ecoregion names over the unfiltered input).
    pub with_metadata: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            profile: SampleProfile::Standard,
            remap: None,
            filter: FilterOptions::default(),
            with_metadata: true,
        }
    }
}

impl PipelineConfig {
    /// Defaults for the fire perimeter pass: standard thinning, no remap.
    pub fn fire() -> Self {
        Self::default()
    }

    /// Defaults for the ecoregion pass: aggressive thinning plus the
    /// calibrated planar-to-WGS84 remap.
    pub fn ecoregion() -> Self {
        Self {
            profile: SampleProfile::Aggressive,
            remap: Some(RemapChain::california_forward()),
            ..Self::default()
        }
    }

    /// Set the inclusion predicates.
    pub fn with_filter(mut self, filter: FilterOptions) -> Self {
        self.filter = filter;
        self
    }

    /// Set or clear the remap chain.
    pub fn with_remap(mut self, remap: Option<RemapChain>) -> Self {
        self.remap = remap;
        self
    }

    /// Set the sampling profile.
    pub fn with_profile(mut self, profile: SampleProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the coordinate precision.
    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Enable or disable the `metadata` block (the filter-only variant of the
    /// pipeline omits it).
    pub fn with_metadata(mut self, with_metadata: bool) -> Self {
        self.with_metadata = with_metadata;
        self
    }
}

/// Counters reported after one dataset pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetStats {
    /// Features successfully parsed from the input.
    pub features_read: usize,
    /// Malformed feature spans skipped by the reader.
    pub features_skipped: usize,
    /// Features written after filtering.
    pub features_written: usize,
    /// Input file size in bytes.
    pub bytes_in: u64,
    /// Output file size in bytes.
    pub bytes_out: u64,
}

/// Run one full dataset pass with a thread-local RNG.
pub fn process_dataset(
    input: &Path,
    output: &Path,
    kind: DatasetKind,
    config: &PipelineConfig,
) -> Result<DatasetStats> {
    process_dataset_with_rng(input, output, kind, config, &mut rand::thread_rng())
}

/// Run one full dataset pass with a caller-supplied RNG (tests seed this).
pub fn process_dataset_with_rng(
    input: &Path,
    output: &Path,
    kind: DatasetKind,
    config: &PipelineConfig,
    rng: &mut impl Rng,
) -> Result<DatasetStats> {
    let bytes_in = fs::metadata(input)
        .map_err(|e| Error::Read(format!("Failed to stat {}: {}", input.display(), e)))?
        .len();

    log::info!(
        "Processing {} dataset: {} ({:.2} MB)",
        kind.name(),
        input.display(),
        mb(bytes_in)
    );

    // Stream features; the metadata side channel sees the unfiltered input.
    let mut reader = FeatureReader::from_path(input)?;
    let mut collector = MetadataCollector::new();
    let mut features = Vec::new();
    for feature in &mut reader {
        collector.observe(&feature, kind);
        features.push(feature);
        if features.len() % PROGRESS_INTERVAL == 0 {
            log::debug!("Read {} features...", features.len());
        }
    }
    let features_read = features.len();
    let features_skipped = reader.skipped();

    let features = config.filter.apply(features);
    log::info!(
        "{} features read ({} malformed skipped), {} after filtering",
        features_read,
        features_skipped,
        features.len()
    );

    let mut projected = Vec::with_capacity(features.len());
    for mut feature in features {
        if let Some(geometry) = feature.geometry.as_mut() {
            let rate = config.profile.rate_for(count_vertices(&geometry.value));
            let options = SimplifyOptions {
                precision: config.precision,
                sample_rate: rate,
            };
            simplify_geometry(geometry, &options, rng);
            if let Some(chain) = &config.remap {
                remap_geometry(geometry, chain);
            }
        }
        project_properties(&mut feature, kind);
        projected.push(feature);
    }

    let foreign_members = config.with_metadata.then(|| {
        let mut members = JsonObject::new();
        members.insert(
            "metadata".into(),
            JsonValue::Object(collector.into_metadata(kind)),
        );
        members
    });

    let features_written = projected.len();
    let collection = FeatureCollection {
        bbox: None,
        features: projected,
        foreign_members,
    };

    write_collection(&collection, output)?;
    let bytes_out = fs::metadata(output)
        .map_err(|e| Error::Write(format!("Failed to stat {}: {}", output.display(), e)))?
        .len();

    log::info!(
        "Wrote {} features to {} ({:.2} MB -> {:.2} MB)",
        features_written,
        output.display(),
        mb(bytes_in),
        mb(bytes_out)
    );

    Ok(DatasetStats {
        features_read,
        features_skipped,
        features_written,
        bytes_in,
        bytes_out,
    })
}

/// Serialize the collection to a temporary sibling path, then rename.
fn write_collection(collection: &FeatureCollection, output: &Path) -> Result<()> {
    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let file = File::create(tmp)
        .map_err(|e| Error::Write(format!("Failed to create {}: {}", tmp.display(), e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, collection)
        .map_err(|e| Error::Write(format!("Failed to serialize {}: {}", tmp.display(), e)))?;
    writer
        .flush()
        .map_err(|e| Error::Write(format!("Failed to flush {}: {}", tmp.display(), e)))?;

    fs::rename(tmp, output).map_err(|e| {
        Error::Write(format!(
            "Failed to move {} into place: {}",
            output.display(),
            e
        ))
    })
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::CALIFORNIA_BOUNDS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("geoslim-{}-{}", std::process::id(), name))
    }

    fn write_input(name: &str, doc: &str) -> PathBuf {
        let path = temp_path(name);
        fs::write(&path, doc).unwrap();
        path
    }

    fn fire_doc() -> String {
        let feature = |id: i32, year: i32, unit: &str| {
            format!(
                r#"{{"type": "Feature", "properties": {{"OBJECTID": {id}, "YEAR_": {year}, "UNIT_ID": "{unit}", "FIRE_NAME": "F{id}", "SHAPE_Length": 1.0}}, "geometry": {{"type": "Polygon", "coordinates": [[[1.1234567, 2.1234567], [3.0, 4.0], [5.0, 6.0], [1.1234567, 2.1234567]]]}}}}"#
            )
        };
        format!(
            r#"{{"type": "FeatureCollection", "features": [{}, {}, {}]}}"#,
            feature(1, 2001, "A"),
            feature(2, 2003, "B"),
            feature(3, 2005, "A")
        )
    }

    fn read_output(path: &Path) -> serde_json::Value {
        let content = fs::read_to_string(path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    // ========== SampleProfile Tests ==========

    #[test]
    fn test_standard_profile_rates() {
        let p = SampleProfile::Standard;
        assert_eq!(p.rate_for(2000), 0.1);
        assert_eq!(p.rate_for(800), 0.2);
        assert_eq!(p.rate_for(300), 0.5);
        assert_eq!(p.rate_for(200), 1.0);
        assert_eq!(p.rate_for(5), 1.0);
    }

    #[test]
    fn test_aggressive_profile_rates() {
        let p = SampleProfile::Aggressive;
        assert_eq!(p.rate_for(2000), 0.05);
        assert_eq!(p.rate_for(800), 0.1);
        assert_eq!(p.rate_for(300), 0.2);
        assert_eq!(p.rate_for(150), 1.0);
    }

    #[test]
    fn test_off_profile_never_samples() {
        assert_eq!(SampleProfile::Off.rate_for(1_000_000), 1.0);
    }

    // ========== Config Tests ==========

    #[test]
    fn test_fire_config_defaults() {
        let config = PipelineConfig::fire();
        assert_eq!(config.precision, 5);
        assert_eq!(config.profile, SampleProfile::Standard);
        assert!(config.remap.is_none());
        assert!(config.with_metadata);
    }

    #[test]
    fn test_ecoregion_config_defaults() {
        let config = PipelineConfig::ecoregion();
        assert_eq!(config.profile, SampleProfile::Aggressive);
        assert!(config.remap.is_some());
    }

    // ========== Full Pass Tests ==========

    #[test]
    fn test_fire_pass_end_to_end() {
        let input = write_input("fire-in.geojson", &fire_doc());
        let output = temp_path("fire-out.geojson");

        let config = PipelineConfig::fire()
            .with_filter(FilterOptions::default().with_years([2003, 2005]));
        let stats =
            process_dataset_with_rng(&input, &output, DatasetKind::Fire, &config, &mut rng())
                .unwrap();

        assert_eq!(stats.features_read, 3);
        assert_eq!(stats.features_skipped, 0);
        assert_eq!(stats.features_written, 2);
        assert!(stats.bytes_in > 0 && stats.bytes_out > 0);

        let doc = read_output(&output);
        assert_eq!(doc["type"], "FeatureCollection");

        // Filtered output keeps original relative order.
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["YEAR_"], 2003);
        assert_eq!(features[1]["properties"]["YEAR_"], 2005);

        // Projection: exactly the essential keys, dropped source keys gone.
        let props = features[0]["properties"].as_object().unwrap();
        assert_eq!(props.len(), crate::project::FIRE_FIELDS.len());
        assert!(!props.contains_key("SHAPE_Length"));
        assert_eq!(props["ALARM_DATE"], serde_json::Value::Null);

        // Metadata is computed over the unfiltered input.
        assert_eq!(doc["metadata"]["years"], serde_json::json!([2001, 2003, 2005]));
        assert_eq!(doc["metadata"]["counties"], serde_json::json!(["A", "B"]));

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_filter_only_variant_has_no_metadata() {
        let input = write_input("nometa-in.geojson", &fire_doc());
        let output = temp_path("nometa-out.geojson");

        let config = PipelineConfig::fire().with_metadata(false);
        process_dataset_with_rng(&input, &output, DatasetKind::Fire, &config, &mut rng())
            .unwrap();

        let doc = read_output(&output);
        assert!(doc.get("metadata").is_none());

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_ecoregion_pass_remaps_into_bounds() {
        let doc = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"OBJECTID": 1, "ECOREGION_SECTION": "Sierra Nevada"},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[
                [1500000.0, 1200000.0], [1600000.0, 1250000.0], [1550000.0, 1300000.0], [1500000.0, 1200000.0]
             ]]]}}
        ]}"#;
        let input = write_input("eco-in.geojson", doc);
        let output = temp_path("eco-out.geojson");

        let config = PipelineConfig::ecoregion();
        let stats =
            process_dataset_with_rng(&input, &output, DatasetKind::Ecoregion, &config, &mut rng())
                .unwrap();
        assert_eq!(stats.features_written, 1);

        let out = read_output(&output);
        let rings = out["features"][0]["geometry"]["coordinates"][0][0]
            .as_array()
            .unwrap();
        for pos in rings {
            let lon = pos[0].as_f64().unwrap();
            let lat = pos[1].as_f64().unwrap();
            assert!(CALIFORNIA_BOUNDS.contains(lon, lat), "({lon}, {lat}) outside clamp");
        }
        assert_eq!(rings.first(), rings.last(), "ring closure survives the pass");

        assert_eq!(out["metadata"]["ecoregions"], serde_json::json!(["Sierra Nevada"]));

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_large_ring_is_thinned() {
        let ring: Vec<String> = (0..1500)
            .map(|i| format!("[{}.1234567, {}.7654321]", i % 90, i % 45))
            .chain(std::iter::once("[0.1234567, 0.7654321]".to_string()))
            .collect();
        let doc = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{"OBJECTID": 1}},
                 "geometry": {{"type": "Polygon", "coordinates": [[{}]]}}}}
            ]}}"#,
            ring.join(", ")
        );
        let input = write_input("thin-in.geojson", &doc);
        let output = temp_path("thin-out.geojson");

        process_dataset_with_rng(
            &input,
            &output,
            DatasetKind::Fire,
            &PipelineConfig::fire(),
            &mut rng(),
        )
        .unwrap();

        let out = read_output(&output);
        let out_ring = out["features"][0]["geometry"]["coordinates"][0]
            .as_array()
            .unwrap();
        assert!(out_ring.len() >= 10 && out_ring.len() < 1501);
        assert_eq!(out_ring.first(), out_ring.last());

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_malformed_feature_does_not_abort_pass() {
        let doc = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"OBJECTID": 1, "YEAR_": 2001}, "geometry": null},
            {"type": "Feature", "properties": {"OBJECTID": }, "geometry": null}
        ]}"#;
        let input = write_input("bad-in.geojson", doc);
        let output = temp_path("bad-out.geojson");

        let stats = process_dataset_with_rng(
            &input,
            &output,
            DatasetKind::Fire,
            &PipelineConfig::fire(),
            &mut rng(),
        )
        .unwrap();

        assert_eq!(stats.features_read, 1);
        assert_eq!(stats.features_skipped, 1);
        assert_eq!(stats.features_written, 1);

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let result = process_dataset(
            Path::new("/nonexistent/fires.geojson"),
            &temp_path("never-written.geojson"),
            DatasetKind::Fire,
            &PipelineConfig::fire(),
        );
        assert!(matches!(result, Err(Error::Read(_))));
        assert!(!temp_path("never-written.geojson").exists());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let input = write_input("tmp-in.geojson", &fire_doc());
        let output = temp_path("tmp-out.geojson");

        process_dataset_with_rng(
            &input,
            &output,
            DatasetKind::Fire,
            &PipelineConfig::fire(),
            &mut rng(),
        )
        .unwrap();

        assert!(output.exists());
        let mut tmp = output.as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!Path::new(&tmp).exists());

        fs::remove_file(&input).unwrap();
        fs::remove_file(&output).unwrap();
    }
}
