//! Attribute projection down to the declared essential field set.
//!
//! Source datasets carry dozens of properties per feature; the map client
//! reads a handful. Each dataset kind declares an ordered essential field
//! list, and projection rebuilds the property map to contain exactly those
//! keys - values copied from the source where present, `null` where absent.

use geojson::{Feature, JsonObject};
use serde_json::Value as JsonValue;

/// Which derivative dataset a pipeline pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Fire perimeter polygons.
    Fire,
    /// USDA ecoregion section polygons.
    Ecoregion,
}

/// Essential fire perimeter fields.
pub const FIRE_FIELDS: &[&str] = &[
    "OBJECTID",
    "YEAR_",
    "FIRE_NAME",
    "ALARM_DATE",
    "CONT_DATE",
    "UNIT_ID",
    "CAUSE",
    "ACRES",
];

/// Essential ecoregion fields.
pub const ECOREGION_FIELDS: &[&str] = &["OBJECTID", "ECOREGION_SECTION", "Ecoregion_Acres"];

impl DatasetKind {
    /// The declared essential field list for this dataset kind.
    pub fn essential_fields(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Fire => FIRE_FIELDS,
            DatasetKind::Ecoregion => ECOREGION_FIELDS,
        }
    }

    /// Human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Fire => "fire",
            DatasetKind::Ecoregion => "ecoregion",
        }
    }
}

/// Replace a feature's properties with exactly the essential field set.
///
/// Missing source values become `null`; extraneous source keys are dropped.
pub fn project_properties(feature: &mut Feature, kind: DatasetKind) {
    let source = feature.properties.take().unwrap_or_default();
    let mut projected = JsonObject::new();

    for &field in kind.essential_fields() {
        let value = source.get(field).cloned().unwrap_or(JsonValue::Null);
        projected.insert(field.to_string(), value);
    }

    feature.properties = Some(projected);
}
