//! Feature filtering by year and administrative unit, plus the metadata
//! side channel.
//!
//! Predicates are opt-in: an unset (or empty) year/unit set means "include
//! everything on that dimension". Filtering preserves input order and can cap
//! the total output count.
//!
//! Year extraction is deliberately forgiving - source data mixes a numeric
//! `YEAR_` field (sometimes serialized as a string) with `ALARM_DATE` strings
//! in several date formats. A feature whose year cannot be determined is
//! excluded from year statistics but still passes filtering unless an active
//! year predicate demands a match.

use std::collections::{BTreeSet, HashSet};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use geojson::{Feature, JsonObject};
use serde_json::Value as JsonValue;

use crate::project::DatasetKind;

/// Date formats tried in order when extracting a year from a date string.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Inclusion predicates applied before the geometry transforms.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Acceptable years; `None` or empty means all years.
    pub years: Option<HashSet<i32>>,
    /// Acceptable administrative unit ids; `None` or empty means all units.
    pub units: Option<HashSet<String>>,
    /// Cap on the number of output features.
    pub max_features: Option<usize>,
}

impl FilterOptions {
    /// Restrict to the given years.
    pub fn with_years<I: IntoIterator<Item = i32>>(mut self, years: I) -> Self {
        self.years = Some(years.into_iter().collect());
        self
    }

    /// Restrict to the given administrative unit ids.
    pub fn with_units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.units = Some(units.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Cap the output feature count.
    pub fn with_max_features(mut self, max: usize) -> Self {
        self.max_features = Some(max);
        self
    }

    /// Whether any predicate or cap is set.
    pub fn is_active(&self) -> bool {
        active(&self.years).is_some() || active(&self.units).is_some() || self.max_features.is_some()
    }

    /// Whether a single feature passes all active predicates.
    pub fn matches(&self, feature: &Feature) -> bool {
        if let Some(years) = active(&self.years) {
            match feature_year(feature) {
                Some(year) if years.contains(&year) => {}
                _ => return false,
            }
        }
        if let Some(units) = active(&self.units) {
            match unit_id(feature) {
                Some(unit) if units.contains(&unit) => {}
                _ => return false,
            }
        }
        true
    }

    /// Filter a feature sequence, preserving order and applying the cap.
    pub fn apply(&self, features: Vec<Feature>) -> Vec<Feature> {
        let iter = features.into_iter().filter(|f| self.matches(f));
        match self.max_features {
            Some(max) => iter.take(max).collect(),
            None => iter.collect(),
        }
    }
}

fn active<T>(set: &Option<HashSet<T>>) -> Option<&HashSet<T>> {
    set.as_ref().filter(|s| !s.is_empty())
}

/// Determine the year of a feature.
///
/// Falls back from the numeric `YEAR_` property (number or numeric string)
/// to parsing `ALARM_DATE` via [`year_from_date`].
pub fn feature_year(feature: &Feature) -> Option<i32> {
    if let Some(year) = feature.property("YEAR_").and_then(numeric_year) {
        return Some(year);
    }
    feature
        .property("ALARM_DATE")
        .and_then(JsonValue::as_str)
        .and_then(year_from_date)
}

fn numeric_year(value: &JsonValue) -> Option<i32> {
    match value {
        JsonValue::Number(n) => n.as_i64().map(|y| y as i32),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract a year from a date-like string.
///
/// Tries ISO-with-time-and-Z first, then the plain formats in
/// [`DATE_FORMATS`], then falls back to the first 4-digit run anywhere in the
/// string.
pub fn year_from_date(s: &str) -> Option<i32> {
    if s.is_empty() {
        return None;
    }

    if s.contains('T') && s.ends_with('Z') {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ") {
            return Some(dt.year());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date.year());
        }
    }

    four_digit_run(s)
}

fn four_digit_run(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 4 {
                return s[start..start + 4].parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

fn unit_id(feature: &Feature) -> Option<String> {
    feature
        .property("UNIT_ID")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn ecoregion_name(feature: &Feature) -> Option<String> {
    feature
        .property("ECOREGION_SECTION")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Accumulates the distinct-value sets over the *unfiltered* input, for the
/// output collection's `metadata` block (map client dropdown options).
#[derive(Debug, Default)]
pub struct MetadataCollector {
    years: BTreeSet<i32>,
    units: BTreeSet<String>,
    ecoregions: BTreeSet<String>,
}

impl MetadataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one feature's categorical values.
    pub fn observe(&mut self, feature: &Feature, kind: DatasetKind) {
        match kind {
            DatasetKind::Fire => {
                if let Some(year) = feature_year(feature) {
                    self.years.insert(year);
                }
                if let Some(unit) = unit_id(feature) {
                    self.units.insert(unit);
                }
            }
            DatasetKind::Ecoregion => {
                if let Some(name) = ecoregion_name(feature) {
                    self.ecoregions.insert(name);
                }
            }
        }
    }

    /// Build the `metadata` object for the output collection.
    pub fn into_metadata(self, kind: DatasetKind) -> JsonObject {
        let mut metadata = JsonObject::new();
        match kind {
            DatasetKind::Fire => {
                metadata.insert(
                    "years".into(),
                    JsonValue::from(self.years.into_iter().collect::<Vec<_>>()),
                );
                metadata.insert(
                    "counties".into(),
                    JsonValue::from(self.units.into_iter().collect::<Vec<_>>()),
                );
            }
            DatasetKind::Ecoregion => {
                metadata.insert(
                    "ecoregions".into(),
                    JsonValue::from(self.ecoregions.into_iter().collect::<Vec<_>>()),
                );
            }
        }
        metadata
    }
}
