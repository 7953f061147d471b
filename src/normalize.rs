//! Maps provider rows onto [`PointRecord`] through an explicit [`FieldMapping`].

use crate::error::{MapError, Result};
use crate::types::PointRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One raw provider row, keyed by the provider's own column names.
pub type RawRecord = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Site,
    Facility,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Site => f.write_str("site"),
            Provider::Facility => f.write_str("facility"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id_field: String,
    pub name_field: String,
    pub type_field: String,
    pub lat_field: String,
    pub long_field: String,
}

impl FieldMapping {
    /// Water Quality Portal station export columns.
    pub fn site() -> Self {
        Self {
            id_field: "MonitoringLocationIdentifier".to_string(),
            name_field: "MonitoringLocationName".to_string(),
            type_field: "MonitoringLocationTypeName".to_string(),
            lat_field: "LatitudeMeasure".to_string(),
            long_field: "LongitudeMeasure".to_string(),
        }
    }

    /// ECHO water facility export columns.
    pub fn facility() -> Self {
        Self {
            id_field: "SourceID".to_string(),
            name_field: "CWPName".to_string(),
            type_field: "CWPFacilityTypeIndicator".to_string(),
            lat_field: "FacLat".to_string(),
            long_field: "FacLong".to_string(),
        }
    }
}

/// Converts raw provider records to point records.
///
/// Fails on the first record that lacks a mapped field or carries an
/// unusable coordinate; no partial output is returned.
pub fn normalize(
    provider: Provider,
    records: &[RawRecord],
    mapping: &FieldMapping,
) -> Result<Vec<PointRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_record(provider, index, record, mapping))
        .collect()
}

fn normalize_record(
    provider: Provider,
    index: usize,
    record: &RawRecord,
    mapping: &FieldMapping,
) -> Result<PointRecord> {
    let location_id = text_field(provider, index, record, &mapping.id_field)?;
    if location_id.is_empty() {
        return Err(schema_error(provider, index, &mapping.id_field, "is empty"));
    }
    let location_name = text_field(provider, index, record, &mapping.name_field)?;
    let location_type = text_field(provider, index, record, &mapping.type_field)?;
    let latitude = coordinate_field(provider, index, record, &mapping.lat_field)?;
    let longitude = coordinate_field(provider, index, record, &mapping.long_field)?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(MapError::InvalidCoordinate {
            location_id,
            latitude,
            longitude,
        });
    }

    Ok(PointRecord {
        location_id,
        location_name,
        location_type,
        latitude,
        longitude,
    })
}

fn required<'a>(
    provider: Provider,
    index: usize,
    record: &'a RawRecord,
    field: &str,
) -> Result<&'a Value> {
    match record.get(field) {
        None => Err(schema_error(provider, index, field, "is missing")),
        Some(Value::Null) => Err(schema_error(provider, index, field, "is null")),
        Some(value) => Ok(value),
    }
}

fn text_field(provider: Provider, index: usize, record: &RawRecord, field: &str) -> Result<String> {
    match required(provider, index, record, field)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(schema_error(provider, index, field, "is not a scalar")),
    }
}

fn coordinate_field(
    provider: Provider,
    index: usize,
    record: &RawRecord,
    field: &str,
) -> Result<f64> {
    let value = match required(provider, index, record, field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(schema_error(provider, index, field, "is not a number")),
    }
}

fn schema_error(provider: Provider, index: usize, field: &str, reason: &str) -> MapError {
    MapError::Schema {
        provider: provider.to_string(),
        field: field.to_string(),
        record: index,
        reason: reason.to_string(),
    }
}
