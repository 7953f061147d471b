use crate::types::{Crs, PolygonFeature, PolygonKind, PolygonLayer};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Attribute columns holding a polygon's identifying fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonSchema {
    pub id_field: String,
    pub name_field: String,
    pub type_field: String,
}

impl PolygonSchema {
    fn new(id: &str, name: &str, unit_type: &str) -> Self {
        Self {
            id_field: id.to_string(),
            name_field: name.to_string(),
            type_field: unit_type.to_string(),
        }
    }

    pub fn assessment_units() -> Self {
        Self::new("ASSESS_ID", "AU_NAME", "AU_Type")
    }

    pub fn beneficial_uses() -> Self {
        Self::new("R317Descrp", "BeneficialUse", "BU_Class")
    }

    pub fn site_specific_standards() -> Self {
        Self::new("SS_R317Des", "NAME", "SS_Type")
    }
}

pub fn load_polygon_layer(
    kind: PolygonKind,
    path: &Path,
    schema: &PolygonSchema,
) -> Result<PolygonLayer> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Polygon file {:?} has no extension", path))?;

    let layer = match extension.as_str() {
        "shp" => load_shapefile(kind, path, schema)?,
        "json" | "geojson" => load_geojson(kind, path, schema)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    info!(
        "Loaded {} {} polygons from {:?} ({})",
        layer.features.len(),
        kind.layer_name(),
        path,
        layer.crs
    );

    Ok(layer)
}

fn load_shapefile(kind: PolygonKind, path: &Path, schema: &PolygonSchema) -> Result<PolygonLayer> {
    use shapefile::dbase::FieldValue;

    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let boundary: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue,
        };

        let attributes: BTreeMap<String, String> = record
            .into_iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    FieldValue::Character(Some(s)) => s.trim().to_string(),
                    FieldValue::Numeric(Some(n)) => n.to_string(),
                    FieldValue::Float(Some(f)) => f.to_string(),
                    FieldValue::Integer(i) => i.to_string(),
                    FieldValue::Double(d) => d.to_string(),
                    FieldValue::Logical(Some(b)) => b.to_string(),
                    FieldValue::Character(None)
                    | FieldValue::Numeric(None)
                    | FieldValue::Float(None)
                    | FieldValue::Logical(None) => return None,
                    other => format!("{:?}", other),
                };
                Some((name, text))
            })
            .collect();

        if let Some(feature) = build_feature(kind, schema, attributes, boundary) {
            features.push(feature);
        }
    }

    Ok(PolygonLayer {
        kind,
        crs: shapefile_crs(path)?,
        features,
    })
}

// Reads the sibling .prj; a shapefile without one is assumed geographic WGS84
fn shapefile_crs(path: &Path) -> Result<Crs> {
    let prj = path.with_extension("prj");
    if !prj.exists() {
        return Ok(Crs::wgs84());
    }
    let wkt = fs::read_to_string(&prj).with_context(|| format!("Failed to read {:?}", prj))?;
    let wkt = wkt.trim();

    if wkt.starts_with("GEOGCS") && wkt.contains("WGS_1984") {
        return Ok(Crs::wgs84());
    }
    let name = wkt
        .split_once("[\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(name, _)| name)
        .unwrap_or(wkt);
    Ok(Crs::new(name))
}

fn load_geojson(kind: PolygonKind, path: &Path, schema: &PolygonSchema) -> Result<PolygonLayer> {
    use geojson::GeoJson;

    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;
    polygon_layer_from_geojson(kind, geojson, schema)
}

pub fn polygon_layer_from_geojson(
    kind: PolygonKind,
    geojson: geojson::GeoJson,
    schema: &PolygonSchema,
) -> Result<PolygonLayer> {
    let collection = match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Polygon GeoJSON must be a FeatureCollection")),
    };

    let crs = geojson_crs(collection.foreign_members.as_ref());
    let mut features = Vec::new();

    for feature in collection.features {
        let boundary = match feature.geometry {
            Some(geometry) => {
                let geometry: geo::Geometry<f64> = geometry
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        let attributes: BTreeMap<String, String> = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s.trim().to_string())),
                other => Some((key, other.to_string())),
            })
            .collect();

        if let Some(feature) = build_feature(kind, schema, attributes, boundary) {
            features.push(feature);
        }
    }

    Ok(PolygonLayer { kind, crs, features })
}

// Legacy "crs" member: {"type": "name", "properties": {"name": "..."}}
fn geojson_crs(foreign_members: Option<&geojson::JsonObject>) -> Crs {
    foreign_members
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(serde_json::Value::as_str)
        .map(Crs::new)
        .unwrap_or_default()
}

fn build_feature(
    kind: PolygonKind,
    schema: &PolygonSchema,
    mut attributes: BTreeMap<String, String>,
    boundary: MultiPolygon<f64>,
) -> Option<PolygonFeature> {
    let id = match attributes.remove(&schema.id_field) {
        Some(id) if !id.is_empty() => id,
        _ => {
            warn!(
                "Skipping {} polygon without '{}'",
                kind.layer_name(),
                schema.id_field
            );
            return None;
        }
    };
    let name = attributes.remove(&schema.name_field).unwrap_or_default();
    let unit_type = attributes.remove(&schema.type_field).unwrap_or_default();

    Some(PolygonFeature {
        assess_unit_id: id,
        assess_unit_name: name,
        assess_unit_type: unit_type,
        boundary,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const AU_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:OGC:1.3:CRS84"}},
        "features": [
            {
                "type": "Feature",
                "properties": {"ASSESS_ID": "UT16020204-001", "AU_NAME": "Jordan River-1", "AU_Type": "River/Stream", "Mgmt_Unit": "Jordan River"},
                "geometry": {"type": "Polygon", "coordinates": [[[-112.0, 40.0], [-111.0, 40.0], [-111.0, 41.0], [-112.0, 41.0], [-112.0, 40.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"ASSESS_ID": null, "AU_NAME": "Unassessed"},
                "geometry": {"type": "Polygon", "coordinates": [[[-110.0, 40.0], [-109.0, 40.0], [-109.0, 41.0], [-110.0, 40.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"ASSESS_ID": "gauge"},
                "geometry": {"type": "Point", "coordinates": [-111.5, 40.5]}
            }
        ]
    }"#;

    #[test]
    fn test_geojson_layer_maps_schema() {
        let mut file = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        file.write_all(AU_GEOJSON.as_bytes()).unwrap();

        let layer = load_polygon_layer(
            PolygonKind::AssessmentUnit,
            file.path(),
            &PolygonSchema::assessment_units(),
        )
        .unwrap();

        assert_eq!(layer.crs, Crs::wgs84());
        assert_eq!(layer.features.len(), 1);
        let au = &layer.features[0];
        assert_eq!(au.assess_unit_id, "UT16020204-001");
        assert_eq!(au.assess_unit_name, "Jordan River-1");
        assert_eq!(au.assess_unit_type, "River/Stream");
        assert_eq!(au.attributes.get("Mgmt_Unit").map(String::as_str), Some("Jordan River"));
        assert!(!au.attributes.contains_key("ASSESS_ID"));
    }

    #[test]
    fn test_geojson_projected_crs_is_kept() {
        let json = AU_GEOJSON.replace("urn:ogc:def:crs:OGC:1.3:CRS84", "EPSG:26912");
        let layer = polygon_layer_from_geojson(
            PolygonKind::AssessmentUnit,
            json.parse().unwrap(),
            &PolygonSchema::assessment_units(),
        )
        .unwrap();
        assert_eq!(layer.crs, Crs::new("EPSG:26912"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_polygon_layer(
            PolygonKind::BeneficialUse,
            Path::new("zones.kml"),
            &PolygonSchema::beneficial_uses(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported geometry format"));
    }
}
