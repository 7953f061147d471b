use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coordinate reference identifier attached to point sets and polygon layers.
///
/// Only geographic longitude/latitude is supported; the identifier exists so
/// that mismatched inputs can be rejected before any containment test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub const WGS84: &'static str = "EPSG:4326";

    /// Builds a CRS from a code or URN, folding the common WGS84 aliases.
    pub fn new(code: &str) -> Self {
        let trimmed = code.trim();
        let canonical = match trimmed.to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" | "WGS 84" | "CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84"
            | "URN:OGC:DEF:CRS:EPSG::4326" => Self::WGS84.to_string(),
            _ => trimmed.to_string(),
        };
        Crs(canonical)
    }

    pub fn wgs84() -> Self {
        Crs(Self::WGS84.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three reference polygon datasets. Structurally identical, semantically distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonKind {
    AssessmentUnit,
    BeneficialUse,
    SiteSpecificStandard,
}

impl PolygonKind {
    pub const ALL: [PolygonKind; 3] = [
        PolygonKind::AssessmentUnit,
        PolygonKind::BeneficialUse,
        PolygonKind::SiteSpecificStandard,
    ];

    /// Overlay name shown in the layer control.
    pub fn layer_name(self) -> &'static str {
        match self {
            PolygonKind::AssessmentUnit => "Assessment units",
            PolygonKind::BeneficialUse => "Beneficial uses",
            PolygonKind::SiteSpecificStandard => "Site-specific standards",
        }
    }

    /// Name of the hidden layer that makes this kind's polygons searchable.
    pub fn centroid_layer_name(self) -> &'static str {
        match self {
            PolygonKind::AssessmentUnit => "Assessment unit centroids",
            PolygonKind::BeneficialUse => "Beneficial use centroids",
            PolygonKind::SiteSpecificStandard => "Site-specific standard centroids",
        }
    }
}

impl fmt::Display for PolygonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.layer_name())
    }
}

/// A monitoring site or facility in the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub location_id: String,
    pub location_name: String,
    pub location_type: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PointRecord {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Normalized records tagged with the CRS their coordinates are expressed in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointSet {
    pub crs: Crs,
    pub records: Vec<PointRecord>,
}

impl PointSet {
    pub fn new(records: Vec<PointRecord>) -> Self {
        Self {
            crs: Crs::wgs84(),
            records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature {
    pub assess_unit_id: String,
    pub assess_unit_name: String,
    pub assess_unit_type: String,
    pub boundary: MultiPolygon<f64>,
    // Remaining attribute columns, stringified
    pub attributes: BTreeMap<String, String>,
}

impl PolygonFeature {
    pub fn identity(&self) -> PolygonMatch {
        PolygonMatch {
            id: self.assess_unit_id.clone(),
            name: self.assess_unit_name.clone(),
            unit_type: self.assess_unit_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonLayer {
    pub kind: PolygonKind,
    pub crs: Crs,
    pub features: Vec<PolygonFeature>,
}

impl PolygonLayer {
    pub fn new(kind: PolygonKind, features: Vec<PolygonFeature>) -> Self {
        Self {
            kind,
            crs: Crs::wgs84(),
            features,
        }
    }
}

/// Identifying attributes copied from a containing polygon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonMatch {
    pub id: String,
    pub name: String,
    pub unit_type: String,
}

/// A point plus, per polygon layer it was joined against, the containing polygon (if any).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRecord {
    pub point: PointRecord,
    pub matches: BTreeMap<PolygonKind, Option<PolygonMatch>>,
}

impl JoinedRecord {
    pub fn unjoined(point: PointRecord) -> Self {
        Self {
            point,
            matches: BTreeMap::new(),
        }
    }

    pub fn joined_against(&self, kind: PolygonKind) -> bool {
        self.matches.contains_key(&kind)
    }

    pub fn matched(&self, kind: PolygonKind) -> Option<&PolygonMatch> {
        self.matches.get(&kind).and_then(Option::as_ref)
    }

    pub fn assess_unit_id(&self) -> Option<&str> {
        self.matched(PolygonKind::AssessmentUnit)
            .map(|m| m.id.as_str())
    }
}
