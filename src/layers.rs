use crate::palette::{color_to_hex, ColorScale};
use crate::types::{JoinedRecord, PolygonFeature, PolygonKind, PolygonLayer, PolygonMatch};
use geo::{InteriorPoint, MultiPolygon};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    Point,
    Polygon,
    Label,
    Centroid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    pub radius: f64,
}

impl LayerStyle {
    pub fn points() -> Self {
        Self {
            color: "#000000".to_string(),
            weight: 1.0,
            opacity: 0.8,
            fill_opacity: 0.8,
            radius: 6.0,
        }
    }

    pub fn polygons(kind: PolygonKind) -> Self {
        let color = match kind {
            PolygonKind::AssessmentUnit => "#ff8c00",
            PolygonKind::BeneficialUse => "#2b8cbe",
            PolygonKind::SiteSpecificStandard => "#756bb1",
        };
        Self {
            color: color.to_string(),
            weight: 2.0,
            opacity: 0.9,
            fill_opacity: 0.1,
            radius: 0.0,
        }
    }

    pub fn labels() -> Self {
        Self {
            color: "#202020".to_string(),
            weight: 0.0,
            opacity: 1.0,
            fill_opacity: 0.0,
            radius: 0.0,
        }
    }

    pub fn hidden_markers() -> Self {
        Self {
            color: "#000000".to_string(),
            weight: 0.0,
            opacity: 0.0,
            fill_opacity: 0.0,
            radius: 0.0,
        }
    }

    /// Replaces the stroke color; accepts any CSS color.
    pub fn with_color(mut self, color: &str) -> crate::error::Result<Self> {
        self.color = color_to_hex(color)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureGeometry {
    Point {
        lon: f64,
        lat: f64,
    },
    Area {
        #[serde(serialize_with = "serialize_boundary")]
        boundary: MultiPolygon<f64>,
    },
}

fn serialize_boundary<S: Serializer>(
    boundary: &MultiPolygon<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    geojson::Geometry::new(geojson::Value::from(boundary)).serialize(serializer)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerFeature {
    pub id: String,
    pub name: String,
    pub geometry: FeatureGeometry,
    pub popup: Option<String>,
    pub label: Option<String>,
    pub color: Option<String>,
}

impl LayerFeature {
    /// Location a search hit pans to.
    pub fn anchor(&self) -> (f64, f64) {
        match &self.geometry {
            FeatureGeometry::Point { lon, lat } => (*lon, *lat),
            FeatureGeometry::Area { boundary } => boundary
                .interior_point()
                .map(|p| (p.x(), p.y()))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub name: String,
    pub geometry_type: GeometryType,
    pub polygon_kind: Option<PolygonKind>,
    pub style: LayerStyle,
    pub features: Vec<LayerFeature>,
    pub searchable: bool,
    pub default_visible: bool,
    /// Clicks on this layer open popups.
    pub interactive: bool,
    pub color_scale: Option<ColorScale>,
}

/// One circle marker per record, colored by `location_type`.
pub fn build_point_layer(name: &str, records: &[JoinedRecord], style: LayerStyle) -> MapLayer {
    let scale = ColorScale::from_categories(records.iter().map(|r| r.point.location_type.as_str()));

    let features = records
        .iter()
        .map(|record| LayerFeature {
            id: record.point.location_id.clone(),
            name: record.point.location_name.clone(),
            geometry: FeatureGeometry::Point {
                lon: record.point.longitude,
                lat: record.point.latitude,
            },
            popup: Some(point_popup(record)),
            label: Some(record.point.location_name.clone()),
            color: scale.color_for(&record.point.location_type).map(str::to_string),
        })
        .collect();

    MapLayer {
        name: name.to_string(),
        geometry_type: GeometryType::Point,
        polygon_kind: None,
        style,
        features,
        searchable: true,
        default_visible: true,
        interactive: true,
        color_scale: Some(scale),
    }
}

pub fn build_polygon_layer(name: &str, layer: &PolygonLayer, style: LayerStyle) -> MapLayer {
    let features = layer
        .features
        .iter()
        .map(|feature| LayerFeature {
            id: feature.assess_unit_id.clone(),
            name: feature.assess_unit_name.clone(),
            geometry: FeatureGeometry::Area {
                boundary: feature.boundary.clone(),
            },
            popup: Some(polygon_popup(layer.kind, feature)),
            label: Some(feature.assess_unit_name.clone()),
            color: None,
        })
        .collect();

    MapLayer {
        name: name.to_string(),
        geometry_type: GeometryType::Polygon,
        polygon_kind: Some(layer.kind),
        style,
        features,
        searchable: false,
        default_visible: false,
        interactive: true,
        color_scale: None,
    }
}

/// Permanent text labels showing each record's identifier.
pub fn build_label_layer(name: &str, records: &[JoinedRecord]) -> MapLayer {
    let features = records
        .iter()
        .map(|record| LayerFeature {
            id: record.point.location_id.clone(),
            name: record.point.location_name.clone(),
            geometry: FeatureGeometry::Point {
                lon: record.point.longitude,
                lat: record.point.latitude,
            },
            popup: None,
            label: Some(escape(&record.point.location_id)),
            color: None,
        })
        .collect();

    MapLayer {
        name: name.to_string(),
        geometry_type: GeometryType::Label,
        polygon_kind: None,
        style: LayerStyle::labels(),
        features,
        searchable: false,
        default_visible: true,
        interactive: false,
        color_scale: None,
    }
}

/// Invisible interior-point markers, one per polygon, that make polygons
/// findable through search without drawing their boundaries.
pub fn build_centroid_layer(name: &str, layer: &PolygonLayer) -> MapLayer {
    let features = layer
        .features
        .iter()
        .filter_map(|feature| {
            let point = feature.boundary.interior_point()?;
            Some(LayerFeature {
                id: feature.assess_unit_id.clone(),
                name: feature.assess_unit_name.clone(),
                geometry: FeatureGeometry::Point {
                    lon: point.x(),
                    lat: point.y(),
                },
                popup: Some(polygon_popup(layer.kind, feature)),
                label: Some(escape(&feature.assess_unit_name)),
                color: None,
            })
        })
        .collect();

    MapLayer {
        name: name.to_string(),
        geometry_type: GeometryType::Centroid,
        polygon_kind: Some(layer.kind),
        style: LayerStyle::hidden_markers(),
        features,
        searchable: true,
        default_visible: false,
        interactive: false,
        color_scale: None,
    }
}

pub fn point_popup(record: &JoinedRecord) -> String {
    let p = &record.point;
    let mut popup = format!(
        "ID: {}<br/>Name: {}<br/>Type: {}<br/>Latitude: {}<br/>Longitude: {}",
        escape(&p.location_id),
        escape(&p.location_name),
        escape(&p.location_type),
        p.latitude,
        p.longitude
    );

    if record.joined_against(PolygonKind::AssessmentUnit) {
        popup.push_str(&format!(
            "<br/>AU ID: {}<br/>AU name: {}",
            matched_field(record, PolygonKind::AssessmentUnit, |m| m.id.as_str()),
            matched_field(record, PolygonKind::AssessmentUnit, |m| m.name.as_str())
        ));
    }
    if record.joined_against(PolygonKind::BeneficialUse) {
        popup.push_str(&format!(
            "<br/>Beneficial uses: {}",
            matched_field(record, PolygonKind::BeneficialUse, |m| m.name.as_str())
        ));
    }
    if record.joined_against(PolygonKind::SiteSpecificStandard) {
        popup.push_str(&format!(
            "<br/>Site-specific standard: {}",
            matched_field(record, PolygonKind::SiteSpecificStandard, |m| m.name.as_str())
        ));
    }
    popup
}

fn matched_field(
    record: &JoinedRecord,
    kind: PolygonKind,
    pick: fn(&PolygonMatch) -> &str,
) -> String {
    record
        .matched(kind)
        .map(|m| escape(pick(m)))
        .unwrap_or_else(|| "NA".to_string())
}

pub fn polygon_popup(kind: PolygonKind, feature: &PolygonFeature) -> String {
    let id = escape(&feature.assess_unit_id);
    let name = escape(&feature.assess_unit_name);
    let unit_type = escape(&feature.assess_unit_type);
    match kind {
        PolygonKind::AssessmentUnit => {
            format!("AU name: {name}<br/>AU ID: {id}<br/>AU type: {unit_type}")
        }
        PolygonKind::BeneficialUse => {
            format!("Beneficial uses: {name}<br/>Zone ID: {id}<br/>Zone type: {unit_type}")
        }
        PolygonKind::SiteSpecificStandard => {
            format!("Site-specific standard: {name}<br/>Zone ID: {id}<br/>Zone type: {unit_type}")
        }
    }
}

/// HTML-escapes text bound for popups, labels and legends.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::tests::{site, square};

    fn joined(id: &str, location_type: &str, au: Option<(&str, &str)>) -> JoinedRecord {
        let mut point = site(id, -111.5, 40.5);
        point.location_type = location_type.to_string();
        let mut record = JoinedRecord::unjoined(point);
        record.matches.insert(
            PolygonKind::AssessmentUnit,
            au.map(|(id, name)| PolygonMatch {
                id: id.to_string(),
                name: name.to_string(),
                unit_type: "River/Stream".to_string(),
            }),
        );
        record
    }

    #[test]
    fn test_point_popup_template() {
        let record = joined("4994790", "River/Stream", Some(("UT-AU-001", "Jordan River-1")));
        assert_eq!(
            point_popup(&record),
            "ID: 4994790<br/>Name: Site 4994790<br/>Type: River/Stream<br/>Latitude: 40.5<br/>Longitude: -111.5<br/>AU ID: UT-AU-001<br/>AU name: Jordan River-1"
        );
    }

    #[test]
    fn test_point_popup_unmatched_and_unjoined() {
        let unmatched = joined("X", "Lake", None);
        assert!(point_popup(&unmatched).ends_with("<br/>AU ID: NA<br/>AU name: NA"));

        let bare = JoinedRecord::unjoined(site("Y", -111.5, 40.5));
        assert!(point_popup(&bare).ends_with("Longitude: -111.5"));
    }

    #[test]
    fn test_popup_escapes_html() {
        let mut record = joined("<b>", "Canal & Ditch", None);
        record.point.location_name = "O'Brien \"Spring\"".to_string();
        let popup = point_popup(&record);
        assert!(popup.contains("ID: &lt;b&gt;"));
        assert!(popup.contains("Type: Canal &amp; Ditch"));
        assert!(popup.contains("Name: O&#39;Brien &quot;Spring&quot;"));
    }

    #[test]
    fn test_polygon_popup_templates() {
        let feature = square("UT16020204-001", "Jordan River-1", -112.0, 40.0, 1.0);
        assert_eq!(
            polygon_popup(PolygonKind::AssessmentUnit, &feature),
            "AU name: Jordan River-1<br/>AU ID: UT16020204-001<br/>AU type: River/Stream"
        );
        assert!(polygon_popup(PolygonKind::BeneficialUse, &feature)
            .starts_with("Beneficial uses: Jordan River-1"));
        assert!(polygon_popup(PolygonKind::SiteSpecificStandard, &feature)
            .starts_with("Site-specific standard: Jordan River-1"));
    }

    #[test]
    fn test_point_layer_colors_follow_scale() {
        let records = vec![
            joined("A", "River/Stream", None),
            joined("B", "Lake", None),
            joined("C", "River/Stream", None),
        ];
        let layer = build_point_layer("Sites", &records, LayerStyle::points());
        let scale = layer.color_scale.as_ref().unwrap();

        assert_eq!(scale.entries().len(), 2);
        assert_eq!(layer.features[0].color.as_deref(), scale.color_for("River/Stream"));
        assert_eq!(layer.features[1].color.as_deref(), scale.color_for("Lake"));
        assert_eq!(layer.features[0].color, layer.features[2].color);
        assert!(layer.searchable && layer.default_visible);
    }

    #[test]
    fn test_polygon_layer_hidden_by_default() {
        let polygons = PolygonLayer::new(
            PolygonKind::BeneficialUse,
            vec![square("BU-1", "1C 2B 3A 4", -112.0, 40.0, 1.0)],
        );
        let layer = build_polygon_layer(
            "Beneficial uses",
            &polygons,
            LayerStyle::polygons(PolygonKind::BeneficialUse),
        );
        assert!(!layer.default_visible);
        assert!(!layer.searchable);
        assert_eq!(layer.polygon_kind, Some(PolygonKind::BeneficialUse));
        assert_eq!(layer.features.len(), 1);
    }

    #[test]
    fn test_label_layer_uses_ids() {
        let records = vec![joined("4994790", "River/Stream", None)];
        let layer = build_label_layer("Site IDs", &records);
        assert_eq!(layer.features[0].label.as_deref(), Some("4994790"));
        assert!(layer.features[0].popup.is_none());
        assert!(!layer.interactive);

        let hostile = vec![joined("<img src=x onerror=alert(1)>", "Lake", None)];
        let layer = build_label_layer("Site IDs", &hostile);
        assert_eq!(
            layer.features[0].label.as_deref(),
            Some("&lt;img src=x onerror=alert(1)&gt;")
        );
        assert_eq!(layer.features[0].id, "<img src=x onerror=alert(1)>");
    }

    #[test]
    fn test_centroid_inside_polygon() {
        use geo::Contains;

        let polygons = PolygonLayer::new(
            PolygonKind::AssessmentUnit,
            vec![square("UT-AU-001", "Jordan River-1", -112.0, 40.0, 1.0)],
        );
        let layer = build_centroid_layer("AU centroids", &polygons);
        let (lon, lat) = layer.features[0].anchor();

        assert!(polygons.features[0].boundary.contains(&geo::Point::new(lon, lat)));
        assert!(layer.searchable);
        assert!(!layer.default_visible);
    }

    #[test]
    fn test_style_color_override() {
        let style = LayerStyle::polygons(PolygonKind::AssessmentUnit).with_color("teal").unwrap();
        assert_eq!(style.color, "#008080");
        assert!(matches!(
            LayerStyle::points().with_color("#zz"),
            Err(crate::error::MapError::InvalidColor { .. })
        ));
    }
}
