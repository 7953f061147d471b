//! Assembles built layers into the artifact a browser map is drawn from.

use crate::control::LayerControl;
use crate::error::{MapError, Result};
use crate::layers::{escape, FeatureGeometry, GeometryType, LayerFeature, MapLayer};
use crate::palette::ColorScale;
use crate::search::SearchIndex;
use geo::{BoundingRect, Intersects, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A tiled background map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLayerSpec {
    pub name: String,
    pub url_template: String,
    pub attribution: String,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

fn default_max_zoom() -> u8 {
    19
}

impl BaseLayerSpec {
    /// Topographic first, so it is the default visible base.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                name: "Topo".to_string(),
                url_template:
                    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Topo_Map/MapServer/tile/{z}/{y}/{x}"
                        .to_string(),
                attribution: "Tiles &copy; Esri".to_string(),
                max_zoom: default_max_zoom(),
            },
            Self {
                name: "Satellite".to_string(),
                url_template:
                    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
                        .to_string(),
                attribution: "Tiles &copy; Esri".to_string(),
                max_zoom: default_max_zoom(),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureOptions {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_position")]
    pub position: String,
    #[serde(default = "default_length_unit")]
    pub primary_length_unit: String,
    #[serde(default = "default_secondary_length_unit")]
    pub secondary_length_unit: String,
    #[serde(default = "default_area_unit")]
    pub primary_area_unit: String,
}

fn default_enabled() -> bool {
    true
}

fn default_position() -> String {
    "topleft".to_string()
}

fn default_length_unit() -> String {
    "meters".to_string()
}

fn default_secondary_length_unit() -> String {
    "kilometers".to_string()
}

fn default_area_unit() -> String {
    "hectares".to_string()
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            position: default_position(),
            primary_length_unit: default_length_unit(),
            secondary_length_unit: default_secondary_length_unit(),
            primary_area_unit: default_area_unit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    pub title: String,
    /// Base layer shown initially; the first base layer when `None`.
    pub default_base: Option<String>,
    pub search_zoom: u8,
    pub click_tolerance: f64,
    pub measure: MeasureOptions,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            default_base: None,
            search_zoom: 12,
            click_tolerance: 0.005,
            measure: MeasureOptions::default(),
        }
    }
}

/// Legend for one point layer, carrying that layer's own color scale.
///
/// `title` and entry labels are HTML-escaped; `scale` keeps the raw categories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub layer: String,
    pub title: String,
    pub entries: Vec<LegendEntry>,
    pub scale: ColorScale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapArtifact {
    pub title: String,
    pub base_layers: Vec<BaseLayerSpec>,
    pub overlays: Vec<MapLayer>,
    pub control: LayerControl,
    pub legends: Vec<Legend>,
    pub search: SearchIndex,
    pub measure: MeasureOptions,
    /// `[min_lon, min_lat, max_lon, max_lat]` of all overlay features.
    pub bounds: Option<[f64; 4]>,
    pub click_tolerance: f64,
}

pub fn compose(
    layers: Vec<MapLayer>,
    base_layers: Vec<BaseLayerSpec>,
    options: &ComposeOptions,
) -> Result<MapArtifact> {
    if base_layers.is_empty() {
        return Err(MapError::NoBaseLayer);
    }

    let mut seen = HashSet::new();
    for name in base_layers.iter().map(|b| &b.name).chain(layers.iter().map(|l| &l.name)) {
        if !seen.insert(name.as_str()) {
            return Err(MapError::DuplicateLayer(name.clone()));
        }
    }

    let control = LayerControl::new(
        base_layers.iter().map(|b| b.name.clone()).collect(),
        // Centroid markers only back the search index and are not toggleable
        layers
            .iter()
            .filter(|l| l.geometry_type != GeometryType::Centroid)
            .map(|l| (l.name.clone(), l.default_visible))
            .collect(),
        options.default_base.as_deref(),
    )?;

    let legends = layers
        .iter()
        .filter(|l| l.geometry_type == GeometryType::Point)
        .filter_map(|l| {
            let scale = l.color_scale.as_ref().filter(|s| !s.is_empty())?;
            Some(Legend {
                layer: l.name.clone(),
                title: escape(&format!("{} type", l.name)),
                entries: scale
                    .entries()
                    .iter()
                    .map(|(category, color)| LegendEntry {
                        label: escape(category),
                        color: color.clone(),
                    })
                    .collect(),
                scale: scale.clone(),
            })
        })
        .collect();

    let search = SearchIndex::build(&layers, options.search_zoom);
    let bounds = bounds_of(&layers);

    debug!(
        "Composed map with {} base layers, {} overlays, {} searchable features",
        base_layers.len(),
        layers.len(),
        search.len()
    );

    Ok(MapArtifact {
        title: options.title.clone(),
        base_layers,
        overlays: layers,
        control,
        legends,
        search,
        measure: options.measure.clone(),
        bounds,
        click_tolerance: options.click_tolerance,
    })
}

fn bounds_of(layers: &[MapLayer]) -> Option<[f64; 4]> {
    layers
        .iter()
        .flat_map(|l| l.features.iter())
        .filter_map(|f| match &f.geometry {
            FeatureGeometry::Point { lon, lat } => Some([*lon, *lat, *lon, *lat]),
            FeatureGeometry::Area { boundary } => boundary
                .bounding_rect()
                .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]),
        })
        .reduce(|a, b| [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])])
}

impl MapArtifact {
    pub fn layer(&self, name: &str) -> Option<&MapLayer> {
        self.overlays.iter().find(|l| l.name == name)
    }

    /// The feature a click at `(lon, lat)` opens, with its layer name.
    ///
    /// Visible interactive overlays are tried from the most recently enabled
    /// down; the first one with a feature at the location answers.
    pub fn click(&self, lon: f64, lat: f64) -> Option<(&str, &LayerFeature)> {
        let point = Point::new(lon, lat);
        self.control
            .enable_order()
            .iter()
            .rev()
            .filter_map(|name| self.layer(name))
            .filter(|layer| layer.interactive)
            .find_map(|layer| {
                layer
                    .features
                    .iter()
                    .find(|f| self.hits(f, &point))
                    .map(|f| (layer.name.as_str(), f))
            })
    }

    /// Name of the overlay that answers a click at `(lon, lat)`.
    pub fn topmost_at(&self, lon: f64, lat: f64) -> Option<&str> {
        self.click(lon, lat).map(|(layer, _)| layer)
    }

    pub fn popup_at(&self, lon: f64, lat: f64) -> Option<&str> {
        self.click(lon, lat).and_then(|(_, f)| f.popup.as_deref())
    }

    fn hits(&self, feature: &LayerFeature, point: &Point<f64>) -> bool {
        match &feature.geometry {
            FeatureGeometry::Point { lon, lat } => {
                (lon - point.x()).hypot(lat - point.y()) <= self.click_tolerance
            }
            FeatureGeometry::Area { boundary } => boundary.intersects(point),
        }
    }
}
