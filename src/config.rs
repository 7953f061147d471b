use crate::compose::{BaseLayerSpec, MeasureOptions};
use crate::data::PolygonSchema;
use crate::normalize::{FieldMapping, Provider};
use crate::types::PolygonKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration. Every section is optional; an empty file yields a
/// map built from the default reference datasets with no points.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Monitoring site export (CSV). No sites when absent.
    pub sites_csv: Option<PathBuf>,
    /// Facility export (GeoJSON FeatureCollection). No facilities when absent.
    pub facilities_geojson: Option<PathBuf>,
    #[serde(default = "default_assessment_units")]
    pub assessment_units: PathBuf,
    #[serde(default = "default_beneficial_uses")]
    pub beneficial_uses: PathBuf,
    #[serde(default = "default_site_specific_standards")]
    pub site_specific_standards: PathBuf,
    /// Polygon layers the points are joined against.
    #[serde(default = "default_join_layers")]
    pub join_layers: Vec<PolygonKind>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sites_csv: None,
            facilities_geojson: None,
            assessment_units: default_assessment_units(),
            beneficial_uses: default_beneficial_uses(),
            site_specific_standards: default_site_specific_standards(),
            join_layers: default_join_layers(),
        }
    }
}

impl InputConfig {
    pub fn polygon_path(&self, kind: PolygonKind) -> &Path {
        match kind {
            PolygonKind::AssessmentUnit => &self.assessment_units,
            PolygonKind::BeneficialUse => &self.beneficial_uses,
            PolygonKind::SiteSpecificStandard => &self.site_specific_standards,
        }
    }
}

fn default_assessment_units() -> PathBuf {
    PathBuf::from("data/assessment_units.geojson")
}

fn default_beneficial_uses() -> PathBuf {
    PathBuf::from("data/beneficial_uses.geojson")
}

fn default_site_specific_standards() -> PathBuf {
    PathBuf::from("data/site_specific_standards.geojson")
}

fn default_join_layers() -> Vec<PolygonKind> {
    PolygonKind::ALL.to_vec()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldsConfig {
    #[serde(default = "FieldMapping::site")]
    pub site: FieldMapping,
    #[serde(default = "FieldMapping::facility")]
    pub facility: FieldMapping,
    #[serde(default = "PolygonSchema::assessment_units")]
    pub assessment_units: PolygonSchema,
    #[serde(default = "PolygonSchema::beneficial_uses")]
    pub beneficial_uses: PolygonSchema,
    #[serde(default = "PolygonSchema::site_specific_standards")]
    pub site_specific_standards: PolygonSchema,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            site: FieldMapping::site(),
            facility: FieldMapping::facility(),
            assessment_units: PolygonSchema::assessment_units(),
            beneficial_uses: PolygonSchema::beneficial_uses(),
            site_specific_standards: PolygonSchema::site_specific_standards(),
        }
    }
}

impl FieldsConfig {
    pub fn point_mapping(&self, provider: Provider) -> &FieldMapping {
        match provider {
            Provider::Site => &self.site,
            Provider::Facility => &self.facility,
        }
    }

    pub fn polygon_schema(&self, kind: PolygonKind) -> &PolygonSchema {
        match kind {
            PolygonKind::AssessmentUnit => &self.assessment_units,
            PolygonKind::BeneficialUse => &self.beneficial_uses,
            PolygonKind::SiteSpecificStandard => &self.site_specific_standards,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_sites_layer")]
    pub sites_layer: String,
    #[serde(default = "default_facilities_layer")]
    pub facilities_layer: String,
    /// Adds an always-on site id label layer when true.
    #[serde(default = "default_true")]
    pub labels: bool,
    #[serde(default = "default_labels_layer")]
    pub labels_layer: String,
    #[serde(default = "BaseLayerSpec::defaults")]
    pub base_layers: Vec<BaseLayerSpec>,
    /// Base layer shown at load; the first base layer when unset.
    pub default_base: Option<String>,
    #[serde(default)]
    pub measure: MeasureOptions,
    /// Zoom level used when a search hit is resolved.
    #[serde(default = "default_search_zoom")]
    pub search_zoom: u8,
    /// Click radius, in degrees, within which a point marker yields its popup.
    #[serde(default = "default_click_tolerance")]
    pub click_tolerance: f64,
    /// Outline color overrides for the polygon layers (any CSS color).
    #[serde(default)]
    pub polygon_colors: BTreeMap<PolygonKind, String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            sites_layer: default_sites_layer(),
            facilities_layer: default_facilities_layer(),
            labels: true,
            labels_layer: default_labels_layer(),
            base_layers: BaseLayerSpec::defaults(),
            default_base: None,
            measure: MeasureOptions::default(),
            search_zoom: default_search_zoom(),
            click_tolerance: default_click_tolerance(),
            polygon_colors: BTreeMap::new(),
        }
    }
}

fn default_title() -> String {
    "Water quality monitoring sites".to_string()
}

fn default_sites_layer() -> String {
    "Sites".to_string()
}

fn default_facilities_layer() -> String {
    "Facilities".to_string()
}

fn default_labels_layer() -> String {
    "Site IDs".to_string()
}

fn default_true() -> bool {
    true
}

fn default_search_zoom() -> u8 {
    12
}

fn default_click_tolerance() -> f64 {
    0.005
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_html")]
    pub html: PathBuf,
    /// Also write the artifact as JSON when set.
    pub artifact_json: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            html: default_html(),
            artifact_json: None,
        }
    }
}

fn default_html() -> PathBuf {
    PathBuf::from("map.html")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    8080
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
