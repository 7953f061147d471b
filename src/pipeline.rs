use crate::compose::{compose, ComposeOptions, MapArtifact};
use crate::config::AppConfig;
use crate::data::load_polygon_layer;
use crate::join::{check_crs, join_layers, IndexedLayer};
use crate::layers::{
    build_centroid_layer, build_label_layer, build_point_layer, build_polygon_layer, LayerStyle,
    MapLayer,
};
use crate::normalize::{normalize, FieldMapping, Provider};
use crate::sources::{CsvSiteSource, GeoJsonFacilitySource, RecordSource};
use crate::types::{Crs, JoinedRecord, PointSet, PolygonKind, PolygonLayer};
use anyhow::{Context, Result};
use tracing::info;

/// A built map plus the indexed polygons it was joined against.
pub struct MapBuild {
    pub artifact: MapArtifact,
    pub polygons: Vec<IndexedLayer>,
    pub sites: Vec<JoinedRecord>,
    pub facilities: Vec<JoinedRecord>,
}

/// Loads everything the configuration names and builds the map.
pub fn build_map(config: &AppConfig) -> Result<MapBuild> {
    let polygons = PolygonKind::ALL
        .iter()
        .map(|kind| {
            let path = config.input.polygon_path(*kind);
            load_polygon_layer(*kind, path, config.fields.polygon_schema(*kind))
                .with_context(|| format!("Failed to load {} from {:?}", kind.layer_name(), path))
        })
        .collect::<Result<Vec<_>>>()?;

    let sites = config.input.sites_csv.as_ref().map(|path| CsvSiteSource::new(path));
    let facilities = config
        .input
        .facilities_geojson
        .as_ref()
        .map(|path| GeoJsonFacilitySource::new(path, &config.fields.facility));

    let mut sources: Vec<&dyn RecordSource> = Vec::new();
    if let Some(source) = &sites {
        sources.push(source);
    }
    if let Some(source) = &facilities {
        sources.push(source);
    }

    build_with_sources(config, polygons, &sources)
}

/// Builds the map from already loaded polygons and any number of point sources.
/// At most one source per provider is expected; with none the map carries only
/// base and polygon layers.
pub fn build_with_sources(
    config: &AppConfig,
    polygons: Vec<PolygonLayer>,
    sources: &[&dyn RecordSource],
) -> Result<MapBuild> {
    // Normalized points are always WGS84
    let points_crs = Crs::wgs84();
    for layer in &polygons {
        check_crs(&points_crs, layer)?;
    }

    let polygons = polygons
        .into_iter()
        .map(IndexedLayer::new)
        .collect::<crate::error::Result<Vec<_>>>()?;

    let join_targets: Vec<&IndexedLayer> = polygons
        .iter()
        .filter(|layer| config.input.join_layers.contains(&layer.kind()))
        .collect();

    let mut sites = Vec::new();
    let mut facilities = Vec::new();

    for source in sources {
        let provider = source.provider();
        let mapping = config.fields.point_mapping(provider);
        let joined = load_and_join(*source, mapping, &join_targets)?;
        info!("Joined {} {} records", joined.len(), provider);

        match provider {
            Provider::Site => sites.extend(joined),
            Provider::Facility => facilities.extend(joined),
        }
    }

    let mut layers: Vec<MapLayer> = Vec::new();
    for indexed in &polygons {
        let kind = indexed.kind();
        let mut style = LayerStyle::polygons(kind);
        if let Some(color) = config.map.polygon_colors.get(&kind) {
            style = style.with_color(color)?;
        }
        layers.push(build_polygon_layer(kind.layer_name(), indexed.layer(), style));
    }

    if !sites.is_empty() {
        layers.push(build_point_layer(
            &config.map.sites_layer,
            &sites,
            LayerStyle::points(),
        ));
        if config.map.labels {
            layers.push(build_label_layer(&config.map.labels_layer, &sites));
        }
    }
    if !facilities.is_empty() {
        layers.push(build_point_layer(
            &config.map.facilities_layer,
            &facilities,
            LayerStyle::points(),
        ));
    }

    for indexed in &polygons {
        let name = indexed.kind().centroid_layer_name();
        layers.push(build_centroid_layer(name, indexed.layer()));
    }

    let options = ComposeOptions {
        title: config.map.title.clone(),
        default_base: config.map.default_base.clone(),
        search_zoom: config.map.search_zoom,
        click_tolerance: config.map.click_tolerance,
        measure: config.map.measure.clone(),
    };
    let artifact = compose(layers, config.map.base_layers.clone(), &options)?;

    info!(
        "Built map '{}' with {} sites, {} facilities and {} overlays",
        artifact.title,
        sites.len(),
        facilities.len(),
        artifact.overlays.len()
    );

    Ok(MapBuild {
        artifact,
        polygons,
        sites,
        facilities,
    })
}

fn load_and_join(
    source: &dyn RecordSource,
    mapping: &FieldMapping,
    targets: &[&IndexedLayer],
) -> crate::error::Result<Vec<JoinedRecord>> {
    let raw = source.fetch()?;
    let records = normalize(source.provider(), &raw, mapping)?;
    join_layers(&PointSet::new(records), targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::join::tests::square;
    use crate::normalize::RawRecord;
    use crate::sources::StaticSource;
    use serde_json::json;

    fn reference_polygons() -> Vec<PolygonLayer> {
        vec![
            PolygonLayer::new(
                PolygonKind::AssessmentUnit,
                vec![
                    square("UT-AU-001", "Jordan River-1", -112.0, 40.0, 1.0),
                    square("UT-AU-002", "Mill Creek", -110.0, 40.0, 1.0),
                ],
            ),
            PolygonLayer::new(
                PolygonKind::BeneficialUse,
                vec![square("BU-1", "1C 2B 3B 4", -111.8, 40.2, 1.0)],
            ),
            PolygonLayer::new(
                PolygonKind::SiteSpecificStandard,
                vec![square("SS-1", "Jordan River TDS", -113.0, 39.0, 0.5)],
            ),
        ]
    }

    fn site_row(id: &str, lat: f64, lon: f64) -> RawRecord {
        let mut row = RawRecord::new();
        row.insert("MonitoringLocationIdentifier".into(), json!(id));
        row.insert("MonitoringLocationName".into(), json!(format!("Site {id}")));
        row.insert("MonitoringLocationTypeName".into(), json!("River/Stream"));
        row.insert("LatitudeMeasure".into(), json!(lat));
        row.insert("LongitudeMeasure".into(), json!(lon));
        row
    }

    #[test]
    fn test_sites_joined_to_assessment_units() {
        let source = StaticSource::new(
            Provider::Site,
            vec![
                site_row("4994790", 40.5, -111.5),
                site_row("4994792", 40.9, -111.2),
                site_row("5910250", 35.0, -105.0),
            ],
        );
        let build = build_with_sources(&AppConfig::default(), reference_polygons(), &[&source])
            .unwrap();

        let ids: Vec<_> = build.sites.iter().map(|r| r.assess_unit_id()).collect();
        assert_eq!(ids, vec![Some("UT-AU-001"), Some("UT-AU-001"), None]);
        assert!(build.facilities.is_empty());

        let sites = build.artifact.layer("Sites").unwrap();
        assert_eq!(sites.features.len(), 3);
        assert!(sites.features[0].popup.as_deref().unwrap().contains("AU ID: UT-AU-001"));
        assert!(build.artifact.layer("Site IDs").is_some());
        assert_eq!(build.artifact.legends.len(), 1);
        assert_eq!(build.polygons.len(), 3);
    }

    #[test]
    fn test_no_sources_yields_polygon_only_map() {
        let build = build_with_sources(&AppConfig::default(), reference_polygons(), &[]).unwrap();
        let control = &build.artifact.control;

        assert_eq!(control.visible_layers(), vec!["Topo"]);
        assert_eq!(
            control.overlays(),
            ["Assessment units", "Beneficial uses", "Site-specific standards"]
        );
        for kind in PolygonKind::ALL {
            assert!(build.artifact.layer(kind.centroid_layer_name()).is_some());
        }
        assert!(build.artifact.search.resolve("Mill Creek").is_some());
    }

    #[test]
    fn test_schema_error_fails_build() {
        let mut row = site_row("4994790", 40.5, -111.5);
        row.remove("LatitudeMeasure");
        let source = StaticSource::new(Provider::Site, vec![row]);

        let Err(err) = build_with_sources(&AppConfig::default(), reference_polygons(), &[&source])
        else {
            panic!("missing latitude should fail the build");
        };
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::Schema { .. })
        ));
    }

    #[test]
    fn test_join_layers_follow_config() {
        let mut config = AppConfig::default();
        config.input.join_layers = vec![PolygonKind::BeneficialUse];
        let source = StaticSource::new(Provider::Site, vec![site_row("A", 40.5, -111.5)]);

        let build = build_with_sources(&config, reference_polygons(), &[&source]).unwrap();
        let record = &build.sites[0];
        assert!(!record.joined_against(PolygonKind::AssessmentUnit));
        assert_eq!(record.matched(PolygonKind::BeneficialUse).unwrap().id, "BU-1");
    }

    #[test]
    fn test_polygon_color_override() {
        let mut config = AppConfig::default();
        config
            .map
            .polygon_colors
            .insert(PolygonKind::AssessmentUnit, "red".to_string());
        let build = build_with_sources(&config, reference_polygons(), &[]).unwrap();
        assert_eq!(build.artifact.layer("Assessment units").unwrap().style.color, "#ff0000");

        config
            .map
            .polygon_colors
            .insert(PolygonKind::AssessmentUnit, "not a color".to_string());
        let Err(err) = build_with_sources(&config, reference_polygons(), &[]) else {
            panic!("unparseable color should fail the build");
        };
        assert!(matches!(
            err.downcast_ref::<MapError>(),
            Some(MapError::InvalidColor { .. })
        ));
    }

    #[test]
    fn test_zones_of_every_kind_are_searchable() {
        let build = build_with_sources(&AppConfig::default(), reference_polygons(), &[]).unwrap();
        let search = &build.artifact.search;

        let target = search.resolve("1C 2B 3B 4").unwrap();
        assert_eq!(target.layer, "Beneficial use centroids");
        assert!(target.popup.unwrap().starts_with("Beneficial uses: 1C 2B 3B 4"));

        let target = search.resolve("SS-1").unwrap();
        assert_eq!(target.layer, "Site-specific standard centroids");
    }

    #[test]
    fn test_projected_layer_reports_crs_mismatch() {
        let mut polygons = reference_polygons();
        polygons[1] = PolygonLayer {
            crs: Crs::new("EPSG:26912"),
            ..PolygonLayer::new(
                PolygonKind::BeneficialUse,
                vec![square("utm", "Projected", 420_000.0, 4_500_000.0, 1000.0)],
            )
        };
        let source = StaticSource::new(Provider::Site, vec![site_row("A", 40.5, -111.5)]);

        let Err(err) = build_with_sources(&AppConfig::default(), polygons, &[&source]) else {
            panic!("projected polygons should not join against WGS84 points");
        };
        match err.downcast_ref::<MapError>() {
            Some(MapError::CrsMismatch { points, polygons }) => {
                assert_eq!(points, &Crs::wgs84());
                assert_eq!(polygons.as_str(), "EPSG:26912");
            }
            other => panic!("expected CRS mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_facilities_get_their_own_layer() {
        let mut row = RawRecord::new();
        row.insert("SourceID".into(), json!("UT0021725"));
        row.insert("CWPName".into(), json!("CENTRAL VALLEY WRF"));
        row.insert("CWPFacilityTypeIndicator".into(), json!("POTW"));
        row.insert("FacLat".into(), json!(40.7));
        row.insert("FacLong".into(), json!(-111.9));
        let source = StaticSource::new(Provider::Facility, vec![row]);

        let build = build_with_sources(&AppConfig::default(), reference_polygons(), &[&source])
            .unwrap();
        assert_eq!(build.facilities.len(), 1);
        assert!(build.artifact.layer("Facilities").is_some());
        assert!(build.artifact.layer("Sites").is_none());
        assert_eq!(build.artifact.search.resolve("UT0021725").unwrap().layer, "Facilities");
    }
}
