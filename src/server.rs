use crate::compose::MapArtifact;
use crate::config::AppConfig;
use crate::join::IndexedLayer;
use crate::pipeline::MapBuild;
use crate::render::render_html;
use crate::search::{SearchEntry, SearchTarget};
use crate::types::{PolygonKind, PolygonMatch};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, Json},
    routing::get,
    Router,
};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub artifact: MapArtifact,
    pub polygons: Vec<IndexedLayer>,
    pub html: String,
}

impl AppState {
    pub fn new(build: MapBuild) -> Result<Self> {
        let html = render_html(&build.artifact)?;
        Ok(Self {
            artifact: build.artifact,
            polygons: build.polygons,
            html,
        })
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LayerHit {
    kind: PolygonKind,
    layer: String,
    #[serde(flatten)]
    unit: PolygonMatch,
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    target: Option<SearchTarget>,
    matches: Vec<SearchEntry>,
}

const MAX_SEARCH_MATCHES: usize = 20;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/artifact", get(artifact_handler))
        .route("/api/query", get(query_handler))
        .route("/api/search", get(search_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: &AppConfig, build: MapBuild) -> Result<()> {
    let state = Arc::new(AppState::new(build)?);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.html.clone())
}

async fn artifact_handler(State(state): State<Arc<AppState>>) -> Json<MapArtifact> {
    Json(state.artifact.clone())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<LayerHit>>, StatusCode> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(locate_all(&state.polygons, params.lon, params.lat)))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let search = &state.artifact.search;
    Json(SearchResponse {
        target: search.resolve(&params.q),
        matches: search
            .search(&params.q)
            .into_iter()
            .take(MAX_SEARCH_MATCHES)
            .cloned()
            .collect(),
    })
}

/// Containing polygon of every layer at `(lon, lat)`, in layer order.
pub fn locate_all(polygons: &[IndexedLayer], lon: f64, lat: f64) -> Vec<LayerHit> {
    let point = Point::new(lon, lat);
    polygons
        .iter()
        .filter_map(|layer| {
            layer.locate(&point).map(|feature| LayerHit {
                kind: layer.kind(),
                layer: layer.kind().layer_name().to_string(),
                unit: feature.identity(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::tests::square;
    use crate::pipeline::build_with_sources;
    use crate::types::PolygonLayer;

    fn state() -> AppState {
        let polygons = vec![
            PolygonLayer::new(
                PolygonKind::AssessmentUnit,
                vec![square("UT-AU-001", "Jordan River-1", -112.0, 40.0, 1.0)],
            ),
            PolygonLayer::new(
                PolygonKind::BeneficialUse,
                vec![square("BU-1", "1C 2B 3B 4", -111.8, 40.2, 1.0)],
            ),
        ];
        let build = build_with_sources(&AppConfig::default(), polygons, &[]).unwrap();
        AppState::new(build).unwrap()
    }

    #[test]
    fn test_locate_all_reports_each_layer() {
        let state = state();

        let hits = locate_all(&state.polygons, -111.5, 40.5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].unit.id, "UT-AU-001");
        assert_eq!(hits[1].kind, PolygonKind::BeneficialUse);
        assert_eq!(hits[1].layer, "Beneficial uses");

        assert_eq!(locate_all(&state.polygons, -111.9, 40.1).len(), 1);
        assert!(locate_all(&state.polygons, -100.0, 30.0).is_empty());
    }

    #[test]
    fn test_hit_serializes_flat() {
        let state = state();
        let hits = locate_all(&state.polygons, -111.9, 40.1);
        let json = serde_json::to_value(&hits).unwrap();
        assert_eq!(json[0]["kind"], "assessment_unit");
        assert_eq!(json[0]["id"], "UT-AU-001");
        assert_eq!(json[0]["name"], "Jordan River-1");
    }

    #[tokio::test]
    async fn test_handlers() {
        let state = Arc::new(state());

        let page = index_handler(State(state.clone())).await;
        assert!(page.0.contains("map-data"));

        let result = query_handler(
            State(state.clone()),
            Query(QueryParams { lat: 95.0, lon: 0.0 }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);

        let Json(found) = search_handler(
            State(state.clone()),
            Query(SearchParams {
                q: "jordan".to_string(),
            }),
        )
        .await;
        assert_eq!(found.matches.len(), 1);
        assert_eq!(found.target.unwrap().layer, "Assessment unit centroids");
    }
}
