use crate::config::AppConfig;
use crate::dispatch::{ControllerHandle, Event, Outcome};
use crate::types::{DecadeFilter, View};
use anyhow::{anyhow, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub controller: ControllerHandle,
}

#[derive(Deserialize)]
pub struct HoverParams {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
pub struct BoundsParams {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    fn bad_request(error: anyhow::Error) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, error = %self.error, "Request failed");
        (self.status, Json(serde_json::json!({ "error": self.error.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Outcome>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/decades", get(decades_handler))
        .route("/api/state", get(state_handler))
        .route("/api/view/:view", post(view_handler))
        .route("/api/filter/:decade", post(filter_handler))
        .route("/api/hover", get(hover_handler))
        .route("/api/hover/leave", post(leave_handler))
        .route("/api/markers", get(markers_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, controller: ControllerHandle) -> Result<()> {
    let state = Arc::new(AppState { controller });

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);

    let app = router(state).fallback_service(ServeDir::new(&config.server.static_dir));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn decades_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    match state.controller.send(Event::Inspect).await? {
        Outcome::Snapshot(snapshot) => Ok(Json(snapshot.decades)),
        other => Err(anyhow!("Unexpected reply to state inspection: {:?}", other).into()),
    }
}

async fn state_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.controller.send(Event::Inspect).await?))
}

async fn view_handler(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
) -> ApiResult {
    let view: View = view.parse().map_err(ApiError::bad_request)?;
    Ok(Json(state.controller.send(Event::ViewSelected(view)).await?))
}

async fn filter_handler(
    State(state): State<Arc<AppState>>,
    Path(decade): Path<String>,
) -> ApiResult {
    let event = Event::FilterChanged(DecadeFilter::from(decade.as_str()));
    let outcome = state.controller.send(event).await.map_err(ApiError::bad_request)?;
    Ok(Json(outcome))
}

async fn hover_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HoverParams>,
) -> ApiResult {
    let event = Event::PointerMoved { x: params.x, y: params.y };
    Ok(Json(state.controller.send(event).await?))
}

async fn leave_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.controller.send(Event::PointerLeft).await?))
}

async fn markers_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoundsParams>,
) -> ApiResult {
    let event = Event::MarkersWithin {
        min: [params.min_lon, params.min_lat],
        max: [params.max_lon, params.max_lat],
    };
    Ok(Json(state.controller.send(event).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_records;
    use crate::dispatch::spawn;
    use crate::view::{Rendered, ViewController};

    const CSV: &str = "\
Neighbourhood,Type,YearOfInstallation,geo_point_2d
Downtown,Mural,1995,\"49.28,-123.12\"
Kitsilano,Mural,2001,\"49.26,-123.16\"
Strathcona,Mural,2001,\"40.0,-74.0\"
";

    fn state() -> Arc<AppState> {
        let config = AppConfig::from_toml("[input]\ndata_csv = \"unused.csv\"\n").unwrap();
        let controller = ViewController::new(&config, load_records(CSV.as_bytes()).unwrap());
        let (controller, _task) = spawn(controller);
        Arc::new(AppState { controller })
    }

    fn bounds(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Query<BoundsParams> {
        Query(BoundsParams { min_lon, min_lat, max_lon, max_lat })
    }

    async fn select(state: &Arc<AppState>, view: &str) -> Outcome {
        let Json(outcome) = view_handler(State(state.clone()), Path(view.to_string()))
            .await
            .ok()
            .unwrap();
        outcome
    }

    #[tokio::test]
    async fn decades_list_starts_with_all() {
        let Json(decades) = decades_handler(State(state())).await.ok().unwrap();
        assert_eq!(decades, vec!["All", "1990s", "2000s"]);
    }

    #[tokio::test]
    async fn unknown_view_is_a_bad_request() {
        let err = view_handler(State(state()), Path("pie".to_string())).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_decade_is_a_bad_request() {
        let err = filter_handler(State(state()), Path("1700s".to_string())).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn selecting_map_returns_markers() {
        let state = state();
        match select(&state, "map").await {
            Outcome::Rendered(Rendered::Map(snapshot)) => assert_eq!(snapshot.marker_count, 3),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn filter_all_restores_full_dataset() {
        let state = state();
        filter_handler(State(state.clone()), Path("1990s".to_string())).await.ok().unwrap();
        let Json(outcome) = filter_handler(State(state.clone()), Path("All".to_string()))
            .await
            .ok()
            .unwrap();
        match outcome {
            Outcome::Rendered(Rendered::Chart { groups, .. }) => assert_eq!(groups.len(), 3),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_reports_view_filter_and_visibility() {
        let state = state();
        select(&state, "map").await;
        filter_handler(State(state.clone()), Path("2000s".to_string())).await.ok().unwrap();

        let Json(outcome) = state_handler(State(state.clone())).await.ok().unwrap();
        match outcome {
            Outcome::Snapshot(snapshot) => {
                assert_eq!(snapshot.state.view, View::Map);
                assert_eq!(snapshot.state.decade, DecadeFilter::from("2000s"));
                assert!(snapshot.display.map_visible);
                assert!(!snapshot.display.chart_visible);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hover_over_bar_returns_tooltip_and_leave_clears_it() {
        let state = state();
        // three equal bars over an 840px plot offset by (100, 40); the first spans x 152.5..362.5
        let params = Query(HoverParams { x: 250.0, y: 300.0 });
        let Json(outcome) = hover_handler(State(state.clone()), params).await.ok().unwrap();
        match outcome {
            Outcome::Tooltip(Some(tooltip)) => {
                assert!(tooltip.html.contains("Downtown"));
                assert_eq!(tooltip.left, 260.0);
                assert_eq!(tooltip.top, 280.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let Json(outcome) = leave_handler(State(state.clone())).await.ok().unwrap();
        assert!(matches!(outcome, Outcome::Tooltip(None)));
        let Json(outcome) = state_handler(State(state.clone())).await.ok().unwrap();
        match outcome {
            Outcome::Snapshot(snapshot) => assert!(snapshot.tooltip.is_none()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hover_while_chart_is_hidden_returns_nothing() {
        let state = state();
        select(&state, "map").await;
        let params = Query(HoverParams { x: 250.0, y: 300.0 });
        let Json(outcome) = hover_handler(State(state.clone()), params).await.ok().unwrap();
        assert!(matches!(outcome, Outcome::Tooltip(None)));
    }

    #[tokio::test]
    async fn markers_are_limited_to_the_bounding_box() {
        let state = state();
        select(&state, "map").await;

        let params = bounds(-124.0, 49.0, -123.0, 50.0);
        let Json(outcome) = markers_handler(State(state.clone()), params).await.ok().unwrap();
        match outcome {
            Outcome::Markers(Some(snapshot)) => assert_eq!(snapshot.marker_count, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn inverted_bounding_box_matches_the_normal_one() {
        let state = state();
        select(&state, "map").await;

        let params = bounds(-123.0, 50.0, -124.0, 49.0);
        let Json(outcome) = markers_handler(State(state.clone()), params).await.ok().unwrap();
        match outcome {
            Outcome::Markers(Some(snapshot)) => assert_eq!(snapshot.marker_count, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn markers_before_map_is_shown_are_null() {
        let Json(outcome) = markers_handler(State(state()), bounds(-180.0, -90.0, 180.0, 90.0))
            .await
            .ok()
            .unwrap();
        assert!(matches!(outcome, Outcome::Markers(None)));
    }
}
