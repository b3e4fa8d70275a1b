use crate::config::GmapConfig;
use crate::error::{GmapError, Result};
use crate::gviz::{Column, DataTable};
use crate::pages::Pages;
use crate::rate::Direction;
use crate::store::{BandwidthStore, NewReport};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

const ACK_BODY: &str = "Got it.\n";

#[derive(Clone)]
pub struct AppState {
    config: Arc<GmapConfig>,
    store: Arc<BandwidthStore>,
    pages: Arc<Pages>,
}

impl AppState {
    pub fn new(config: Arc<GmapConfig>, store: Arc<BandwidthStore>) -> Result<Self> {
        Ok(Self {
            config,
            store,
            pages: Arc::new(Pages::new()?),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(map_page))
        .route("/health", get(health_check))
        .route("/bw/{link}/{time}/{rx}/{tx}/", get(ingest).post(ingest))
        .route("/xhr_bw/{links}/", get(xhr_bw))
        .route("/sparkline/{link}/", get(sparkline_page))
        .route("/xhr_sparkline/{direction}/{link}/", get(xhr_sparkline))
        .route("/xhr_traffic/{link}/", get(xhr_traffic))
        .route("/json/{file}/", get(json_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let listen_addr = state.config.listen_addr.clone();
    let app = router(state);

    info!("Starting HTTP server on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn map_page(State(state): State<AppState>) -> Result<Html<String>> {
    Ok(Html(state.pages.render_map(state.config.bw_update_interval_secs)?))
}

/// Unauthenticated counter push from a link agent.
#[instrument(skip(state))]
async fn ingest(
    State(state): State<AppState>,
    Path((link, time, rx, tx)): Path<(i64, f64, i64, i64)>,
) -> Result<&'static str> {
    // Counters and sender time are non-negative decimals
    if !time.is_finite() || time < 0.0 {
        return Err(GmapError::InvalidRequest(format!("invalid time: {}", time)));
    }
    if rx < 0 || tx < 0 {
        return Err(GmapError::InvalidRequest(format!("negative counter: rx={} tx={}", rx, tx)));
    }

    let stored = state.store.record(NewReport { link, time, rx, tx }).await?;
    debug!("Report for link {} stored: {}", link, stored);
    Ok(ACK_BODY)
}

fn parse_link(segment: &str) -> Result<i64> {
    segment
        .parse()
        .map_err(|_| GmapError::InvalidRequest(format!("invalid link id: {}", segment)))
}

/// Current rate of one link, or of several when joined with `+`.
async fn xhr_bw(State(state): State<AppState>, Path(links): Path<String>) -> Result<Response> {
    if !links.contains('+') {
        let rate = state.store.rate(parse_link(&links)?).await?;
        return Ok(Json(rate).into_response());
    }

    let links = links
        .split('+')
        .map(parse_link)
        .collect::<Result<Vec<_>>>()?;
    let mut rates = Vec::with_capacity(links.len());
    for link in links {
        rates.push(state.store.rate(link).await?);
    }
    Ok(Json(rates).into_response())
}

async fn rates_table(state: &AppState, link: i64, directions: &[Direction]) -> Result<DataTable> {
    let window = state.config.sparkline_window;
    let mut series = Vec::with_capacity(directions.len());
    for direction in directions {
        series.push(state.store.rates(*direction, link, window).await?);
    }

    let columns = directions
        .iter()
        .map(|d| Column::number(d.as_str(), d.label()))
        .collect();
    let mut table = DataTable::new(columns);
    let len = series.first().map_or(0, Vec::len);
    for i in 0..len {
        table.push_row(series.iter().map(|values| values[i]));
    }
    Ok(table)
}

async fn sparkline_page(
    State(state): State<AppState>,
    Path(link): Path<i64>,
) -> Result<Html<String>> {
    let table = rates_table(&state, link, &[Direction::Rx, Direction::Tx]).await?;
    Ok(Html(state.pages.render_sparkline(link, &table)?))
}

/// Windowed rates of one direction; only `rx` and `tx` exist.
async fn xhr_sparkline(
    State(state): State<AppState>,
    Path((direction, link)): Path<(String, i64)>,
) -> Result<Json<DataTable>> {
    let direction: Direction = direction.parse().map_err(GmapError::NotFound)?;
    Ok(Json(rates_table(&state, link, &[direction]).await?))
}

/// Raw counter history of a link.
async fn xhr_traffic(
    State(state): State<AppState>,
    Path(link): Path<i64>,
) -> Result<Json<DataTable>> {
    let mut table = DataTable::new(vec![
        Column::number("rx", "Received"),
        Column::number("tx", "Sent"),
    ]);
    for traffic in state.store.traffic(link).await? {
        table.push_row([traffic.rx, traffic.tx]);
    }
    Ok(Json(table))
}

/// Serve `{json_dir}/{file}.json` verbatim.
async fn json_file(State(state): State<AppState>, Path(file): Path<String>) -> Result<Response> {
    let plain_word = !file.is_empty()
        && file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain_word {
        return Err(GmapError::NotFound(file));
    }

    let path = PathBuf::from(&state.config.json_dir).join(format!("{}.json", file));
    let data = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| GmapError::NotFound(format!("{}.json", file)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreSettings;
    use crate::store::tests::temp_store;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        _db_dir: TempDir,
        json_dir: TempDir,
        router: Router,
    }

    async fn test_app() -> TestApp {
        let (db_dir, store) = temp_store(StoreSettings::default()).await;
        let json_dir = TempDir::new().unwrap();
        let config = GmapConfig {
            json_dir: json_dir.path().display().to_string(),
            ..GmapConfig::default()
        };
        let state = AppState::new(Arc::new(config), Arc::new(store)).unwrap();
        TestApp {
            _db_dir: db_dir,
            json_dir,
            router: router(state),
        }
    }

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get_json(router: &Router, uri: &str) -> Value {
        let (status, body) = send(router, Method::GET, uri).await;
        assert_eq!(status, StatusCode::OK, "{}: {}", uri, body);
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn ingest_acknowledges_get_and_post() {
        let app = test_app().await;
        let (status, body) = send(&app.router, Method::GET, "/bw/1/1.0/1/1/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got it.\n");

        let (status, body) = send(&app.router, Method::POST, "/bw/1/2.0/3/3/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got it.\n");

        let rate = get_json(&app.router, "/xhr_bw/1/").await;
        assert_eq!(rate, json!({"rx": 2.0, "tx": 2.0}));
    }

    #[tokio::test]
    async fn empty_report_is_acknowledged_but_dropped() {
        let app = test_app().await;
        send(&app.router, Method::GET, "/bw/1/1.0/1/1/").await;
        let (status, body) = send(&app.router, Method::GET, "/bw/1/2.0/0/0/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Got it.\n");

        let traffic = get_json(&app.router, "/xhr_traffic/1/").await;
        assert_eq!(traffic["rows"], json!([{"c": [{"v": 1}, {"v": 1}]}]));
    }

    #[tokio::test]
    async fn malformed_report_is_rejected() {
        let app = test_app().await;
        let (status, _) = send(&app.router, Method::GET, "/bw/1/soon/1/1/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_finite_time_is_rejected() {
        let app = test_app().await;
        for uri in ["/bw/1/NaN/1/1/", "/bw/1/inf/1/1/", "/bw/1/-1.0/1/1/"] {
            let (status, body) = send(&app.router, Method::GET, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(!body.contains("Database"));
        }
    }

    #[tokio::test]
    async fn negative_counters_are_rejected_and_not_stored() {
        let app = test_app().await;
        let (status, _) = send(&app.router, Method::GET, "/bw/1/1.0/-5/1/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app.router, Method::POST, "/bw/1/1.0/5/-1/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let traffic = get_json(&app.router, "/xhr_traffic/1/").await;
        assert_eq!(traffic["rows"], json!([]));
    }

    #[tokio::test]
    async fn rate_has_rx_and_tx_keys() {
        let app = test_app().await;
        send(&app.router, Method::GET, "/bw/1/1.0/1/1/").await;
        let rate = get_json(&app.router, "/xhr_bw/1/").await;
        assert_eq!(rate, json!({"rx": 0.0, "tx": 0.0}));
    }

    #[tokio::test]
    async fn multi_link_query_answers_a_list() {
        let app = test_app().await;
        for uri in ["/bw/1/1.0/1/1/", "/bw/1/2.0/2/2/", "/bw/3/1.0/2/10/", "/bw/3/3.0/4/20/"] {
            send(&app.router, Method::GET, uri).await;
        }

        let rates = get_json(&app.router, "/xhr_bw/1+2+3/").await;
        assert_eq!(
            rates,
            json!([
                {"rx": 1.0, "tx": 1.0},
                {"rx": 0.0, "tx": 0.0},
                {"rx": 1.0, "tx": 5.0}
            ])
        );
    }

    #[tokio::test]
    async fn non_numeric_link_is_bad_request() {
        let app = test_app().await;
        let (status, _) = send(&app.router, Method::GET, "/xhr_bw/1+x/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sparkline_series() {
        let app = test_app().await;
        for uri in ["/bw/1/1.0/1/5/", "/bw/1/2.0/10/5/", "/bw/1/3.0/100/5/"] {
            send(&app.router, Method::GET, uri).await;
        }

        let rx = get_json(&app.router, "/xhr_sparkline/rx/1/").await;
        assert_eq!(
            rx,
            json!({
                "cols": [{"id": "rx", "label": "Received", "type": "number"}],
                "rows": [{"c": [{"v": 9.0}]}, {"c": [{"v": 90.0}]}]
            })
        );

        let tx = get_json(&app.router, "/xhr_sparkline/tx/1/").await;
        assert_eq!(tx["cols"][0]["id"], "tx");
        assert_eq!(tx["rows"], json!([{"c": [{"v": 0.0}]}, {"c": [{"v": 0.0}]}]));

        let (status, page) = send(&app.router, Method::GET, "/sparkline/1/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("new google.visualization.DataTable("));
        assert!(page.contains(r#"{"c":[{"v":9.0},{"v":0.0}]}"#));
    }

    #[tokio::test]
    async fn unknown_sparkline_direction_is_not_found() {
        let app = test_app().await;
        let (status, _) = send(&app.router, Method::GET, "/xhr_sparkline/both/1/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn json_passthrough() {
        let app = test_app().await;
        std::fs::write(app.json_dir.path().join("links.json"), r#"[{"id": 1}]"#).unwrap();

        let request = Request::builder()
            .uri("/json/links/")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"[{"id": 1}]"#);
    }

    #[tokio::test]
    async fn missing_json_file_is_not_found() {
        let app = test_app().await;
        let (status, _) = send(&app.router, Method::GET, "/json/nothing/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn json_file_name_must_be_a_word() {
        let app = test_app().await;
        std::fs::write(app.json_dir.path().join("a.b.json"), "{}").unwrap();
        let (status, _) = send(&app.router, Method::GET, "/json/a.b/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app.router, Method::GET, "/json/..%2Fsecret/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn map_page_and_health() {
        let app = test_app().await;
        let (status, page) = send(&app.router, Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("const UPDATE_INTERVAL_MS = 5000;"));

        let health = get_json(&app.router, "/health").await;
        assert_eq!(health["status"], "healthy");
    }
}
