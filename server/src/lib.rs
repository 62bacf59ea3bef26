//! HTTP surface: run control, single-page reindex, search and statistics.

pub mod search;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sitesearch_core::{model, SiteStatus, Store};
use sitesearch_crawler::{CrawlConfig, CrawlService, SiteConfig};
use sitesearch_indexer::{FetchConfig, PageIndexer};
use crate::search::{SearchEngine, SearchResponse};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub crawler: Arc<CrawlService>,
    pub indexer: Arc<PageIndexer>,
    pub search: Arc<SearchEngine>,
    pub fetch: FetchConfig,
}

pub fn build_app(store: Arc<Store>, config: CrawlConfig, sites: Vec<SiteConfig>) -> Router {
    let indexer = Arc::new(PageIndexer::new(store.clone()));
    let crawler = Arc::new(CrawlService::new(
        store.clone(),
        indexer.clone(),
        config.clone(),
        sites,
    ));
    let search = Arc::new(SearchEngine::new(store.clone()));
    let fetch = FetchConfig {
        user_agent: config.user_agent.clone(),
        referrer: config.referrer.clone(),
        timeout: config.timeout,
    };
    let state = AppState {
        store,
        crawler,
        indexer,
        search,
        fetch,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/startIndexing", get(start_indexing))
        .route("/api/stopIndexing", get(stop_indexing))
        .route("/api/indexPage", post(index_page))
        .route("/api/search", get(search_handler))
        .route("/api/statistics", get(statistics))
        .with_state(state)
        .layer(cors)
}

#[derive(Serialize)]
struct ControlResponse {
    result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ControlResponse {
    fn ok() -> Self {
        Self {
            result: true,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            result: false,
            error: Some(message.into()),
        }
    }
}

async fn start_indexing(State(state): State<AppState>) -> (StatusCode, Json<ControlResponse>) {
    if state.crawler.start_run() {
        (StatusCode::OK, Json(ControlResponse::ok()))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ControlResponse::err("Indexing is already running")),
        )
    }
}

async fn stop_indexing(State(state): State<AppState>) -> (StatusCode, Json<ControlResponse>) {
    if state.crawler.stop_run() {
        (StatusCode::OK, Json(ControlResponse::ok()))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ControlResponse::err("Indexing is not running")),
        )
    }
}

#[derive(Deserialize)]
struct IndexPageParams {
    url: String,
}

/// Reindexes one URL against its configured site, bypassing link expansion.
async fn index_page(
    State(state): State<AppState>,
    Query(params): Query<IndexPageParams>,
) -> (StatusCode, Json<ControlResponse>) {
    let url = params.url.trim();
    let Some(cfg) = state
        .crawler
        .sites()
        .iter()
        .find(|s| url.starts_with(s.root_url()))
        .cloned()
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ControlResponse::err("Page outside of configured sites")),
        );
    };

    let site = state.store.site_by_url(&cfg.url).unwrap_or_else(|| {
        state
            .store
            .write()
            .create_site(&cfg.url, &cfg.name, SiteStatus::Indexing)
    });

    match state.indexer.fetch_and_index(&site, url, &state.fetch).await {
        Ok(()) => {
            if let Err(e) = state.store.save() {
                error!(error = %e, "failed to persist index snapshot");
            }
            (StatusCode::OK, Json(ControlResponse::ok()))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ControlResponse::err(format!("Indexing error: {e}"))),
        ),
    }
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    site: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let response = state.search.search(
        &params.query,
        params.site.as_deref(),
        params.offset,
        params.limit,
    );
    let status = if response.result {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(response))
}

#[derive(Serialize)]
struct StatisticsResponse {
    result: bool,
    statistics: Statistics,
}

#[derive(Serialize)]
struct Statistics {
    total: TotalStatistics,
    detailed: Vec<SiteStatistics>,
}

#[derive(Serialize)]
struct TotalStatistics {
    sites: usize,
    pages: usize,
    lemmas: usize,
    indexing: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteStatistics {
    url: String,
    name: String,
    status: SiteStatus,
    status_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    pages: usize,
    lemmas: usize,
}

async fn statistics(State(state): State<AppState>) -> Json<StatisticsResponse> {
    let txn = state.store.read();
    let detailed: Vec<SiteStatistics> = txn
        .sites()
        .into_iter()
        .map(|site| SiteStatistics {
            pages: txn.count_pages(site.id),
            lemmas: txn.count_lemmas(site.id),
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: model::format_ts(site.status_time),
            error: site.last_error,
        })
        .collect();
    let (sites, pages, lemmas, _postings) = txn.total_counts();
    drop(txn);

    Json(StatisticsResponse {
        result: true,
        statistics: Statistics {
            total: TotalStatistics {
                sites,
                pages,
                lemmas,
                indexing: state.crawler.is_running(),
            },
            detailed,
        },
    })
}
