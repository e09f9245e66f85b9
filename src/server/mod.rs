use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time};
use tracing::{info, warn};

use crate::{
    item::ItemSummary,
    protocol::{Entry, HarFile, NavigationEvent, WebSocketFrame},
    search::SearchState,
    state::LogStore,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Clone)]
struct HttpState {
    store: Arc<LogStore>,
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            if tx.send(()).is_err() {
                warn!("server shutdown signal receiver dropped");
            }
        }

        let mut join_handle = match self.join_handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        tokio::select! {
            join_result = &mut join_handle => match join_result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(ServerError::Io(error)),
                Err(error) => Err(ServerError::Join(error)),
            },
            _ = time::sleep(Duration::from_secs(2)) => {
                warn!("HTTP server shutdown timed out; aborting");
                join_handle.abort();
                Ok(())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn spawn(store: Arc<LogStore>, config: ServerConfig) -> Result<ServerHandle, ServerError> {
    let listener = TcpListener::bind(config.bind_addr).await?;

    let router = Router::new()
        .route("/network", post(record_network))
        .route("/cached", post(cache_network))
        .route("/pending", post(announce_pending))
        .route("/items", post(add_item).get(list_items))
        .route("/websocket", post(add_websocket))
        .route("/content", post(add_content))
        .route("/navigated", post(navigated))
        .route("/log", get(export_log).post(import_log).delete(clear_log))
        .route("/profiles", get(list_profiles))
        .with_state(HttpState { store });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let addr = listener.local_addr()?;

    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });

    let join_handle = tokio::spawn(async move {
        if let Err(error) = server.await {
            warn!(?error, "HTTP server terminated with error");
            Err(error)
        } else {
            Ok(())
        }
    });

    info!(%addr, "HTTP server listening");

    Ok(ServerHandle {
        addr,
        shutdown: Some(shutdown_tx),
        join_handle: Some(join_handle),
    })
}

fn recorded(id: Option<uuid::Uuid>) -> (StatusCode, Json<Value>) {
    let body = match id {
        Some(id) => json!({ "recorded": true, "item_id": id }),
        None => json!({ "recorded": false }),
    };
    (StatusCode::ACCEPTED, Json(body))
}

async fn record_network(
    State(state): State<HttpState>,
    Json(entry): Json<Entry>,
) -> (StatusCode, Json<Value>) {
    recorded(state.store.record_network(entry).await)
}

async fn cache_network(
    State(state): State<HttpState>,
    Json(entry): Json<Entry>,
) -> (StatusCode, Json<Value>) {
    let queued = state.store.cache_network(entry).await;
    (StatusCode::ACCEPTED, Json(json!({ "queued": queued })))
}

/// Raw body so that malformed announcements are dropped by the store rather
/// than rejected by the extractor.
async fn announce_pending(State(state): State<HttpState>, body: String) -> (StatusCode, Json<Value>) {
    recorded(state.store.announce_pending(&body).await)
}

async fn add_item(State(state): State<HttpState>, body: String) -> (StatusCode, Json<Value>) {
    recorded(state.store.add_item_json(&body).await)
}

async fn add_websocket(
    State(state): State<HttpState>,
    Json(frame): Json<WebSocketFrame>,
) -> (StatusCode, Json<Value>) {
    recorded(state.store.add_websocket(frame).await)
}

#[derive(Debug, Deserialize)]
struct ContentQuery {
    tag: String,
}

async fn add_content(
    State(state): State<HttpState>,
    Query(query): Query<ContentQuery>,
    Json(content): Json<Value>,
) -> (StatusCode, Json<Value>) {
    recorded(state.store.add_content(&query.tag, content).await)
}

async fn navigated(
    State(state): State<HttpState>,
    Json(event): Json<NavigationEvent>,
) -> StatusCode {
    state.store.navigated(event).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Default, Deserialize)]
struct ItemsQuery {
    search: Option<String>,
    filter: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
    hide_unrelated: Option<bool>,
}

impl ItemsQuery {
    fn search_state(&self) -> SearchState {
        let mut search = SearchState::default();
        search.set_case_sensitive(self.case_sensitive);
        if let Some(hide) = self.hide_unrelated {
            search.set_hide_unrelated(hide);
        }
        if let Some(value) = &self.search {
            search.set_search(value.as_str());
        }
        if let Some(value) = &self.filter {
            search.set_filter(value.as_str());
        }
        search
    }
}

async fn list_items(
    State(state): State<HttpState>,
    Query(query): Query<ItemsQuery>,
) -> Json<Vec<ItemSummary>> {
    let config = query.search_state().config();
    let items = state.store.visible(Some(&config)).await;
    Json(items.iter().map(|item| item.summary()).collect())
}

async fn export_log(State(state): State<HttpState>) -> Json<HarFile> {
    Json(state.store.export_har().await)
}

async fn import_log(State(state): State<HttpState>, body: String) -> (StatusCode, Json<Value>) {
    match state.store.import_har(&body).await {
        Ok(count) => (StatusCode::OK, Json(json!({ "imported": count }))),
        Err(err) => {
            warn!(?err, "rejected HAR import");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}

async fn list_profiles(State(state): State<HttpState>) -> Json<Vec<&'static str>> {
    Json(state.store.profiles().names())
}

async fn clear_log(State(state): State<HttpState>) -> StatusCode {
    state.store.clear().await;
    StatusCode::NO_CONTENT
}
