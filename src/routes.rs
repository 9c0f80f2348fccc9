use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::store::{ActivityStore, BookmarkEntry, HistoryEntry};
use crate::upstream::UpstreamClient;
use crate::views;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub store: Arc<Mutex<ActivityStore>>,
}

impl AppState {
    /// Runs `f` with the store locked. A poisoned lock is logged and skipped;
    /// activity data is convenience state and never worth failing a request.
    fn with_store<R>(&self, f: impl FnOnce(&mut ActivityStore) -> R) -> Option<R> {
        match self.store.lock() {
            Ok(mut store) => Some(f(&mut store)),
            Err(_) => {
                warn!("activity store lock poisoned, skipping");
                None
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/schedule", get(schedule))
        .route("/search", get(search))
        .route("/genre/{slug}", get(genre))
        .route("/library", get(library))
        .route("/detail/{slug}", get(detail))
        .route("/watch/{slug}", get(watch))
        .route("/get-stream/{server_id}", get(get_stream))
        .route("/batch/{slug}", get(batch))
        .route("/history", get(history))
        .route("/history/clear", post(clear_history))
        .route("/bookmark", get(bookmark))
        .route("/bookmark/toggle", post(toggle_bookmark))
        .route("/bookmark/clear", post(clear_bookmarks))
        .fallback(not_found)
        .with_state(state)
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct WatchQuery {
    poster: Option<String>,
}

#[derive(Deserialize)]
struct BookmarkForm {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    poster: String,
    #[serde(default)]
    link: String,
    back: Option<String>,
}

async fn index(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Html<String> {
    let page = query.page.unwrap_or(1).max(1);
    match state.upstream.home(page).await {
        Ok(home) => Html(views::index(&home.ongoing, &home.completed, page, None)),
        Err(err) => {
            warn!("home fetch failed: {err:#}");
            Html(views::index(
                &Value::Null,
                &Value::Null,
                page,
                Some("Couldn't connect to the upstream API."),
            ))
        }
    }
}

async fn schedule(State(state): State<AppState>) -> Html<String> {
    let schedule = state.upstream.schedule().await;
    Html(views::schedule(schedule.as_ref()))
}

async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let Some(q) = query.q.filter(|q| !q.trim().is_empty()) else {
        return Redirect::to("/").into_response();
    };
    let results = state.upstream.search(&q).await;
    Html(views::search(results.as_ref(), q.trim())).into_response()
}

async fn genre(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Html<String> {
    let page = query.page.unwrap_or(1).max(1);
    let results = state.upstream.genre(&slug, page).await;
    Html(views::genre(results.as_ref(), &slug, page))
}

async fn library(State(state): State<AppState>) -> Html<String> {
    let list = state.upstream.library().await;
    Html(views::library(list.as_ref()))
}

async fn detail(State(state): State<AppState>, Path(slug): Path<String>) -> Html<String> {
    let anime = state.upstream.detail(&slug).await;
    let bookmarked = state
        .with_store(|store| store.is_bookmarked(&slug))
        .unwrap_or(false);
    Html(views::detail(anime.as_ref(), &slug, bookmarked))
}

async fn watch(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<WatchQuery>,
) -> Html<String> {
    let video = state.upstream.episode(&slug).await;
    if let Some(video) = &video {
        let title = video
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&slug)
            .to_string();
        let entry = HistoryEntry {
            id: slug.clone(),
            title,
            poster: query.poster.unwrap_or_default(),
            link: format!("/watch/{slug}"),
            watched_at: Utc::now(),
        };
        state.with_store(|store| store.record_watch(entry));
    }
    Html(views::watch(video.as_ref(), &slug))
}

/// Raw JSON passthrough for the quality-switch links: whatever the upstream
/// yields, `null` included, goes back verbatim.
async fn get_stream(State(state): State<AppState>, Path(server_id): Path<String>) -> Json<Value> {
    let stream = state.upstream.stream_server(&server_id).await;
    Json(stream.unwrap_or(Value::Null))
}

async fn batch(State(state): State<AppState>, Path(slug): Path<String>) -> Html<String> {
    let batch = state.upstream.batch(&slug).await;
    Html(views::batch(batch.as_ref(), &slug))
}

async fn history(State(state): State<AppState>) -> Html<String> {
    let entries = state
        .with_store(|store| store.list_history())
        .unwrap_or_default();
    Html(views::history(&entries))
}

async fn clear_history(State(state): State<AppState>) -> Redirect {
    state.with_store(|store| store.clear_history());
    Redirect::to("/history")
}

async fn bookmark(State(state): State<AppState>) -> Html<String> {
    let entries = state
        .with_store(|store| store.list_bookmarks())
        .unwrap_or_default();
    Html(views::bookmark(&entries))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    Form(form): Form<BookmarkForm>,
) -> Redirect {
    // Only redirect within the site.
    let back = form
        .back
        .clone()
        .filter(|back| back.starts_with('/') && !back.starts_with("//"))
        .unwrap_or_else(|| "/bookmark".to_string());
    let entry = BookmarkEntry {
        id: form.id,
        title: form.title,
        poster: form.poster,
        link: form.link,
        bookmarked_at: Utc::now(),
    };
    state.with_store(|store| store.toggle_bookmark(entry));
    Redirect::to(&back)
}

async fn clear_bookmarks(State(state): State<AppState>) -> Redirect {
    state.with_store(|store| store.clear_bookmarks());
    Redirect::to("/bookmark")
}

async fn not_found() -> (StatusCode, Html<String>) {
    (StatusCode::NOT_FOUND, Html(views::not_found()))
}
