//! HTTP server with incremental regeneration
//!
//! Routes are materialized on demand and kept in a [`RegenerationCache`].
//! Stale entries keep being served while a single background task rebuilds
//! them; requests carrying a preview cookie always bypass the cache.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::cache::{Lookup, RebuildClaim, RegenerationCache};
use crate::comments::CommentThread;
use crate::config::CommentsConfig;
use crate::helpers::post_path;
use crate::pages::{DetailOutcome, Listing, Materialized, Materializer};
use crate::source::{Cursor, PreviewRef, SourceError};
use crate::view::PostDetail;
use crate::Blog;

/// Cookie holding the preview ref
pub const PREVIEW_COOKIE: &str = "spacetravelling.preview";

/// Listing pages kept at once; cursors come from clients
const LISTING_CACHE_CAPACITY: usize = 256;

/// Server state
pub struct ServerState {
    pages: Materializer,
    comments: CommentsConfig,
    listing_revalidate: Option<Duration>,
    listings: Arc<RegenerationCache<Listing>>,
    posts: Arc<RegenerationCache<Materialized<PostDetail>>>,
}

impl ServerState {
    pub fn new(blog: &Blog) -> Result<Self> {
        Ok(Self::with_materializer(blog.materializer()?, blog))
    }

    pub fn with_materializer(pages: Materializer, blog: &Blog) -> Self {
        Self {
            pages,
            comments: blog.config.comments.clone(),
            listing_revalidate: blog.config.listing_revalidate(),
            listings: Arc::new(RegenerationCache::with_capacity(LISTING_CACHE_CAPACITY)),
            posts: Arc::new(RegenerationCache::new()),
        }
    }
}

/// Build the router
pub fn app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/page", get(page_handler))
        .route("/post/:slug", get(post_handler))
        .route("/api/preview", get(preview_handler))
        .route("/api/exit-preview", get(exit_preview_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server
pub async fn start(blog: &Blog, ip: &str, port: u16) -> Result<()> {
    let state = Arc::new(ServerState::new(blog)?);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    println!("Server running at http://{}:{}", ip, port);
    println!("Press Ctrl+C to stop.");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// What a build produced for a route
enum Built<T> {
    Page(T, Option<Duration>),
    Missing,
}

/// Serve `route` from the cache, building it inline when absent
///
/// `Ok(None)` means the route has no content and nothing is cached. A stale
/// hit returns the cached value right away; the caller holding the rebuild
/// claim spawns the rebuild, and the claim is released unless the rebuild
/// completes.
async fn serve_cached<T, F, Fut>(
    cache: &Arc<RegenerationCache<T>>,
    route: String,
    build: F,
) -> Result<Option<Arc<T>>, SourceError>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Built<T>, SourceError>> + Send + 'static,
{
    match cache.lookup(&route) {
        Lookup::Fresh(value) => Ok(Some(value)),
        Lookup::Stale { value, rebuild } => {
            if rebuild {
                let claim = RebuildClaim::new(cache.clone(), route);
                let fut = build();
                tokio::spawn(async move {
                    match fut.await {
                        Ok(Built::Page(page, revalidate)) => {
                            tracing::info!("Regenerated {}", claim.route());
                            claim.store(page, revalidate);
                        }
                        Ok(Built::Missing) => claim.invalidate(),
                        Err(e) => tracing::warn!(
                            "Regenerating {} failed, keeping stale copy: {}",
                            claim.route(),
                            e
                        ),
                    }
                });
            }
            Ok(Some(value))
        }
        Lookup::Missing => match build().await? {
            Built::Page(page, revalidate) => Ok(Some(cache.store(&route, page, revalidate))),
            Built::Missing => Ok(None),
        },
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    after: Option<String>,
}

async fn home_handler(State(state): State<Arc<ServerState>>) -> Response {
    listing_response(state, None).await
}

async fn page_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let after = query.after.filter(|a| !a.is_empty()).map(Cursor::new);
    listing_response(state, after).await
}

async fn listing_response(state: Arc<ServerState>, after: Option<Cursor>) -> Response {
    let route = match &after {
        Some(cursor) => format!("/page?after={}", cursor),
        None => "/".to_string(),
    };

    let pages = state.pages.clone();
    let revalidate = state.listing_revalidate;
    let build = move || async move {
        let continuation = after.is_some();
        let listing = pages.build_listing(pages.per_page(), after).await?;
        // A cursor that leads nowhere is not a page
        if continuation && listing.results.is_empty() {
            return Ok::<_, SourceError>(Built::Missing);
        }
        Ok::<_, SourceError>(Built::Page(listing, revalidate))
    };

    match serve_cached(&state.listings, route, build).await {
        Ok(Some(listing)) => Json(listing.as_ref()).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Page not found"),
        Err(e) => source_failure(e),
    }
}

/// Detail page plus its comment widget
#[derive(Serialize)]
pub(crate) struct PostResponse<'a> {
    #[serde(flatten)]
    page: &'a Materialized<PostDetail>,
    comments: Option<CommentThread>,
    /// Ready-to-embed widget markup
    comments_html: Option<String>,
}

impl<'a> PostResponse<'a> {
    pub(crate) fn new(page: &'a Materialized<PostDetail>, comments: &CommentsConfig) -> Self {
        let comments = CommentThread::for_post(comments, &page.page.path);
        let comments_html = comments.as_ref().map(CommentThread::to_html);
        Self {
            page,
            comments,
            comments_html,
        }
    }
}

async fn post_handler(
    State(state): State<Arc<ServerState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(preview_ref) = preview_from_headers(&headers) {
        tracing::debug!("Preview request for {}", slug);
        return match state.pages.build_detail(&slug, Some(&preview_ref)).await {
            Ok(DetailOutcome::Found(page)) => post_json(&state, &page),
            Ok(DetailOutcome::NotFound) => error_response(StatusCode::NOT_FOUND, "Post not found"),
            // The ref expired or never existed; leave preview mode
            Err(e @ SourceError::InvalidQuery(_)) => {
                ([(header::SET_COOKIE, expired_preview_cookie())], source_failure(e)).into_response()
            }
            Err(e) => source_failure(e),
        };
    }

    let pages = state.pages.clone();
    let uid = slug.clone();
    let build = move || async move {
        Ok::<_, SourceError>(match pages.build_detail(&uid, None).await? {
            DetailOutcome::Found(page) => {
                let revalidate = page.revalidate;
                Built::Page(page, revalidate)
            }
            DetailOutcome::NotFound => Built::Missing,
        })
    };

    match serve_cached(&state.posts, post_path(&slug), build).await {
        Ok(Some(page)) => post_json(&state, &page),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => source_failure(e),
    }
}

fn post_json(state: &ServerState, page: &Materialized<PostDetail>) -> Response {
    Json(PostResponse::new(page, &state.comments)).into_response()
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    token: Option<String>,
    slug: Option<String>,
}

/// Enter preview mode and land on the previewed post
async fn preview_handler(Query(query): Query<PreviewQuery>) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing preview token");
    };

    let location = match query.slug.as_deref() {
        Some(slug) if !slug.is_empty() => post_path(slug),
        _ => "/".to_string(),
    };
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        PREVIEW_COOKIE,
        utf8_percent_encode(&token, NON_ALPHANUMERIC)
    );

    (
        [(header::SET_COOKIE, cookie)],
        Redirect::temporary(&location),
    )
        .into_response()
}

/// Leave preview mode
async fn exit_preview_handler() -> Response {
    (
        [(header::SET_COOKIE, expired_preview_cookie())],
        Redirect::temporary("/"),
    )
        .into_response()
}

fn expired_preview_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", PREVIEW_COOKIE)
}

/// Preview ref carried by the request cookies, if any
fn preview_from_headers(headers: &HeaderMap) -> Option<PreviewRef> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == PREVIEW_COOKIE)
        .and_then(|(_, value)| percent_decode_str(value).decode_utf8().ok())
        .filter(|value| !value.is_empty())
        .map(|value| PreviewRef::new(value.into_owned()))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

fn source_failure(e: SourceError) -> Response {
    match e {
        // Expired preview refs, bad cursors: the request is wrong, not the source
        SourceError::InvalidQuery(reason) => {
            tracing::debug!("Rejected query: {}", reason);
            error_response(StatusCode::BAD_REQUEST, "Invalid query or preview ref")
        }
        e => {
            tracing::error!("Content source failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "Content source unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ContentSource, MemorySource, Predicate, QueryOptions, QueryResponse};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn post(id: &str, uid: &str, date: &str) -> Value {
        json!({
            "id": id,
            "uid": uid,
            "type": "post",
            "first_publication_date": date,
            "last_publication_date": date,
            "data": {
                "title": format!("Title {}", uid),
                "subtitle": "sub",
                "author": "Ada",
                "content": [{ "heading": "Intro", "body": [{ "type": "paragraph", "text": "body", "spans": [] }] }]
            }
        })
    }

    fn posts() -> Vec<Value> {
        vec![
            post("A", "alpha", "2021-01-01T00:00:00+0000"),
            post("B", "beta", "2021-02-01T00:00:00+0000"),
            post("C", "gamma", "2021-03-01T00:00:00+0000"),
        ]
    }

    fn blog() -> Blog {
        let mut blog = Blog::with_config(".", Default::default());
        blog.config.comments.repo = "someone/blog-comments".to_string();
        blog
    }

    fn router_with(source: impl ContentSource + 'static, blog: &Blog) -> Router {
        let pages = Materializer::new(Arc::new(source), &blog.config);
        app(Arc::new(ServerState::with_materializer(pages, blog)))
    }

    fn router() -> Router {
        let mut drafts = post("B", "beta", "2021-02-01T00:00:00+0000");
        drafts["data"]["title"] = json!("Beta (draft)");
        router_with(MemorySource::new(posts()).with_preview("tok/1", vec![drafts]), &blog())
    }

    async fn fetch(router: Router, uri: &str, cookie: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response = router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_listing_routes() {
        let (status, _, body) = fetch(router(), "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        let cursor = body["next_page"].as_str().unwrap().to_string();

        let (status, _, body) = fetch(router(), &format!("/page?after={}", cursor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["uid"], "gamma");
        assert!(body["next_page"].is_null());
    }

    #[tokio::test]
    async fn test_post_route() {
        let (status, _, body) = fetch(router(), "/post/beta", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"]["title"], "Title beta");
        assert_eq!(body["page"]["previous_post"]["uid"], "alpha");
        assert_eq!(body["page"]["next_post"]["uid"], "gamma");
        assert_eq!(body["revalidate"], 86_400);
        assert_eq!(body["comments"]["identifier"], "/post/beta");
        assert!(body["comments_html"]
            .as_str()
            .unwrap()
            .contains(r#"repo="someone/blog-comments""#));
    }

    #[tokio::test]
    async fn test_unknown_post_is_404() {
        let (status, _, body) = fetch(router(), "/post/pluto", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Post not found");
    }

    #[tokio::test]
    async fn test_preview_cookie_flow() {
        let (status, headers, _) = fetch(router(), "/api/preview?token=tok%2F1&slug=beta", None).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(headers[header::LOCATION], "/post/beta");
        let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        assert_eq!(cookie, format!("{}=tok%2F1", PREVIEW_COOKIE));

        let (status, _, body) = fetch(router(), "/post/beta", Some(&cookie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"]["title"], "Beta (draft)");
        assert_eq!(body["page"]["preview"], true);

        let (status, headers, _) = fetch(router(), "/api/exit-preview", None).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(headers[header::LOCATION], "/");
        assert!(headers[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_unknown_cursor_is_404_and_not_cached() {
        let state = Arc::new(ServerState::with_materializer(
            Materializer::new(Arc::new(MemorySource::new(posts())), &blog().config),
            &blog(),
        ));

        for i in 0..5 {
            let uri = format!("/page?after=junk{}", i);
            let (status, _, body) = fetch(app(state.clone()), &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"], "Page not found");
        }
        assert!(state.listings.is_empty());

        let (status, _, _) = fetch(app(state.clone()), "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.listings.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_preview_ref_is_400_and_leaves_preview() {
        let cookie = format!("{}=expired", PREVIEW_COOKIE);
        let (status, headers, body) = fetch(router(), "/post/beta", Some(&cookie)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid query or preview ref");
        assert!(headers[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_preview_requires_token() {
        let (status, _, _) = fetch(router(), "/api/preview?slug=beta", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_preview_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {}=abc%3D%3D", PREVIEW_COOKIE).parse().unwrap(),
        );
        assert_eq!(preview_from_headers(&headers).unwrap().as_str(), "abc==");
        assert!(preview_from_headers(&HeaderMap::new()).is_none());
    }

    /// Fails every query after the first `ok_calls`
    struct FlakySource {
        inner: MemorySource,
        ok_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for FlakySource {
        async fn query(
            &self,
            predicate: &Predicate,
            options: &QueryOptions,
        ) -> Result<QueryResponse, SourceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
                return Err(SourceError::Unavailable("connection reset".to_string()));
            }
            self.inner.query(predicate, options).await
        }
    }

    #[tokio::test]
    async fn test_source_down_without_stale_copy_is_502() {
        let source = FlakySource {
            inner: MemorySource::new(posts()),
            ok_calls: 0,
            calls: AtomicUsize::new(0),
        };
        let (status, _, body) = fetch(router_with(source, &blog()), "/post/beta", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Content source unavailable");
    }

    #[tokio::test]
    async fn test_stale_copy_survives_failed_rebuild() {
        let mut blog = blog();
        blog.config.revalidate_secs = 0;
        // One pivot lookup plus two neighbor queries succeed, then the source dies
        let source = FlakySource {
            inner: MemorySource::new(posts()),
            ok_calls: 3,
            calls: AtomicUsize::new(0),
        };
        let router = router_with(source, &blog);

        let (status, _, first) = fetch(router.clone(), "/post/beta", None).await;
        assert_eq!(status, StatusCode::OK);

        for _ in 0..3 {
            let (status, _, body) = fetch(router.clone(), "/post/beta", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, first);
            tokio::task::yield_now().await;
        }
    }
}
