//! HTTP surface of the proxy.
//!
//! ## Routes
//!
//! | Method | Path | Parameters |
//! |---|---|---|
//! | `GET`, `POST` | `/` | query string, body |
//! | `GET`, `POST` | `/{url}` | path segment as `url`, query string, body |
//!
//! Bodies are read as a JSON object (`application/json`) or a urlencoded
//! form (`application/x-www-form-urlencoded`). Anything else contributes no
//! parameters. When a public directory is configured, existing files in it
//! are served before any of the above.
//!
//! ## Responses
//!
//! A successful transform is sent with the MIME type sniffed from its bytes
//! and a long-lived `Cache-Control`. Any failure sends the fallback JPEG with
//! status 200; the cause is only logged.
//!
//! ## Middleware (outermost first)
//!
//! `TraceLayer` → `X-Response-Time` → CORS (permissive) → gzip compression →
//! security headers (`nosniff`, `SAMEORIGIN`, `no-referrer`, if absent).

use crate::fallback::FallbackImage;
use crate::proxy::{ImageProxy, ProxyError};
use crate::request::{self, URL_KEY};
use axum::extract::{Form, FromRequest, Json, Path, Query, Request, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_TYPE, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the handling time of each response.
pub const RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

#[derive(Clone)]
pub struct AppState {
    proxy: ImageProxy,
    fallback: FallbackImage,
    cache_control: HeaderValue,
}

impl AppState {
    pub fn new(proxy: ImageProxy, fallback: FallbackImage, cache_max_age_secs: u64) -> Self {
        let cache_control = HeaderValue::from_str(&format!("public, max-age={cache_max_age_secs}"))
            .unwrap_or_else(|_| HeaderValue::from_static("public"));
        Self {
            proxy,
            fallback,
            cache_control,
        }
    }
}

/// Build the full application: static files (optional), transform routes and
/// the middleware stack.
pub fn router(state: AppState, public_dir: Option<&std::path::Path>) -> Router {
    let transform_routes = Router::new()
        .route("/", get(transform).post(transform))
        .route("/:url", get(transform).post(transform))
        .with_state(state);

    let app = match public_dir {
        Some(dir) => Router::new().fallback_service(
            ServeDir::new(dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(transform_routes),
        ),
        None => transform_routes,
    };

    app.layer(SetResponseHeaderLayer::if_not_present(
        X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ))
    .layer(CompressionLayer::new())
    .layer(CorsLayer::permissive())
    .layer(middleware::from_fn(response_time))
    .layer(TraceLayer::new_for_http())
}

async fn response_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let millis = started.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{millis:.3}ms")) {
        response.headers_mut().insert(RESPONSE_TIME, value);
    }
    response
}

async fn transform(
    State(state): State<AppState>,
    route: Option<Path<String>>,
    query: Option<Query<Vec<(String, String)>>>,
    request: Request,
) -> Response {
    let route: Vec<(String, String)> = route
        .map(|Path(url)| (URL_KEY.to_string(), url))
        .into_iter()
        .collect();
    let query = query.map(|Query(pairs)| pairs).unwrap_or_default();
    let body = body_fields(request).await;

    let result = match request::canonicalize(route, body, query) {
        // Run detached so a client disconnect does not abort the cache write
        Ok(transform_request) => {
            let proxy = state.proxy.clone();
            tokio::spawn(async move { proxy.render(&transform_request).await })
                .await
                .map_err(ProxyError::from)
                .and_then(|rendered| rendered)
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(rendered) => (
            [
                (CONTENT_TYPE, HeaderValue::from_static(rendered.mime)),
                (CACHE_CONTROL, state.cache_control.clone()),
            ],
            rendered.bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "serving fallback image");
            (
                [(CONTENT_TYPE, HeaderValue::from_static(FallbackImage::MIME))],
                state.fallback.bytes(),
            )
                .into_response()
        }
    }
}

/// Parameters carried in the request body. Unparseable bodies contribute none.
async fn body_fields(request: Request) -> Vec<(String, String)> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        match Json::<serde_json::Map<String, serde_json::Value>>::from_request(request, &()).await
        {
            Ok(Json(fields)) => request::json_fields(fields),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable JSON body");
                Vec::new()
            }
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded")
        // Form reads the query string for GET/HEAD; that is not a body
        && *request.method() != Method::GET
        && *request.method() != Method::HEAD
    {
        match Form::<Vec<(String, String)>>::from_request(request, &()).await {
            Ok(Form(fields)) => fields,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable form body");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    }
}
