//! Index page cache middleware.
//!
//! Serves `GET` requests from the page cache and stores fresh `200 OK`
//! renders for the configured TTL. Only mount it in front of the index route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig,
    keys::{CacheKey, ViewerKey},
    store::{CachedResponse, PageCache},
};
use crate::application::sessions::CurrentUser;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<dyn PageCache>,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn index_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let viewer = request
        .extensions()
        .get::<CurrentUser>()
        .map_or(ViewerKey::Anonymous, |user| ViewerKey::User(user.id));
    let key = CacheKey::response(
        request.uri().path(),
        request.uri().query().unwrap_or(""),
        viewer,
    );

    if let Some(cached) = cache.store.get(&key) {
        debug!(cache = "page", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    debug!(cache = "page", outcome = "miss", "cache miss, executing handler");
    let response = next.run(request).await;

    if response.status() != StatusCode::OK || response.headers().contains_key(header::SET_COOKIE)
    {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.config.body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(cache = "page", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect(),
        body: bytes.clone(),
    };
    cache.store.set(key, cached, cache.config.index_ttl);
    debug!(cache = "page", ttl_secs = cache.config.index_ttl.as_secs(), "response cached");

    Response::from_parts(parts, Body::from(bytes))
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
