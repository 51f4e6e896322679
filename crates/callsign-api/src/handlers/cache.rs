//! Cache administration handlers

use crate::dto::{FlushParams, FlushResponse};
use crate::state::XmlCurlState;
use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

/// Drop one key, a pattern, or everything
///
/// POST /xml_curl/cache/flush?key=...|pattern=...
#[instrument(skip(state))]
pub async fn flush_cache(
    state: web::Data<XmlCurlState>,
    query: web::Query<FlushParams>,
) -> HttpResponse {
    let key = query.key.as_deref().filter(|k| !k.is_empty());
    let pattern = query.pattern.as_deref().filter(|p| !p.is_empty());

    let items_deleted = match (key, pattern) {
        (Some(key), _) => i64::from(state.cache.delete(key)),
        (None, Some(pattern)) => state.cache.delete_by_pattern(pattern) as i64,
        (None, None) => {
            state.cache.flush();
            -1
        }
    };
    info!(items_deleted, "Document cache flushed");

    HttpResponse::Ok().json(FlushResponse {
        message: "Cache flushed".to_string(),
        items_deleted,
    })
}

/// GET /xml_curl/cache/stats
pub async fn cache_stats(state: web::Data<XmlCurlState>) -> HttpResponse {
    HttpResponse::Ok().json(state.cache.stats())
}
