//! HTTP request handlers

pub mod cache;
pub mod xml_curl;

use actix_web::web;

/// Mount the document endpoint and its cache administration routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/xml_curl")
            .route("", web::post().to(xml_curl::xml_curl))
            .route("/cache/flush", web::post().to(cache::flush_cache))
            .route("/cache/stats", web::get().to(cache::cache_stats)),
    );
}
