//! mod_xml_curl lookups
//!
//! Each section is served from the document cache when possible. Lookup
//! misses and repository failures both answer with the not-found document,
//! so the switch keeps working from its static configuration.

use crate::documents::{self, dialplan, directory};
use crate::dto::XmlCurlRequest;
use crate::state::XmlCurlState;
use actix_web::{web, HttpResponse};
use callsign_cache::keys;
use tracing::{debug, error, instrument, warn};

/// POST /xml_curl
#[instrument(
    skip(state, form),
    fields(section = %form.section, user = %form.user, domain = %form.domain)
)]
pub async fn xml_curl(
    state: web::Data<XmlCurlState>,
    form: web::Form<XmlCurlRequest>,
) -> HttpResponse {
    let req = form.into_inner();
    debug!(
        context = %req.context,
        dest = %req.destination_number,
        key_value = %req.key_value,
        hostname = %req.switch_hostname(),
        "xml_curl request received"
    );

    let document = match req.section.as_str() {
        "directory" => directory_lookup(&state, &req).await,
        "dialplan" => dialplan_lookup(&state, &req).await,
        "configuration" => configuration_lookup(&state, &req),
        other => {
            warn!(section = other, "Unknown xml_curl section");
            None
        }
    };

    HttpResponse::Ok()
        .content_type("text/xml")
        .body(document.unwrap_or_else(documents::not_found))
}

async fn directory_lookup(state: &XmlCurlState, req: &XmlCurlRequest) -> Option<String> {
    if req.user.is_empty() || req.domain.is_empty() {
        return None;
    }

    let key = keys::directory_key(&req.domain, &req.user);
    if let Some(cached) = state.cache.get(&key) {
        debug!(key = %key, "Directory cache hit");
        return Some(cached);
    }

    let ext = match state.extensions.find_by_user(&req.domain, &req.user).await {
        Ok(Some(ext)) => ext,
        Ok(None) => {
            debug!("Extension not found: {}@{}", req.user, req.domain);
            return None;
        }
        Err(e) => {
            error!(error = %e, "Directory lookup failed");
            return None;
        }
    };

    let document = directory::user_document(&ext, &req.domain);
    state.cache.set(key, document.clone(), state.ttl.directory);
    Some(document)
}

async fn dialplan_lookup(state: &XmlCurlState, req: &XmlCurlRequest) -> Option<String> {
    let context = req.dialplan_context();
    let key = if req.is_single_dialplan() {
        keys::dialplan_single_key(context, &req.destination_number)
    } else {
        keys::dialplan_key(context)
    };
    if let Some(cached) = state.cache.get(&key) {
        debug!(key = %key, "Dialplan cache hit");
        return Some(cached);
    }

    let domain = req.dialplan_domain();
    let mut codes = match state.feature_codes.find_candidates_for_domain(domain).await {
        Ok(codes) => codes,
        Err(e) => {
            error!(error = %e, domain = %domain, "Dialplan lookup failed");
            return None;
        }
    };

    // Inbound routes only get the first code the destination itself dials
    if req.is_single_dialplan() {
        codes = codes
            .into_iter()
            .find(|code| code.matches_dialed(&req.destination_number).is_some())
            .into_iter()
            .collect();
    }

    let document = dialplan::feature_code_document(context, &codes, &state.featurecodes_addr)?;
    state.cache.set(key, document.clone(), state.ttl.dialplan);
    Some(document)
}

fn configuration_lookup(state: &XmlCurlState, req: &XmlCurlRequest) -> Option<String> {
    let name = req.key_value.as_str();
    if name.is_empty() {
        return None;
    }

    let hostname = req.switch_hostname();
    let key = keys::configuration_key(hostname, name);
    if let Some(cached) = state.cache.get(&key) {
        debug!(key = %key, "Configuration cache hit");
        return Some(cached);
    }

    let Some(document) = state.configurations.document(name, hostname) else {
        debug!(name = %name, "No dynamic configuration, falling back");
        return None;
    };
    state.cache.set(key, document.clone(), state.ttl.configuration);
    Some(document)
}
