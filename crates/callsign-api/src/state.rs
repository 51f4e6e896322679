//! Shared state of the document endpoint

use callsign_cache::{CacheTtl, XmlCache};
use callsign_core::traits::{ExtensionRepository, FeatureCodeRepository};
use std::sync::Arc;

use crate::documents::{ConfigurationSource, StaticConfigurationSource};

/// Everything the xml_curl handlers need, registered once as `web::Data`
#[derive(Clone)]
pub struct XmlCurlState {
    pub cache: Arc<XmlCache>,
    pub ttl: CacheTtl,
    pub extensions: Arc<dyn ExtensionRepository>,
    pub feature_codes: Arc<dyn FeatureCodeRepository>,
    pub configurations: Arc<dyn ConfigurationSource>,
    /// Listen address of the feature code service, used as the socket target
    pub featurecodes_addr: String,
}

impl XmlCurlState {
    pub fn new(
        cache: Arc<XmlCache>,
        extensions: Arc<dyn ExtensionRepository>,
        feature_codes: Arc<dyn FeatureCodeRepository>,
        featurecodes_addr: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            ttl: CacheTtl::default(),
            extensions,
            feature_codes,
            configurations: Arc::new(StaticConfigurationSource::default()),
            featurecodes_addr: featurecodes_addr.into(),
        }
    }

    pub fn with_ttl(mut self, ttl: CacheTtl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_configurations(mut self, source: Arc<dyn ConfigurationSource>) -> Self {
        self.configurations = source;
        self
    }
}
