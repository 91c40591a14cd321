use crate::secret::{validate_ca, CaError, CA_CERT_KEY};
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api as k8s;
use std::collections::BTreeMap;

/// Validates ConfigMaps holding CA certificates on first reference and
/// remembers the outcome for the rest of the build.
#[derive(Debug)]
pub struct ConfigMapResolver<'s> {
    config_maps: &'s BTreeMap<ResourceId, k8s::ConfigMap>,
    resolved: BTreeMap<ResourceId, ResolvedConfigMap>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfigMap {
    pub source: Option<k8s::ConfigMap>,
    pub ca_cert: Option<Vec<u8>>,
    pub error: Option<ConfigMapError>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigMapError {
    #[error("ConfigMap does not exist")]
    NotFound,

    #[error("ConfigMap does not have the data or binaryData field {CA_CERT_KEY}")]
    MissingCa,

    #[error(transparent)]
    InvalidCa(#[from] CaError),
}

// === impl ConfigMapResolver ===

impl<'s> ConfigMapResolver<'s> {
    pub fn new(config_maps: &'s BTreeMap<ResourceId, k8s::ConfigMap>) -> Self {
        Self {
            config_maps,
            resolved: BTreeMap::new(),
        }
    }

    pub fn resolve(&mut self, id: &ResourceId) -> &ResolvedConfigMap {
        let config_maps = self.config_maps;
        self.resolved
            .entry(id.clone())
            .or_insert_with(|| resolve_config_map(config_maps.get(id)))
    }

    pub fn into_resolved(self) -> BTreeMap<ResourceId, ResolvedConfigMap> {
        self.resolved
    }
}

fn resolve_config_map(cm: Option<&k8s::ConfigMap>) -> ResolvedConfigMap {
    let Some(cm) = cm else {
        return ResolvedConfigMap {
            source: None,
            ca_cert: None,
            error: Some(ConfigMapError::NotFound),
        };
    };

    // binaryData takes precedence when the key is present in both.
    let ca = cm
        .binary_data
        .as_ref()
        .and_then(|d| d.get(CA_CERT_KEY))
        .map(|v| v.0.clone())
        .or_else(|| {
            cm.data
                .as_ref()
                .and_then(|d| d.get(CA_CERT_KEY))
                .map(|v| v.clone().into_bytes())
        })
        .filter(|ca| !ca.is_empty());

    let error = match ca.as_deref() {
        None => Some(ConfigMapError::MissingCa),
        Some(ca) => validate_ca(ca).err().map(Into::into),
    };

    ResolvedConfigMap {
        source: Some(cm.clone()),
        ca_cert: ca,
        error,
    }
}

impl ResolvedConfigMap {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}
