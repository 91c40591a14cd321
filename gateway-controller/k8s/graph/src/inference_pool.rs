use crate::{
    backend_ref::SERVICE_KIND,
    gateway::Gateway,
    route::{L7Route, RouteKey, RouteBackendRef},
};
use nginx_gateway_controller_core::{conditions, Condition, ResourceId};
use nginx_gateway_controller_k8s_api::{inference::InferencePool, Service};
use std::collections::BTreeMap;

const INFERENCE_POOL_KIND: &str = "InferencePool";

/// An InferencePool referenced by an HTTPRoute of one of our gateways.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferencedInferencePool {
    /// `None` when the referenced pool does not exist.
    pub source: Option<InferencePool>,
    pub gateways: Vec<ResourceId>,
    pub http_routes: Vec<RouteKey>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

/// Indexes the InferencePools that routes of our gateways reference and
/// validates each one.
pub(crate) fn build_referenced(
    routes: &BTreeMap<RouteKey, L7Route>,
    gateways: &BTreeMap<ResourceId, Gateway>,
    pools: &BTreeMap<ResourceId, InferencePool>,
    services: &BTreeMap<ResourceId, Service>,
) -> BTreeMap<ResourceId, ReferencedInferencePool> {
    let mut referenced = BTreeMap::<ResourceId, ReferencedInferencePool>::new();

    for gw in gateways.keys() {
        for (key, route) in routes {
            if !route.parent_refs.iter().any(|p| p.gateway.id == *gw) {
                continue;
            }

            let refs = route
                .rules
                .iter()
                .flat_map(|rule| rule.route_backend_refs.iter())
                .filter_map(|rbr| pool_id(rbr, route.source.namespace()));

            for id in refs {
                let entry = referenced.entry(id.clone()).or_default();
                let Some(pool) = pools.get(&id) else {
                    continue;
                };
                entry.source = Some(pool.clone());
                if !entry.gateways.contains(gw) {
                    entry.gateways.push(gw.clone());
                }
                if !entry.http_routes.contains(key) {
                    entry.http_routes.push(key.clone());
                }
            }
        }
    }

    for (id, pool) in referenced.iter_mut() {
        pool.conditions.extend(routes_acceptance(pool, routes));
        pool.conditions.extend(validate_extension_ref(pool, services));
        pool.valid = pool.conditions.is_empty();
        if !pool.valid {
            tracing::debug!(pool = %id, "InferencePool is invalid");
        }
    }

    referenced
}

/// The pool a backend ref names, either directly or through the headless
/// Service it was rewritten to.
fn pool_id(rbr: &RouteBackendRef, route_ns: &str) -> Option<ResourceId> {
    let name = if rbr.is_inference_pool {
        rbr.inference_pool_name.clone()?
    } else if rbr.backend_ref.kind.as_deref() == Some(INFERENCE_POOL_KIND) {
        rbr.backend_ref.name.clone()
    } else {
        return None;
    };
    let ns = rbr.backend_ref.namespace.as_deref().unwrap_or(route_ns);
    Some(ResourceId::new(ns.to_string(), name))
}

fn routes_acceptance(
    pool: &ReferencedInferencePool,
    routes: &BTreeMap<RouteKey, L7Route>,
) -> Option<Condition> {
    pool.source.as_ref()?;
    let key = pool
        .http_routes
        .iter()
        .find(|key| routes.get(key).is_some_and(|r| !r.valid))?;
    Some(conditions::inference_pool_invalid_http_route_not_accepted(format!(
        "Referenced HTTPRoute {} is not accepted by the Gateway",
        key.id
    )))
}

fn validate_extension_ref(
    pool: &ReferencedInferencePool,
    services: &BTreeMap<ResourceId, Service>,
) -> Option<Condition> {
    let source = pool.source.as_ref()?;
    let picker = &source.spec.endpoint_picker_ref;

    let kind = picker
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .unwrap_or(SERVICE_KIND);
    if kind != SERVICE_KIND {
        return Some(conditions::inference_pool_invalid_extension_ref(format!(
            "Invalid ExtensionRef kind: {kind}"
        )));
    }

    let ns = source.metadata.namespace.clone().unwrap_or_default();
    let svc = ResourceId::new(ns, picker.name.clone());
    if !services.contains_key(&svc) {
        return Some(conditions::inference_pool_invalid_extension_ref(format!(
            "The ExtensionRef Service not found: {svc}"
        )));
    }

    None
}
