//! Internal routes that receive mirrored requests.
//!
//! NGINX mirrors a request by issuing a subrequest to a location. For each
//! RequestMirror filter an internal route is generated whose single exact
//! path match names that location and whose backend is the mirror target.

use super::{grpc, http, Filter, L7Route, L7RouteContext, L7RouteKind, RouteKey};
use crate::validation::SkipValidator;
use nginx_gateway_controller_core::{ResourceId, INTERNAL_PATH_PREFIX};
use nginx_gateway_controller_k8s_api::{
    gateway::{
        self as api, BackendObjectReference, GrpcBackendRef, GrpcMethodMatch, GrpcMethodMatchType,
        GrpcRouteFilter, GrpcRouteMatch, GrpcRouteRule, HttpBackendRef, HttpPathMatch,
        HttpRouteFilter, HttpRouteMatch, HttpRouteRule,
    },
    ObjectMeta,
};
use std::collections::BTreeMap;

/// The name of the route generated for a mirror filter of rule `rule_idx`.
pub fn route_name(route: &str, service: &str, namespace: &str, rule_idx: usize) -> String {
    format!("{route}-mirror-{service}-{namespace}-{rule_idx}")
}

/// The location mirrored requests are sent to.
pub fn path(rule_idx: usize, backend: &BackendObjectReference, route: &ResourceId) -> String {
    let prefix = format!("{INTERNAL_PATH_PREFIX}-mirror");
    match backend.namespace.as_deref() {
        Some(ns) => format!(
            "{prefix}-{ns}/{}-{}/{}-{rule_idx}",
            backend.name, route.namespace, route.name
        ),
        None => format!(
            "{prefix}-{}-{}/{}-{rule_idx}",
            backend.name, route.namespace, route.name
        ),
    }
}

pub(super) fn build_http_mirror_routes(
    routes: &mut BTreeMap<RouteKey, L7Route>,
    route: &L7Route,
    hr: &api::HttpRoute,
    ctx: &mut L7RouteContext<'_>,
) {
    let id = ResourceId::of(hr);
    let no_pools = BTreeMap::new();

    for (idx, backend, meta) in mirrors(route, &hr.metadata, &id) {
        let source_filters = hr
            .spec
            .rules
            .as_ref()
            .and_then(|rules| rules.get(idx))
            .and_then(|r| r.filters.as_ref())
            .map(|filters| {
                filters
                    .iter()
                    .filter(|f| !matches!(f, HttpRouteFilter::RequestMirror { .. }))
                    .cloned()
                    .collect()
            });

        let mirror = api::HttpRoute {
            metadata: meta,
            spec: api::HttpRouteSpec {
                parent_refs: hr.spec.parent_refs.clone(),
                hostnames: hr.spec.hostnames.clone(),
                rules: Some(vec![HttpRouteRule {
                    matches: Some(vec![HttpRouteMatch {
                        path: Some(HttpPathMatch::Exact {
                            value: path(idx, &backend, &id),
                        }),
                        ..Default::default()
                    }]),
                    filters: source_filters,
                    backend_refs: Some(vec![HttpBackendRef {
                        inner: backend,
                        weight: None,
                        filters: None,
                    }]),
                    ..Default::default()
                }]),
            },
            status: None,
        };

        if let Some(built) = http::build(&SkipValidator::default(), &mirror, &no_pools, ctx) {
            let key = RouteKey::new(ResourceId::of(&mirror), L7RouteKind::Http);
            tracing::trace!(route = %id, mirror = %key.id, "Built mirror route");
            routes.insert(key, built);
        }
    }
}

pub(super) fn build_grpc_mirror_routes(
    routes: &mut BTreeMap<RouteKey, L7Route>,
    route: &L7Route,
    gr: &api::GrpcRoute,
    ctx: &mut L7RouteContext<'_>,
) {
    let id = ResourceId::of(gr);

    for (idx, backend, meta) in mirrors(route, &gr.metadata, &id) {
        let source_filters = gr
            .spec
            .rules
            .as_ref()
            .and_then(|rules| rules.get(idx))
            .and_then(|r| r.filters.as_ref())
            .map(|filters| {
                filters
                    .iter()
                    .filter(|f| !matches!(f, GrpcRouteFilter::RequestMirror { .. }))
                    .cloned()
                    .collect()
            });

        // gRPC matches are lowered to `/service/method`, so splitting the
        // mirror path at its last slash yields the same exact path match.
        let mirror_path = path(idx, &backend, &id);
        let (service, method) = mirror_path
            .trim_start_matches('/')
            .rsplit_once('/')
            .map(|(s, m)| (s.to_string(), m.to_string()))
            .unwrap_or_default();

        let mirror = api::GrpcRoute {
            metadata: meta,
            spec: api::GrpcRouteSpec {
                parent_refs: gr.spec.parent_refs.clone(),
                hostnames: gr.spec.hostnames.clone(),
                rules: Some(vec![GrpcRouteRule {
                    matches: Some(vec![GrpcRouteMatch {
                        method: Some(GrpcMethodMatch {
                            type_: Some(GrpcMethodMatchType::Exact),
                            service: Some(service),
                            method: Some(method),
                        }),
                        headers: None,
                    }]),
                    filters: source_filters,
                    backend_refs: Some(vec![GrpcBackendRef {
                        inner: backend,
                        weight: None,
                        filters: None,
                    }]),
                    ..Default::default()
                }]),
            },
            status: None,
        };

        if let Some(built) = grpc::build(&SkipValidator::default(), &mirror, ctx) {
            let key = RouteKey::new(ResourceId::of(&mirror), L7RouteKind::Grpc);
            tracing::trace!(route = %id, mirror = %key.id, "Built mirror route");
            routes.insert(key, built);
        }
    }
}

/// Yields the rule index, mirror backend and renamed metadata of every
/// RequestMirror filter in the route's valid rules.
fn mirrors<'r>(
    route: &'r L7Route,
    meta: &'r ObjectMeta,
    id: &'r ResourceId,
) -> impl Iterator<Item = (usize, BackendObjectReference, ObjectMeta)> + 'r {
    route
        .rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.filters.valid)
        .flat_map(|(idx, rule)| rule.filters.filters.iter().map(move |f| (idx, f)))
        .filter_map(move |(idx, f)| {
            let Filter::RequestMirror(m) = f else {
                return None;
            };
            let backend = m.backend_ref.clone();
            let ns = backend.namespace.as_deref().unwrap_or(&id.namespace);
            let mut meta = meta.clone();
            meta.name = Some(route_name(&id.name, &backend.name, ns, idx));
            Some((idx, backend, meta))
        })
}
