//! Resolves the backend references of routes to Service ports.
//!
//! Invalid references are kept, with `valid` unset, so that the data plane
//! can answer requests routed to them with an error.

use crate::{
    backend_tls_policy::BackendTlsPolicy,
    inference_pool::ReferencedInferencePool,
    nginx_proxy::{EffectiveNginxProxy, IpFamily},
    reference_grant::{FromResource, RefGrantResolver, ToResource},
    route::{L7Route, L7RouteKind, ParentRef, RouteBackendRef, RouteKey},
};
use nginx_gateway_controller_core::{
    conditions, creation_order, Condition, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::{
    gateway::BackendObjectReference,
    inference::{self, EndpointPickerRef},
    Service, ServicePort,
};
use std::collections::BTreeMap;

pub const SERVICE_KIND: &str = "Service";
const INFERENCE_POOL_KIND: &str = "InferencePool";

pub const APP_PROTOCOL_H2C: &str = "kubernetes.io/h2c";
pub const APP_PROTOCOL_WS: &str = "kubernetes.io/ws";
pub const APP_PROTOCOL_WSS: &str = "kubernetes.io/wss";

const EXTERNAL_NAME_TYPE: &str = "ExternalName";

const MIN_WEIGHT: i32 = 0;
const MAX_WEIGHT: i32 = 1_000_000;

/// A backend of a route rule, resolved to a Service port.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendRef {
    /// Empty when the reference failed validation before the Service was
    /// looked up.
    pub service: ResourceId,

    /// Default when the Service or port could not be found.
    pub service_port: ServicePort,

    /// Zero when the configured weight is out of range.
    pub weight: i32,
    pub backend_tls_policy: Option<ResourceId>,

    /// Set for the headless Service of an InferencePool.
    pub endpoint_picker: Option<EndpointPickerConfig>,

    /// Gateways whose NginxProxy configuration cannot serve this backend,
    /// with the condition explaining why.
    pub invalid_for_gateways: BTreeMap<ResourceId, Condition>,
    pub valid: bool,
    pub is_mirror_backend: bool,
    pub is_inference_pool: bool,
}

/// The endpoint picker of an InferencePool backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointPickerConfig {
    pub namespace: String,
    pub endpoint_picker_ref: EndpointPickerRef,
}

/// The indexes backend resolution reads, plus the BackendTLSPolicies it
/// marks as referenced.
pub(crate) struct BackendRefContext<'a> {
    pub services: &'a BTreeMap<ResourceId, Service>,
    pub ref_grants: &'a RefGrantResolver,
    pub inference_pools: &'a BTreeMap<ResourceId, ReferencedInferencePool>,
    pub backend_tls_policies: &'a mut BTreeMap<ResourceId, BackendTlsPolicy>,
}

/// Resolves the backend refs of every valid rule of every valid route.
pub(crate) fn add_backend_refs_to_routes(
    routes: &mut BTreeMap<RouteKey, L7Route>,
    ctx: &mut BackendRefContext<'_>,
) {
    for (key, route) in routes.iter_mut() {
        if !route.valid {
            tracing::trace!(route = %key.id, "Skipping backends of invalid route");
            continue;
        }
        add_backend_refs_to_route(route, ctx);
    }
}

fn add_backend_refs_to_route(route: &mut L7Route, ctx: &mut BackendRefContext<'_>) {
    let kind = route.kind();
    let route_ns = route.source.namespace().to_string();
    let from = match kind {
        L7RouteKind::Http => FromResource::http_route(&route_ns),
        L7RouteKind::Grpc => FromResource::grpc_route(&route_ns),
    };

    let L7Route {
        rules,
        parent_refs,
        conditions: route_conditions,
        ..
    } = route;

    for (idx, rule) in rules.iter_mut().enumerate() {
        // A rule without backends may still redirect.
        if !rule.is_valid() || rule.route_backend_refs.is_empty() {
            continue;
        }

        let base = Path::new("spec").child("rules").index(idx);
        let mut backend_refs = Vec::with_capacity(rule.route_backend_refs.len());

        for (ref_idx, rbr) in rule.route_backend_refs.iter().enumerate() {
            let path = match rbr.mirror_backend_idx {
                Some(filter_idx) => base.child("filters").index(filter_idx).child("backendRef"),
                None => base.child("backendRefs").index(ref_idx),
            };

            let mut rbr = rbr.clone();
            let mut endpoint_picker = None;
            if rbr.is_inference_pool {
                let ns = rbr.backend_ref.namespace.as_deref().unwrap_or(&route_ns);
                let pool_id = ResourceId::new(
                    ns.to_string(),
                    rbr.inference_pool_name.clone().unwrap_or_default(),
                );
                if let Some(pool) = ctx.inference_pools.get(&pool_id) {
                    if !pool.valid {
                        route_conditions.push(conditions::route_invalid_inference_pool(format!(
                            "Referenced InferencePool {pool_id} is invalid"
                        )));
                        continue;
                    }
                    if let Some(source) = pool.source.as_ref() {
                        rbr.backend_ref.port = source.spec.target_ports.first().map(|p| p.number);
                        endpoint_picker = Some(EndpointPickerConfig {
                            namespace: pool_id.namespace.clone(),
                            endpoint_picker_ref: source.spec.endpoint_picker_ref.clone(),
                        });
                    }
                }
            }

            let (mut backend, cond) =
                create_backend_ref(&rbr, kind, &route_ns, parent_refs, &from, &path, ctx);
            backend.endpoint_picker = endpoint_picker;
            backend_refs.push(backend);
            route_conditions.extend(cond);
        }

        if backend_refs.len() > 1 {
            if let Some(cond) = backend_tls_policies_mismatch(&backend_refs, ctx.backend_tls_policies) {
                route_conditions.push(cond);
                for b in &mut backend_refs {
                    b.valid = false;
                }
            }
        }

        rule.backend_refs = backend_refs;
    }
}

fn create_backend_ref(
    rbr: &RouteBackendRef,
    kind: L7RouteKind,
    route_ns: &str,
    parent_refs: &[ParentRef],
    from: &FromResource,
    path: &Path,
    ctx: &mut BackendRefContext<'_>,
) -> (BackendRef, Option<Condition>) {
    let mut backend = BackendRef {
        weight: effective_weight(rbr.weight),
        is_mirror_backend: rbr.mirror_backend_idx.is_some(),
        is_inference_pool: rbr.is_inference_pool,
        ..Default::default()
    };

    let ref_grants = ctx.ref_grants;
    let allowed = ref_grants.allowed_from(from);
    let res = if !rbr.filters.is_empty() {
        Err(conditions::route_backend_ref_unsupported_value(
            FieldError::too_many(path.child("filters"), rbr.filters.len(), 0),
        ))
    } else {
        match kind {
            L7RouteKind::Http => validate_http_backend_ref(rbr, route_ns, &allowed, path),
            L7RouteKind::Grpc => {
                validate_backend_ref(&rbr.backend_ref, rbr.weight, route_ns, &allowed, path)
            }
        }
    };
    if let Err(cond) = res {
        return (backend, Some(cond));
    }

    let ns = rbr.backend_ref.namespace.as_deref().unwrap_or(route_ns);
    backend.service = ResourceId::new(ns.to_string(), rbr.backend_ref.name.clone());

    let (svc, port) = match find_service_port(&rbr.backend_ref, &backend.service, ctx.services, path) {
        Ok(found) => found,
        Err(msg) => return (backend, Some(conditions::route_backend_ref_not_found(msg))),
    };
    backend.service_port = port;

    if is_external_name(svc) {
        for p in parent_refs {
            let dns = p
                .gateway
                .effective_nginx_proxy
                .as_ref()
                .is_some_and(EffectiveNginxProxy::has_dns_resolver);
            if !dns {
                backend.invalid_for_gateways.insert(
                    p.gateway.id.clone(),
                    conditions::route_backend_ref_unsupported_value(
                        "ExternalName service requires DNS resolver configuration in Gateway's NginxProxy",
                    ),
                );
            }
        }

        let external_name = svc
            .spec
            .as_ref()
            .and_then(|s| s.external_name.as_deref())
            .unwrap_or_default();
        if external_name.trim().is_empty() {
            return (
                backend,
                Some(conditions::route_backend_ref_unsupported_value(
                    "ExternalName service has empty or invalid externalName field",
                )),
            );
        }
    }

    add_ip_family_mismatches(&mut backend, svc, parent_refs);

    match find_backend_tls_policy(ctx.backend_tls_policies, &backend.service, &backend.service_port) {
        Ok(btp) => backend.backend_tls_policy = btp,
        Err(msg) => return (backend, Some(conditions::route_backend_ref_unsupported_value(msg))),
    }

    if let Some(app_protocol) = backend.service_port.app_protocol.as_deref() {
        if let Err(msg) = validate_app_protocol(
            kind.as_str(),
            app_protocol,
            backend.backend_tls_policy.is_some(),
        ) {
            return (backend, Some(conditions::route_backend_ref_unsupported_protocol(msg)));
        }
    }

    backend.valid = true;
    (backend, None)
}

/// Resolves the single backend of an L4 route rule. TLS passes its route
/// type so the Service's application protocol is checked; TCP and UDP are
/// protocol-agnostic.
pub(crate) fn create_l4_backend_ref(
    backend_ref: &BackendObjectReference,
    weight: Option<i32>,
    route_ns: &str,
    parent_refs: &[ParentRef],
    allowed: &dyn Fn(&ToResource) -> bool,
    services: &BTreeMap<ResourceId, Service>,
    app_protocol_route_type: Option<&str>,
    path: &Path,
) -> (BackendRef, Option<Condition>) {
    if let Err(cond) = validate_backend_ref(backend_ref, weight, route_ns, allowed, path) {
        return (BackendRef::default(), Some(cond));
    }

    let ns = backend_ref.namespace.as_deref().unwrap_or(route_ns);
    let mut backend = BackendRef {
        service: ResourceId::new(ns.to_string(), backend_ref.name.clone()),
        weight: effective_weight(weight),
        valid: true,
        ..Default::default()
    };

    let (svc, port) = match find_service_port(backend_ref, &backend.service, services, path) {
        Ok(found) => found,
        Err(msg) => {
            backend.valid = false;
            return (backend, Some(conditions::route_backend_ref_not_found(msg)));
        }
    };
    backend.service_port = port;

    if let Some(route_type) = app_protocol_route_type {
        if let Some(app_protocol) = backend.service_port.app_protocol.as_deref() {
            if let Err(msg) = validate_app_protocol(route_type, app_protocol, false) {
                backend.valid = false;
                return (backend, Some(conditions::route_backend_ref_unsupported_protocol(msg)));
            }
        }
    }

    add_ip_family_mismatches(&mut backend, svc, parent_refs);
    (backend, None)
}

fn effective_weight(weight: Option<i32>) -> i32 {
    match weight {
        None => 1,
        Some(w) if validate_weight(w).is_ok() => w,
        // An out-of-range weight gets no traffic.
        Some(_) => 0,
    }
}

fn validate_weight(weight: i32) -> Result<(), String> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        return Ok(());
    }
    Err(format!("must be in the range [{MIN_WEIGHT}, {MAX_WEIGHT}]"))
}

/// Validates a Service backend. The first failure wins.
fn validate_backend_ref(
    backend: &BackendObjectReference,
    weight: Option<i32>,
    route_ns: &str,
    allowed: &dyn Fn(&ToResource) -> bool,
    path: &Path,
) -> Result<(), Condition> {
    if let Some(group) = backend.group.as_deref().filter(|g| *g != "core" && !g.is_empty()) {
        return Err(conditions::route_backend_ref_invalid_kind(
            FieldError::not_supported(path.child("group"), group, ["core", ""]),
        ));
    }

    if let Some(kind) = backend.kind.as_deref().filter(|k| *k != SERVICE_KIND) {
        return Err(conditions::route_backend_ref_invalid_kind(
            FieldError::not_supported(path.child("kind"), kind, [SERVICE_KIND]),
        ));
    }

    if let Some(ns) = backend.namespace.as_deref().filter(|ns| *ns != route_ns) {
        check_service_grant(ns, &backend.name, allowed, path)?;
    }

    if backend.port.is_none() {
        return Err(conditions::route_backend_ref_unsupported_value(
            FieldError::required(path.child("port"), "port cannot be nil"),
        ));
    }

    check_weight(weight, path)
}

/// Validates an HTTPRoute backend, which may also name an InferencePool.
fn validate_http_backend_ref(
    rbr: &RouteBackendRef,
    route_ns: &str,
    allowed: &dyn Fn(&ToResource) -> bool,
    path: &Path,
) -> Result<(), Condition> {
    let backend = &rbr.backend_ref;
    validate_http_group_kind(backend, path)?;

    if let Some(ns) = backend.namespace.as_deref().filter(|ns| *ns != route_ns) {
        let pool = if backend.kind.as_deref() == Some(INFERENCE_POOL_KIND) {
            Some(backend.name.clone())
        } else if rbr.is_inference_pool {
            // Rewritten to the pool's headless Service; the grant must
            // permit the pool itself.
            Some(rbr.inference_pool_name.clone().unwrap_or_default())
        } else {
            None
        };

        match pool {
            Some(name) => {
                let id = ResourceId::new(ns.to_string(), name);
                if !allowed(&ToResource::inference_pool(&id)) {
                    return Err(conditions::route_backend_ref_not_permitted(FieldError::forbidden(
                        path.child("namespace"),
                        format!("Backend ref to InferencePool {id} not permitted by any ReferenceGrant"),
                    )));
                }
            }
            None => check_service_grant(ns, &backend.name, allowed, path)?,
        }
    }

    let is_service = backend.kind.as_deref().is_none_or(|k| k == SERVICE_KIND);
    if backend.port.is_none() && is_service {
        return Err(conditions::route_backend_ref_unsupported_value(
            FieldError::required(path.child("port"), "port cannot be nil"),
        ));
    }

    check_weight(rbr.weight, path)
}

fn validate_http_group_kind(backend: &BackendObjectReference, path: &Path) -> Result<(), Condition> {
    if let Some(group) = backend.group.as_deref() {
        if group != "core" && !group.is_empty() && group != inference::GROUP {
            return Err(conditions::route_backend_ref_invalid_kind(
                FieldError::not_supported(path.child("group"), group, ["core", "", inference::GROUP]),
            ));
        }
        if group == inference::GROUP && backend.kind.as_deref() != Some(INFERENCE_POOL_KIND) {
            return Err(conditions::route_backend_ref_invalid_kind(FieldError::invalid(
                path.child("kind"),
                backend.kind.as_deref().unwrap_or("null"),
                format!("kind must be InferencePool when group is {}", inference::GROUP),
            )));
        }
    }

    if let Some(kind) = backend.kind.as_deref() {
        if kind != SERVICE_KIND && kind != INFERENCE_POOL_KIND {
            return Err(conditions::route_backend_ref_invalid_kind(
                FieldError::not_supported(path.child("kind"), kind, [SERVICE_KIND, INFERENCE_POOL_KIND]),
            ));
        }
        if kind == INFERENCE_POOL_KIND && backend.group.as_deref() != Some(inference::GROUP) {
            return Err(conditions::route_backend_ref_invalid_kind(FieldError::invalid(
                path.child("group"),
                backend.group.as_deref().unwrap_or("null"),
                format!("group must be {} when kind is InferencePool", inference::GROUP),
            )));
        }
    }

    Ok(())
}

fn check_service_grant(
    ns: &str,
    name: &str,
    allowed: &dyn Fn(&ToResource) -> bool,
    path: &Path,
) -> Result<(), Condition> {
    let id = ResourceId::new(ns.to_string(), name.to_string());
    if allowed(&ToResource::service(&id)) {
        return Ok(());
    }
    Err(conditions::route_backend_ref_not_permitted(FieldError::forbidden(
        path.child("namespace"),
        format!("Backend ref to Service {id} not permitted by any ReferenceGrant"),
    )))
}

fn check_weight(weight: Option<i32>, path: &Path) -> Result<(), Condition> {
    let Some(weight) = weight else {
        return Ok(());
    };
    validate_weight(weight).map_err(|e| {
        conditions::route_backend_ref_unsupported_value(FieldError::invalid(
            path.child("weight"),
            weight,
            e,
        ))
    })
}

fn find_service_port<'s>(
    backend: &BackendObjectReference,
    id: &ResourceId,
    services: &'s BTreeMap<ResourceId, Service>,
    path: &Path,
) -> Result<(&'s Service, ServicePort), String> {
    let Some(svc) = services.get(id) else {
        return Err(FieldError::not_found(path.child("name"), &backend.name).to_string());
    };

    let port = backend.port.unwrap_or_default();
    svc.spec
        .iter()
        .flat_map(|s| s.ports.iter().flatten())
        .find(|p| p.port == port)
        .map(|p| (svc, p.clone()))
        .ok_or_else(|| format!("No matching port for Service {} and port {port}", id.name))
}

pub(crate) fn is_external_name(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .is_some_and(|t| t == EXTERNAL_NAME_TYPE)
}

fn add_ip_family_mismatches(backend: &mut BackendRef, svc: &Service, parent_refs: &[ParentRef]) {
    let families = svc
        .spec
        .as_ref()
        .and_then(|s| s.ip_families.as_deref())
        .unwrap_or_default();

    for p in parent_refs {
        if let Err(msg) = verify_ip_family(p.gateway.effective_nginx_proxy.as_ref(), families) {
            backend
                .invalid_for_gateways
                .insert(p.gateway.id.clone(), conditions::route_invalid_ip_family(msg));
        }
    }
}

fn verify_ip_family(np: Option<&EffectiveNginxProxy>, families: &[String]) -> Result<(), &'static str> {
    let Some(np) = np else {
        return Ok(());
    };
    let has = |family: &str| families.iter().any(|f| f == family);

    match np.ip_family() {
        IpFamily::Ipv4 if has("IPv6") => {
            Err("The Service configured with IPv6 family but NginxProxy is configured with IPv4")
        }
        IpFamily::Ipv6 if has("IPv4") => {
            Err("The Service configured with IPv4 family but NginxProxy is configured with IPv6")
        }
        _ => Ok(()),
    }
}

/// Selects the BackendTLSPolicy for a Service port.
///
/// When several policies apply, the oldest wins and the others are marked
/// conflicted. Fails when the winning policy is invalid.
fn find_backend_tls_policy(
    policies: &mut BTreeMap<ResourceId, BackendTlsPolicy>,
    service: &ResourceId,
    port: &ServicePort,
) -> Result<Option<ResourceId>, String> {
    let port_name = port.name.as_deref().unwrap_or_default();
    let mut matching = policies
        .iter()
        .filter(|(id, btp)| {
            id.namespace == service.namespace
                && btp.source.spec.target_refs.iter().any(|t| {
                    t.name == service.name
                        && t.section_name.as_deref().is_none_or(|s| s == port_name)
                })
        })
        .map(|(id, _)| id.clone())
        .collect::<Vec<_>>();

    matching.sort_by(|a, b| {
        let meta = |id: &ResourceId| policies.get(id).map(|p| p.source.metadata.clone()).unwrap_or_default();
        creation_order(&meta(a), &meta(b))
    });

    let mut matching = matching.into_iter();
    let Some(winner) = matching.next() else {
        return Ok(None);
    };

    for loser in matching {
        if let Some(btp) = policies.get_mut(&loser) {
            btp.is_referenced = true;
            conditions::push_unique(
                &mut btp.conditions,
                conditions::policy_conflicted(
                    "Conflicts with another BackendTLSPolicy targeting the same Service",
                ),
            );
        }
    }

    let Some(btp) = policies.get_mut(&winner) else {
        return Ok(None);
    };
    btp.is_referenced = true;
    if !btp.valid {
        let reason = btp
            .conditions
            .first()
            .map(|c| c.message.as_str())
            .unwrap_or_default();
        return Err(format!("The BackendTLSPolicy is invalid: {reason}"));
    }
    conditions::push_unique(&mut btp.conditions, conditions::policy_accepted());
    Ok(Some(winner))
}

/// Checks that a route type can proxy to a Service port's application
/// protocol. Only the Kubernetes standard application protocols are known;
/// others are allowed.
fn validate_app_protocol(route_type: &str, app_protocol: &str, has_btp: bool) -> Result<(), String> {
    let err = format!(
        "The Route type {route_type} does not support service port appProtocol {app_protocol}"
    );

    match app_protocol {
        APP_PROTOCOL_H2C => match route_type {
            "grpc" => Ok(()),
            "http" => Err(format!(
                "{err}; nginx does not support proxying to upstreams with http2 or h2c"
            )),
            _ => Err(err),
        },
        APP_PROTOCOL_WS if route_type == "http" => Ok(()),
        APP_PROTOCOL_WS => Err(err),
        APP_PROTOCOL_WSS => match route_type {
            "http" if has_btp => Ok(()),
            "http" => Err(format!("{err}; missing corresponding BackendTLSPolicy")),
            "tls" => Ok(()),
            _ => Err(err),
        },
        _ => Ok(()),
    }
}

/// Backends of one rule form a single upstream group, so they must share
/// the same TLS settings.
fn backend_tls_policies_mismatch(
    backends: &[BackendRef],
    policies: &BTreeMap<ResourceId, BackendTlsPolicy>,
) -> Option<Condition> {
    let settings = backends
        .iter()
        .map(|b| {
            b.backend_tls_policy
                .as_ref()
                .and_then(|id| policies.get(id))
                .map(|p| {
                    let v = &p.source.spec.validation;
                    (&v.ca_certificate_refs, &v.well_known_ca_certificates, &v.hostname)
                })
        })
        .collect::<Vec<_>>();

    let (first, rest) = settings.split_first()?;
    if rest.iter().all(|s| s == first) {
        return None;
    }
    Some(conditions::route_backend_ref_unsupported_value(
        "Backend TLS policies do not match for all backends",
    ))
}

// === impl BackendRef ===

impl BackendRef {
    /// Identifies the Service port of a valid backend as `ns_name_port`.
    /// Invalid backends have no reference.
    pub fn service_port_reference(&self) -> String {
        if !self.valid {
            return String::new();
        }
        format!(
            "{}_{}_{}",
            self.service.namespace, self.service.name, self.service_port.port
        )
    }
}
