use super::{parent_ref, validate_hostnames, L4Route, L4RouteKind, L4RouteSource, L4RouteSpec};
use crate::{
    backend_ref::create_l4_backend_ref,
    gateway::Gateway,
    reference_grant::{FromResource, RefGrantResolver},
};
use nginx_gateway_controller_core::{conditions, Condition, Path, ResourceId};
use nginx_gateway_controller_k8s_api::{
    gateway::{L4RouteRule, ParentReference},
    Service,
};
use std::collections::BTreeMap;

/// The indexes an L4 route build reads.
pub(crate) struct L4RouteContext<'a> {
    pub gateways: &'a BTreeMap<ResourceId, Gateway>,
    pub services: &'a BTreeMap<ResourceId, Service>,
    pub ref_grants: &'a RefGrantResolver,
}

/// Builds a TLS, TCP or UDP route. Returns `None` when the route references
/// none of our gateways.
pub(super) fn build(source: L4RouteSource, ctx: &L4RouteContext<'_>) -> Option<L4Route> {
    let (parent_refs, hostnames, rules) = spec_parts(&source);

    let mut route = L4Route {
        source,
        spec: L4RouteSpec::default(),
        parent_refs: Vec::new(),
        conditions: Vec::new(),
        valid: false,
        attachable: false,
    };

    match parent_ref::build(&parent_refs, route.source.namespace(), ctx.gateways) {
        Ok(refs) if refs.is_empty() => return None,
        Ok(refs) => route.parent_refs = refs,
        Err(error) => {
            route.conditions.push(conditions::route_unsupported_value(error));
            return Some(route);
        }
    }

    let kind = route.kind();
    if kind == L4RouteKind::Tls {
        if let Some(msg) = validate_hostnames(&hostnames, &Path::new("spec").child("hostnames")) {
            route.conditions.push(conditions::route_unsupported_value(msg));
            return Some(route);
        }
        route.spec.hostnames = hostnames;
    }

    let rule = match select_rule(kind, &rules) {
        Ok(rule) => rule,
        Err(cond) => {
            route.conditions.push(cond);
            return Some(route);
        }
    };

    if kind != L4RouteKind::Tls && rules.len() > 1 {
        let ignored = rules.len() - 1;
        route.conditions.push(conditions::route_accepted_unsupported_field(format!(
            "spec.rules[1..{ignored}]: Only the first rule is processed. {ignored} additional rule(s) are ignored"
        )));
    }

    let route_ns = route.source.namespace().to_string();
    let from = match kind {
        L4RouteKind::Tls => FromResource::tls_route(&route_ns),
        L4RouteKind::Tcp => FromResource::tcp_route(&route_ns),
        L4RouteKind::Udp => FromResource::udp_route(&route_ns),
    };
    let allowed = ctx.ref_grants.allowed_from(&from);
    let app_protocol_route_type = (kind == L4RouteKind::Tls).then_some(kind.as_str());

    let base = Path::new("spec").child("rules").index(0).child("backendRefs");
    for (idx, backend_ref) in rule.backend_refs.iter().enumerate() {
        let (backend, cond) = create_l4_backend_ref(
            &backend_ref.inner,
            backend_ref.weight,
            &route_ns,
            &route.parent_refs,
            &allowed,
            ctx.services,
            app_protocol_route_type,
            &base.index(idx),
        );
        route.spec.backend_refs.push(backend);
        route.conditions.extend(cond);
    }

    route.valid = true;
    route.attachable = true;
    Some(route)
}

fn spec_parts(source: &L4RouteSource) -> (Vec<ParentReference>, Vec<String>, Vec<L4RouteRule>) {
    match source {
        L4RouteSource::Tls(r) => (
            r.spec.parent_refs.clone().unwrap_or_default(),
            r.spec.hostnames.clone().unwrap_or_default(),
            r.spec.rules.clone(),
        ),
        L4RouteSource::Tcp(r) => (
            r.spec.parent_refs.clone().unwrap_or_default(),
            Vec::new(),
            r.spec.rules.clone(),
        ),
        L4RouteSource::Udp(r) => (
            r.spec.parent_refs.clone().unwrap_or_default(),
            Vec::new(),
            r.spec.rules.clone(),
        ),
    }
}

/// A TLSRoute proxies to exactly one backend. TCP and UDP routes use their
/// first rule.
fn select_rule(kind: L4RouteKind, rules: &[L4RouteRule]) -> Result<&L4RouteRule, Condition> {
    match (kind, rules) {
        (L4RouteKind::Tls, [rule]) if rule.backend_refs.len() == 1 => Ok(rule),
        (L4RouteKind::Tls, _) => Err(conditions::route_backend_ref_unsupported_value(
            "Must have exactly one Rule and BackendRef",
        )),
        (_, [first, ..]) => Ok(first),
        (_, []) => Err(conditions::route_backend_ref_unsupported_value(
            "Must have at least one Rule",
        )),
    }
}
