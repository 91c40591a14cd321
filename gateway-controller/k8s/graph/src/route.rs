//! L7 (HTTP, gRPC) and L4 (TLS, TCP, UDP) routes.
//!
//! Routes are built from their manifests without reference to listeners. A
//! later binding pass attaches them to the listeners their parent refs
//! select, recording the outcome on each [`ParentRef`].

mod binding;
mod filter;
mod grpc;
mod http;
mod l4;
mod mirror;
mod parent_ref;
mod session_persistence;

pub use self::{
    filter::{Filter, RouteRuleFilters},
    parent_ref::{listener_key, Attachment, ParentRef, ParentRefGateway},
    session_persistence::SessionPersistenceConfig,
};
pub(crate) use self::{binding::bind_routes, l4::L4RouteContext};

use crate::{
    authentication_filter::AuthenticationFilter,
    backend_ref::BackendRef,
    config::FeatureFlags,
    gateway::Gateway,
    policy::PolicyKey,
    snippets_filter::SnippetsFilter,
    validation::NginxValidator,
};
use nginx_gateway_controller_core::{
    conditions, field, hostname, Condition, ErrorList, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::{
    gateway::{self as api, BackendObjectReference, GrpcRouteFilter, HttpRouteFilter, HttpRouteMatch},
    inference::InferencePool,
    ObjectMeta, Resource,
};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteKind {
    Http,
    Grpc,
    Tls,
    Tcp,
    Udp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum L7RouteKind {
    Http,
    Grpc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum L4RouteKind {
    Tls,
    Tcp,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub id: ResourceId,
    pub kind: L7RouteKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct L4RouteKey {
    pub id: ResourceId,
    pub kind: L4RouteKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum L7RouteSource {
    Http(api::HttpRoute),
    Grpc(api::GrpcRoute),
}

#[derive(Clone, Debug, PartialEq)]
pub struct L7Route {
    pub source: L7RouteSource,
    pub hostnames: Vec<String>,
    pub rules: Vec<RouteRule>,
    pub parent_refs: Vec<ParentRef>,
    pub conditions: Vec<Condition>,

    /// NGF policies attached to this route.
    pub policies: Vec<PolicyKey>,

    /// Set when at least one rule has valid matches and filters.
    pub valid: bool,

    /// Set once the route's hostnames and parent refs have validated.
    pub attachable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRule {
    /// gRPC matches are lowered to HTTP matches.
    pub matches: Vec<HttpRouteMatch>,
    pub filters: RouteRuleFilters,
    pub route_backend_refs: Vec<RouteBackendRef>,

    /// Resolved from `route_backend_refs` once services and policies are
    /// known. Invalid refs are kept so a 500 can be returned for them.
    pub backend_refs: Vec<BackendRef>,
    pub session_persistence: Option<SessionPersistenceConfig>,
    pub valid_matches: bool,
}

/// A backend reference as written in a rule, before resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteBackendRef {
    pub backend_ref: BackendObjectReference,
    pub weight: Option<i32>,

    /// The index of the RequestMirror filter this backend came from.
    pub mirror_backend_idx: Option<usize>,

    /// Set when the ref named an InferencePool and was rewritten to the
    /// pool's headless Service.
    pub is_inference_pool: bool,
    pub inference_pool_name: Option<String>,
    pub session_persistence: Option<SessionPersistenceConfig>,

    /// Filters set on the backend ref itself. These are not supported.
    pub filters: Vec<BackendFilter>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendFilter {
    Http(HttpRouteFilter),
    Grpc(GrpcRouteFilter),
}

#[derive(Clone, Debug, PartialEq)]
pub enum L4RouteSource {
    Tls(api::TlsRoute),
    Tcp(api::TcpRoute),
    Udp(api::UdpRoute),
}

#[derive(Clone, Debug, PartialEq)]
pub struct L4Route {
    pub source: L4RouteSource,
    pub spec: L4RouteSpec,
    pub parent_refs: Vec<ParentRef>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
    pub attachable: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct L4RouteSpec {
    /// Only TLSRoutes carry hostnames.
    pub hostnames: Vec<String>,

    /// A TLSRoute has exactly one backend; TCP and UDP routes may have many.
    pub backend_refs: Vec<BackendRef>,
}

/// Everything an L7 route build reads, plus the filters it marks as
/// referenced.
pub(crate) struct L7RouteContext<'a> {
    pub gateways: &'a BTreeMap<ResourceId, Gateway>,
    pub snippets: &'a mut BTreeMap<ResourceId, SnippetsFilter>,
    pub authentication: &'a mut BTreeMap<ResourceId, AuthenticationFilter>,
    pub features: FeatureFlags,
}

/// Errors found while processing one rule, by how they affect the route.
#[derive(Debug, Default)]
pub(crate) struct RuleErrors {
    /// Make the rule unusable.
    pub invalid: ErrorList,

    /// Unsupported values that are ignored.
    pub warn: ErrorList,

    /// References to objects that do not exist or are invalid.
    pub resolve: ErrorList,
}

/// Builds the HTTPRoutes and GRPCRoutes that reference one of `gateways`,
/// along with the internal routes their RequestMirror filters need.
pub(crate) fn build_l7_routes(
    http_routes: &BTreeMap<ResourceId, api::HttpRoute>,
    grpc_routes: &BTreeMap<ResourceId, api::GrpcRoute>,
    inference_pools: &BTreeMap<ResourceId, InferencePool>,
    mut ctx: L7RouteContext<'_>,
) -> BTreeMap<RouteKey, L7Route> {
    let mut routes = BTreeMap::new();
    if ctx.gateways.is_empty() {
        return routes;
    }

    let validator = NginxValidator::default();

    for (id, hr) in http_routes {
        let Some(route) = http::build(&validator, hr, inference_pools, &mut ctx) else {
            tracing::trace!(route = %id, "HTTPRoute does not reference any of our Gateways");
            continue;
        };
        mirror::build_http_mirror_routes(&mut routes, &route, hr, &mut ctx);
        routes.insert(RouteKey::new(id.clone(), L7RouteKind::Http), route);
    }

    for (id, gr) in grpc_routes {
        let Some(route) = grpc::build(&validator, gr, &mut ctx) else {
            tracing::trace!(route = %id, "GRPCRoute does not reference any of our Gateways");
            continue;
        };
        mirror::build_grpc_mirror_routes(&mut routes, &route, gr, &mut ctx);
        routes.insert(RouteKey::new(id.clone(), L7RouteKind::Grpc), route);
    }

    routes
}

/// Builds the TLS, TCP and UDP routes that reference one of the context's
/// gateways. Backends are resolved as part of the build.
pub(crate) fn build_l4_routes(
    tls_routes: &BTreeMap<ResourceId, api::TlsRoute>,
    tcp_routes: &BTreeMap<ResourceId, api::TcpRoute>,
    udp_routes: &BTreeMap<ResourceId, api::UdpRoute>,
    ctx: &L4RouteContext<'_>,
) -> BTreeMap<L4RouteKey, L4Route> {
    let mut routes = BTreeMap::new();
    if ctx.gateways.is_empty() {
        return routes;
    }

    let sources = tls_routes
        .values()
        .map(|r| L4RouteSource::Tls(r.clone()))
        .chain(tcp_routes.values().map(|r| L4RouteSource::Tcp(r.clone())))
        .chain(udp_routes.values().map(|r| L4RouteSource::Udp(r.clone())));

    for source in sources {
        let key = source.key();
        match l4::build(source, ctx) {
            Some(route) => {
                routes.insert(key, route);
            }
            None => {
                tracing::trace!(route = %key.id, kind = key.kind.as_str(), "Route does not reference any of our Gateways")
            }
        }
    }

    routes
}

/// Starts building an L7 route from the fields every kind shares.
///
/// Returns `None` when the route references none of our gateways. The
/// returned route is attachable only if its parent refs and hostnames are
/// valid; rules are processed by the caller.
fn new_l7_route(
    source: L7RouteSource,
    parent_refs: Option<&[api::ParentReference]>,
    hostnames: Option<&[String]>,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> Option<L7Route> {
    let mut route = L7Route {
        source,
        hostnames: hostnames.map(<[_]>::to_vec).unwrap_or_default(),
        rules: Vec::new(),
        parent_refs: Vec::new(),
        conditions: Vec::new(),
        policies: Vec::new(),
        valid: false,
        attachable: false,
    };

    match parent_ref::build(
        parent_refs.unwrap_or_default(),
        route.source.namespace(),
        gateways,
    ) {
        Ok(refs) if refs.is_empty() => return None,
        Ok(refs) => route.parent_refs = refs,
        Err(error) => {
            route.conditions.push(conditions::route_unsupported_value(error));
            return Some(route);
        }
    }

    if let Some(msg) = validate_hostnames(&route.hostnames, &Path::new("spec").child("hostnames")) {
        route.conditions.push(conditions::route_unsupported_value(msg));
        return Some(route);
    }

    route.valid = true;
    route.attachable = true;
    Some(route)
}

/// Validates route hostnames, returning a capitalized message describing
/// every invalid one.
pub(crate) fn validate_hostnames(hostnames: &[String], path: &Path) -> Option<String> {
    let errs = hostnames
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            hostname::validate(h)
                .err()
                .map(|e| FieldError::invalid(path.index(i), h, e))
        })
        .collect::<ErrorList>();
    errs.aggregate().map(|msg| field::capitalize(&msg))
}

/// Turns the errors of every rule into route conditions, returning whether
/// the route is valid.
pub(crate) fn rule_conditions(errs: RuleErrors, at_least_one_valid: bool) -> (bool, Vec<Condition>) {
    let mut conds = Vec::with_capacity(2);
    let mut valid = true;

    if let Some(msg) = errs.warn.aggregate() {
        conds.push(conditions::route_accepted_unsupported_field(msg));
    }

    if let Some(msg) = errs.invalid.aggregate() {
        if at_least_one_valid {
            conds.push(conditions::route_partially_invalid(msg));
        } else {
            conds.push(conditions::route_unsupported_value(format!(
                "All rules are invalid: {msg}"
            )));
            valid = false;
        }
    }

    if let Some(msg) = errs.resolve.aggregate() {
        conds.push(conditions::route_resolved_refs_invalid_filter(field::capitalize(&msg)));
    }

    (valid, conds)
}

// === impl RouteKind ===

impl RouteKind {
    pub const ALL: [RouteKind; 5] = [
        RouteKind::Http,
        RouteKind::Grpc,
        RouteKind::Tls,
        RouteKind::Tcp,
        RouteKind::Udp,
    ];

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTPRoute",
            Self::Grpc => "GRPCRoute",
            Self::Tls => "TLSRoute",
            Self::Tcp => "TCPRoute",
            Self::Udp => "UDPRoute",
        }
    }
}

// === impl L7RouteKind ===

impl L7RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }

    pub fn route_kind(self) -> RouteKind {
        match self {
            Self::Http => RouteKind::Http,
            Self::Grpc => RouteKind::Grpc,
        }
    }
}

// === impl L4RouteKind ===

impl L4RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    pub fn route_kind(self) -> RouteKind {
        match self {
            Self::Tls => RouteKind::Tls,
            Self::Tcp => RouteKind::Tcp,
            Self::Udp => RouteKind::Udp,
        }
    }
}

// === impl RouteKey ===

impl RouteKey {
    pub fn new(id: ResourceId, kind: L7RouteKind) -> Self {
        Self { id, kind }
    }
}

// === impl L7RouteSource ===

impl L7RouteSource {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Http(r) => r.meta(),
            Self::Grpc(r) => r.meta(),
        }
    }

    pub fn kind(&self) -> L7RouteKind {
        match self {
            Self::Http(_) => L7RouteKind::Http,
            Self::Grpc(_) => L7RouteKind::Grpc,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            Self::Http(r) => ResourceId::of(r),
            Self::Grpc(r) => ResourceId::of(r),
        }
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

// === impl L7Route ===

impl L7Route {
    pub fn kind(&self) -> L7RouteKind {
        self.source.kind()
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.source.id(), self.kind())
    }

    /// Returns true if some parent ref of this route is attached to `gateway`.
    pub fn attached_to(&self, gateway: &ResourceId) -> bool {
        self.parent_refs.iter().any(|r| r.is_attached_to(gateway))
    }
}

// === impl L4RouteSource ===

impl L4RouteSource {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Tls(r) => r.meta(),
            Self::Tcp(r) => r.meta(),
            Self::Udp(r) => r.meta(),
        }
    }

    pub fn kind(&self) -> L4RouteKind {
        match self {
            Self::Tls(_) => L4RouteKind::Tls,
            Self::Tcp(_) => L4RouteKind::Tcp,
            Self::Udp(_) => L4RouteKind::Udp,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            Self::Tls(r) => ResourceId::of(r),
            Self::Tcp(r) => ResourceId::of(r),
            Self::Udp(r) => ResourceId::of(r),
        }
    }

    pub fn key(&self) -> L4RouteKey {
        L4RouteKey {
            id: self.id(),
            kind: self.kind(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

// === impl L4Route ===

impl L4Route {
    pub fn kind(&self) -> L4RouteKind {
        self.source.kind()
    }

    pub fn key(&self) -> L4RouteKey {
        self.source.key()
    }

    pub fn attached_to(&self, gateway: &ResourceId) -> bool {
        self.parent_refs.iter().any(|r| r.is_attached_to(gateway))
    }
}

// === impl RouteRule ===

impl RouteRule {
    pub fn is_valid(&self) -> bool {
        self.valid_matches && self.filters.valid
    }
}

// === impl RuleErrors ===

impl RuleErrors {
    pub(crate) fn append(&mut self, other: RuleErrors) {
        self.invalid.append(other.invalid);
        self.warn.append(other.warn);
        self.resolve.append(other.resolve);
    }
}
