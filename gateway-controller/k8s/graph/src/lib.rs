//! NGINX Gateway Fabric resource graph
//!
//! The graph builder turns a snapshot of cluster resources into a graph of validated nodes that
//! the data plane configuration is generated from. Each node records whether it is valid, the
//! conditions that explain its status, and identifiers for the nodes it is linked to:
//!
//! ```text
//! [ GatewayClass ] <- [ Gateway ] -> [ Listener ] <- [ Route ] -> [ BackendRef ] -> [ Service ]
//!                         ^                              ^                              ^
//!                         +-------------- [ Policy ] ----+------------------------------+
//! ```
//!
//! A build is a pure function of its inputs. Every output map is ordered by resource identity and
//! every order-dependent decision (conflict winners, ancestor lists, contested listener ports) is
//! made oldest first, so building the same snapshot twice yields the same graph.
//!
//! Resources are built in a fixed order. Gateways and their listeners come first, then routes,
//! which are built without regard to listeners and only then bound to them. Backends are resolved
//! before binding so that per-gateway backend failures can be reported on the parent refs that
//! bind to each gateway. Policies are attached last, once it is known which gateways each route
//! and Service is reachable from.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authentication_filter;
pub mod backend_ref;
pub mod backend_tls_policy;
mod config;
pub mod config_map;
pub mod extension_ref;
pub mod gateway;
pub mod gateway_class;
pub mod inference_pool;
pub mod listener;
mod metrics;
mod namespace;
pub mod nginx_proxy;
pub mod policy;
pub mod policy_ancestor;
pub mod reference_grant;
pub mod route;
pub mod secret;
pub mod service;
mod snapshot;
pub mod snippets_filter;
pub mod validation;


pub use self::{
    config::{Config, FeatureFlags},
    metrics::GraphMetrics,
    snapshot::Snapshot,
};
use self::{
    authentication_filter::AuthenticationFilter,
    backend_ref::BackendRefContext,
    backend_tls_policy::BackendTlsPolicy,
    config_map::{ConfigMapResolver, ResolvedConfigMap},
    gateway::{Gateway, GatewayContext},
    gateway_class::GatewayClass,
    inference_pool::ReferencedInferencePool,
    nginx_proxy::NginxProxy,
    policy::{Policy, PolicyContext, PolicyKey, PolicySources},
    reference_grant::RefGrantResolver,
    route::{L4Route, L4RouteContext, L4RouteKey, L7Route, L7RouteContext, RouteKey},
    secret::{ResolvedSecret, SecretResolver},
    service::ReferencedService,
    snippets_filter::SnippetsFilter,
};
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api::{gateway as api, Namespace};
use std::collections::{BTreeMap, BTreeSet};

/// The resources of a snapshot that belong to our GatewayClass, validated
/// and linked to one another.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    /// The GatewayClass named by the configuration, if it names our
    /// controller.
    pub gateway_class: Option<GatewayClass>,

    /// Other GatewayClasses that name our controller.
    pub ignored_gateway_classes: BTreeMap<ResourceId, api::GatewayClass>,

    /// Every Gateway of our GatewayClass. Without a valid class, all of them
    /// are invalid.
    pub gateways: BTreeMap<ResourceId, Gateway>,

    /// HTTPRoutes and GRPCRoutes referencing our gateways, including the
    /// internal routes generated for RequestMirror filters.
    pub routes: BTreeMap<RouteKey, L7Route>,
    pub l4_routes: BTreeMap<L4RouteKey, L4Route>,

    /// The ReferenceGrants that permitted at least one reference.
    pub reference_grants_used: BTreeSet<ResourceId>,
    pub backend_tls_policies: BTreeMap<ResourceId, BackendTlsPolicy>,
    pub nginx_proxies: BTreeMap<ResourceId, NginxProxy>,
    pub snippets_filters: BTreeMap<ResourceId, SnippetsFilter>,
    pub authentication_filters: BTreeMap<ResourceId, AuthenticationFilter>,

    pub referenced_services: BTreeMap<ResourceId, ReferencedService>,
    pub referenced_inference_pools: BTreeMap<ResourceId, ReferencedInferencePool>,

    /// Every Secret looked up during the build, whether or not it resolved.
    pub referenced_secrets: BTreeMap<ResourceId, ResolvedSecret>,

    /// Every ConfigMap looked up during the build, whether or not it
    /// resolved.
    pub referenced_config_maps: BTreeMap<ResourceId, ResolvedConfigMap>,

    /// Namespaces selected by the `allowedRoutes` of some listener.
    pub referenced_namespaces: BTreeMap<ResourceId, Namespace>,
    pub ngf_policies: BTreeMap<PolicyKey, Policy>,
}

/// Builds the graph for `snapshot`.
pub fn build(snapshot: &Snapshot, config: &Config) -> Graph {
    let _span = tracing::info_span!("build_graph").entered();
    let features = config.feature_flags();

    let ref_grants = RefGrantResolver::new(&snapshot.reference_grants);
    let mut secrets = SecretResolver::new(&snapshot.secrets);
    let mut config_maps = ConfigMapResolver::new(&snapshot.config_maps);

    let classes = gateway_class::process(
        &snapshot.gateway_classes,
        &config.gateway_class_name,
        &config.controller_name,
    );
    let our_gateways = gateway::process(&snapshot.gateways, &config.gateway_class_name);
    let nginx_proxies = nginx_proxy::process(&snapshot.nginx_proxies, classes.winner, &our_gateways);
    let gateway_class = classes
        .winner
        .map(|gc| gateway_class::build(gc, &nginx_proxies));
    if gateway_class.is_none() {
        tracing::debug!(class = %config.gateway_class_name, "GatewayClass not found");
    }

    let mut gateways = gateway::build_all(
        &our_gateways,
        GatewayContext {
            class: gateway_class.as_ref(),
            proxies: &nginx_proxies,
            ref_grants: &ref_grants,
            secrets: &mut secrets,
            features,
        },
    );
    tracing::trace!(gateways = gateways.len(), "Built gateways");

    let mut snippets_filters = snippets_filter::process(&snapshot.snippets_filters);
    let mut authentication_filters =
        authentication_filter::process(&snapshot.authentication_filters, &mut secrets);

    let mut routes = route::build_l7_routes(
        &snapshot.http_routes,
        &snapshot.grpc_routes,
        &snapshot.inference_pools,
        L7RouteContext {
            gateways: &gateways,
            snippets: &mut snippets_filters,
            authentication: &mut authentication_filters,
            features,
        },
    );
    let mut l4_routes = route::build_l4_routes(
        &snapshot.tls_routes,
        &snapshot.tcp_routes,
        &snapshot.udp_routes,
        &L4RouteContext {
            gateways: &gateways,
            services: &snapshot.services,
            ref_grants: &ref_grants,
        },
    );
    tracing::trace!(routes = routes.len(), l4_routes = l4_routes.len(), "Built routes");

    let referenced_inference_pools = inference_pool::build_referenced(
        &routes,
        &gateways,
        &snapshot.inference_pools,
        &snapshot.services,
    );

    let mut backend_tls_policies = backend_tls_policy::process(
        &snapshot.backend_tls_policies,
        &mut config_maps,
        &mut secrets,
        &gateways,
    );

    backend_ref::add_backend_refs_to_routes(
        &mut routes,
        &mut BackendRefContext {
            services: &snapshot.services,
            ref_grants: &ref_grants,
            inference_pools: &referenced_inference_pools,
            backend_tls_policies: &mut backend_tls_policies,
        },
    );

    route::bind_routes(&mut routes, &mut l4_routes, &mut gateways, &snapshot.namespaces);
    tracing::trace!("Bound routes");

    let mut referenced_services =
        service::build_referenced(&routes, &l4_routes, &gateways, &snapshot.services);

    backend_tls_policy::add_gateways(
        &mut backend_tls_policies,
        &referenced_services,
        &config.controller_name,
        &mut gateways,
    );

    let ngf_policies = policy::process(
        PolicySources {
            client_settings: &snapshot.client_settings_policies,
            observability: &snapshot.observability_policies,
            upstream_settings: &snapshot.upstream_settings_policies,
        },
        PolicyContext {
            gateways: &mut gateways,
            routes: &mut routes,
            services: &mut referenced_services,
            controller_name: &config.controller_name,
        },
    );
    tracing::trace!(policies = ngf_policies.len(), "Attached policies");

    let referenced_namespaces = namespace::build_referenced(&snapshot.namespaces, &gateways);

    Graph {
        gateway_class,
        ignored_gateway_classes: classes.ignored,
        gateways,
        routes,
        l4_routes,
        reference_grants_used: ref_grants.into_used(),
        backend_tls_policies,
        nginx_proxies,
        snippets_filters,
        authentication_filters,
        referenced_services,
        referenced_inference_pools,
        referenced_secrets: secrets.into_resolved(),
        referenced_config_maps: config_maps.into_resolved(),
        referenced_namespaces,
        ngf_policies,
    }
}
