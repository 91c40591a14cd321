use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api::{
    self as k8s,
    gateway::{
        BackendTlsPolicy, Gateway, GatewayClass, GrpcRoute, HttpRoute, ReferenceGrant, TcpRoute,
        TlsRoute, UdpRoute,
    },
    inference::InferencePool,
    nginx::{
        AuthenticationFilter, ClientSettingsPolicy, NginxProxy, ObservabilityPolicy,
        SnippetsFilter, UpstreamSettingsPolicy,
    },
};
use std::collections::BTreeMap;

/// Every resource the graph is built from, keyed by identity.
///
/// Namespaces and GatewayClasses are cluster-scoped and are keyed with an
/// empty namespace.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub gateway_classes: BTreeMap<ResourceId, GatewayClass>,
    pub gateways: BTreeMap<ResourceId, Gateway>,
    pub http_routes: BTreeMap<ResourceId, HttpRoute>,
    pub grpc_routes: BTreeMap<ResourceId, GrpcRoute>,
    pub tls_routes: BTreeMap<ResourceId, TlsRoute>,
    pub tcp_routes: BTreeMap<ResourceId, TcpRoute>,
    pub udp_routes: BTreeMap<ResourceId, UdpRoute>,
    pub services: BTreeMap<ResourceId, k8s::Service>,
    pub secrets: BTreeMap<ResourceId, k8s::Secret>,
    pub config_maps: BTreeMap<ResourceId, k8s::ConfigMap>,
    pub namespaces: BTreeMap<ResourceId, k8s::Namespace>,
    pub backend_tls_policies: BTreeMap<ResourceId, BackendTlsPolicy>,
    pub reference_grants: BTreeMap<ResourceId, ReferenceGrant>,
    pub inference_pools: BTreeMap<ResourceId, InferencePool>,
    pub nginx_proxies: BTreeMap<ResourceId, NginxProxy>,
    pub snippets_filters: BTreeMap<ResourceId, SnippetsFilter>,
    pub authentication_filters: BTreeMap<ResourceId, AuthenticationFilter>,
    pub client_settings_policies: BTreeMap<ResourceId, ClientSettingsPolicy>,
    pub observability_policies: BTreeMap<ResourceId, ObservabilityPolicy>,
    pub upstream_settings_policies: BTreeMap<ResourceId, UpstreamSettingsPolicy>,
}

impl Snapshot {
    /// Inserts a resource into `map` under its own identity.
    pub fn insert<T>(map: &mut BTreeMap<ResourceId, T>, resource: T)
    where
        T: k8s::Resource,
    {
        map.insert(ResourceId::of(&resource), resource);
    }
}
