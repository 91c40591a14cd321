use super::{BackendRef, ParentReference, RouteStatus};

/// TLSRoute routes TLS connections by SNI to a backend without terminating
/// them.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "TLSRoute",
    root = "TlsRoute",
    derive = "PartialEq",
    status = "RouteStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TlsRouteSpec {
    pub parent_refs: Option<Vec<ParentReference>>,

    /// Hostnames are matched against the SNI of the TLS ClientHello.
    pub hostnames: Option<Vec<String>>,

    #[serde(default)]
    pub rules: Vec<L4RouteRule>,
}

/// TCPRoute forwards TCP connections to a set of weighted backends.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "TCPRoute",
    root = "TcpRoute",
    derive = "PartialEq",
    status = "RouteStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TcpRouteSpec {
    pub parent_refs: Option<Vec<ParentReference>>,

    #[serde(default)]
    pub rules: Vec<L4RouteRule>,
}

/// UDPRoute forwards UDP datagrams to a set of weighted backends.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "UDPRoute",
    root = "UdpRoute",
    derive = "PartialEq",
    status = "RouteStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UdpRouteSpec {
    pub parent_refs: Option<Vec<ParentReference>>,

    #[serde(default)]
    pub rules: Vec<L4RouteRule>,
}

/// A rule shared by TLS, TCP and UDP routes: a name and a list of backends.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct L4RouteRule {
    pub name: Option<String>,

    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}
