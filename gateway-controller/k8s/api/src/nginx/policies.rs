use crate::gateway::{LocalPolicyTargetReference, PolicyStatus};

/// ClientSettingsPolicy configures how NGINX handles client connections for
/// a Gateway, HTTPRoute or GRPCRoute.
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
    group = "gateway.nginx.org",
    version = "v1alpha1",
    kind = "ClientSettingsPolicy",
    root = "ClientSettingsPolicy",
    derive = "PartialEq",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettingsPolicySpec {
    pub target_ref: LocalPolicyTargetReference,
    pub body: Option<ClientBody>,
    pub keep_alive: Option<ClientKeepAlive>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ClientBody {
    /// MaxSize sets `client_max_body_size`, as an NGINX size.
    pub max_size: Option<String>,

    /// Timeout sets `client_body_timeout`, as an NGINX duration.
    pub timeout: Option<String>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ClientKeepAlive {
    pub requests: Option<i32>,
    pub time: Option<String>,
    pub timeout: Option<ClientKeepAliveTimeout>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ClientKeepAliveTimeout {
    pub server: Option<String>,
    pub header: Option<String>,
}

/// ObservabilityPolicy configures tracing for HTTPRoutes and GRPCRoutes.
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
    group = "gateway.nginx.org",
    version = "v1alpha2",
    kind = "ObservabilityPolicy",
    root = "ObservabilityPolicy",
    derive = "PartialEq",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityPolicySpec {
    pub target_refs: Vec<LocalPolicyTargetReference>,
    pub tracing: Option<Tracing>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Tracing {
    /// Strategy is `ratio` or `parent`.
    pub strategy: String,

    /// Ratio is the percentage of traffic traced, between 0 and 100. Only
    /// valid with the `ratio` strategy.
    pub ratio: Option<i32>,

    /// Context is one of `extract`, `inject`, `propagate` or `ignore`.
    pub context: Option<String>,
    pub span_name: Option<String>,
    pub span_attributes: Option<Vec<super::SpanAttribute>>,
}

/// UpstreamSettingsPolicy configures connections between NGINX and the
/// upstream Services it targets.
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
    group = "gateway.nginx.org",
    version = "v1alpha1",
    kind = "UpstreamSettingsPolicy",
    root = "UpstreamSettingsPolicy",
    derive = "PartialEq",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSettingsPolicySpec {
    pub target_refs: Vec<LocalPolicyTargetReference>,

    /// ZoneSize is the size of the shared memory zone, as an NGINX size.
    pub zone_size: Option<String>,
    pub keep_alive: Option<UpstreamKeepAlive>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamKeepAlive {
    pub connections: Option<i32>,
    pub requests: Option<i32>,
    pub time: Option<String>,
    pub timeout: Option<String>,
}
