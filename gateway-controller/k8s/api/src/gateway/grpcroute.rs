use super::{
    BackendObjectReference, HttpHeaderMatch, HttpHeaderModifier, HttpRequestMirrorFilter,
    LocalObjectReference, ParentReference, RouteStatus, SessionPersistence,
};

/// GRPCRoute provides a way to route gRPC requests. This includes the
/// capability to match requests by hostname, gRPC service, gRPC method, or
/// HTTP/2 header.
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
    version = "v1",
    kind = "GRPCRoute",
    root = "GrpcRoute",
    derive = "PartialEq",
    status = "RouteStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteSpec {
    pub parent_refs: Option<Vec<ParentReference>>,
    pub hostnames: Option<Vec<String>>,
    pub rules: Option<Vec<GrpcRouteRule>>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteRule {
    pub name: Option<String>,
    pub matches: Option<Vec<GrpcRouteMatch>>,
    pub filters: Option<Vec<GrpcRouteFilter>>,
    pub backend_refs: Option<Vec<GrpcBackendRef>>,
    pub session_persistence: Option<SessionPersistence>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteMatch {
    pub method: Option<GrpcMethodMatch>,
    pub headers: Option<Vec<HttpHeaderMatch>>,
}

/// Matches a gRPC request by service and method name.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcMethodMatch {
    /// Type defaults to `Exact`.
    #[serde(rename = "type")]
    pub type_: Option<GrpcMethodMatchType>,
    pub service: Option<String>,
    pub method: Option<String>,
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub enum GrpcMethodMatchType {
    Exact,
    RegularExpression,
}

#[derive(
    Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum GrpcRouteFilter {
    #[serde(rename_all = "camelCase")]
    RequestHeaderModifier {
        request_header_modifier: HttpHeaderModifier,
    },

    #[serde(rename_all = "camelCase")]
    ResponseHeaderModifier {
        response_header_modifier: HttpHeaderModifier,
    },

    #[serde(rename_all = "camelCase")]
    RequestMirror {
        request_mirror: HttpRequestMirrorFilter,
    },

    #[serde(rename_all = "camelCase")]
    ExtensionRef { extension_ref: LocalObjectReference },
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcBackendRef {
    #[serde(flatten)]
    pub inner: BackendObjectReference,
    pub weight: Option<i32>,
    pub filters: Option<Vec<GrpcRouteFilter>>,
}
