use super::SecretObjectReference;
use crate::{Condition, LabelSelector};
use std::collections::BTreeMap;

/// Gateway represents an instance of a service-traffic handling
/// infrastructure by binding Listeners to a set of IP addresses.
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
    kind = "Gateway",
    root = "Gateway",
    derive = "PartialEq",
    status = "GatewayStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClassName used for this Gateway.
    pub gateway_class_name: String,

    /// Listeners associated with this Gateway. Listeners define logical
    /// endpoints that are bound on this Gateway's addresses.
    pub listeners: Vec<Listener>,

    /// Addresses requested for this Gateway. Only `IPAddress` addresses are
    /// supported.
    pub addresses: Option<Vec<GatewayAddress>>,

    /// Infrastructure defines infrastructure level attributes about this
    /// Gateway instance.
    pub infrastructure: Option<GatewayInfrastructure>,

    /// AllowedListeners defines which ListenerSets can be attached to this
    /// Gateway. Not supported.
    pub allowed_listeners: Option<AllowedListeners>,

    /// TLS specifies frontend and backend TLS configuration for the entire
    /// gateway.
    pub tls: Option<GatewayTlsConfig>,
}

/// Listener embodies the concept of a logical endpoint where a Gateway
/// accepts network connections.
#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Name is the name of the Listener. This name MUST be unique within a
    /// Gateway.
    pub name: String,

    /// Hostname specifies the virtual hostname to match for protocol types
    /// that define this concept. It is ignored for TCP and UDP.
    pub hostname: Option<String>,

    pub port: i32,

    /// Protocol specifies the network protocol this listener expects to
    /// receive: `HTTP`, `HTTPS`, `TLS`, `TCP` or `UDP`.
    pub protocol: String,

    pub tls: Option<ListenerTlsConfig>,

    /// AllowedRoutes defines the types of routes that MAY be attached to a
    /// Listener and the trusted namespaces where those Route resources MAY be
    /// present.
    pub allowed_routes: Option<AllowedRoutes>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ListenerTlsConfig {
    /// Mode defaults to `Terminate`.
    pub mode: Option<TlsModeType>,
    pub certificate_refs: Option<Vec<SecretObjectReference>>,
    pub options: Option<BTreeMap<String, String>>,
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub enum TlsModeType {
    Terminate,
    Passthrough,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    pub namespaces: Option<RouteNamespaces>,
    pub kinds: Option<Vec<RouteGroupKind>>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// From defaults to `Same`.
    pub from: Option<FromNamespaces>,

    /// Selector must be set when `from` is `Selector`.
    pub selector: Option<LabelSelector>,
}

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub enum FromNamespaces {
    All,
    Same,
    Selector,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupKind {
    pub group: Option<String>,
    pub kind: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAddress {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub value: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfrastructure {
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,

    /// ParametersRef names an `NginxProxy` in the Gateway's namespace.
    pub parameters_ref: Option<LocalParametersReference>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct LocalParametersReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AllowedListeners {
    pub namespaces: Option<ListenerNamespaces>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ListenerNamespaces {
    pub from: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// Backend describes TLS configuration for connections from the Gateway
    /// to backends.
    pub backend: Option<GatewayBackendTls>,

    /// Frontend describes TLS config when client connects to Gateway. Not
    /// supported.
    pub frontend: Option<serde_json::Value>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayBackendTls {
    pub client_certificate_ref: Option<SecretObjectReference>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub addresses: Option<Vec<GatewayAddress>>,
    pub conditions: Option<Vec<Condition>>,
}
