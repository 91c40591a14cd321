use super::ControllerStatus;

/// AuthenticationFilter configures request authentication for the routes
/// that reference it through an `ExtensionRef` filter.
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
    kind = "AuthenticationFilter",
    root = "AuthenticationFilter",
    derive = "PartialEq",
    status = "AuthenticationFilterStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationFilterSpec {
    /// Type is the authentication scheme. Only `Basic` is supported.
    #[serde(rename = "type")]
    pub type_: String,

    pub basic: Option<BasicAuth>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    /// SecretRef names an `nginx.org/htpasswd` Secret in the filter's
    /// namespace. The Secret must carry the key `auth`.
    pub secret_ref: SecretRef,

    pub realm: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationFilterStatus {
    pub controllers: Option<Vec<ControllerStatus>>,
}
