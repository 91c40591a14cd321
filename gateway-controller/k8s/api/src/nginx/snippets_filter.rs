use crate::Condition;

/// SnippetsFilter is a filter that allows inserting NGINX configuration into
/// the generated NGINX config for HTTPRoute and GRPCRoute resources.
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
    kind = "SnippetsFilter",
    root = "SnippetsFilter",
    derive = "PartialEq",
    status = "SnippetsFilterStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SnippetsFilterSpec {
    /// Snippets is a list of NGINX configuration snippets. There can only be
    /// one snippet per context.
    pub snippets: Vec<Snippet>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Context is the NGINX context to insert the snippet into: `main`,
    /// `http`, `http.server` or `http.server.location`.
    pub context: String,

    /// Value is the NGINX configuration snippet.
    pub value: String,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SnippetsFilterStatus {
    pub controllers: Option<Vec<ControllerStatus>>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub controller_name: String,
    pub conditions: Option<Vec<Condition>>,
}
