use crate::Condition;

/// GatewayClass describes a class of Gateways available to the user for
/// creating Gateway resources.
///
/// It is cluster-scoped. Only classes naming this controller in
/// `controllerName` are considered.
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
    kind = "GatewayClass",
    root = "GatewayClass",
    derive = "PartialEq",
    status = "GatewayClassStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassSpec {
    /// ControllerName is the name of the controller that is managing Gateways
    /// of this class.
    pub controller_name: String,

    /// ParametersRef is a reference to a resource that contains the
    /// configuration parameters corresponding to the GatewayClass. This
    /// controller supports an `NginxProxy` in group `gateway.nginx.org`.
    pub parameters_ref: Option<ParametersReference>,

    pub description: Option<String>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ParametersReference {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClassStatus {
    pub conditions: Option<Vec<Condition>>,
}
