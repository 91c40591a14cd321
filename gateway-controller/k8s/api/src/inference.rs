//! Gateway API Inference Extension resources.

use crate::Condition;
use std::collections::BTreeMap;

pub const GROUP: &str = "inference.networking.k8s.io";

/// InferencePool is the Schema for the InferencePools API. It names a set of
/// model-serving endpoints and the endpoint picker that chooses among them.
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
    group = "inference.networking.k8s.io",
    version = "v1",
    kind = "InferencePool",
    root = "InferencePool",
    derive = "PartialEq",
    status = "InferencePoolStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolSpec {
    /// Selector determines which Pods are members of this pool.
    pub selector: LabelSelector,

    /// TargetPorts defines the ports the model servers listen on. Only the
    /// first port is used.
    pub target_ports: Vec<Port>,

    /// EndpointPickerRef is a reference to the endpoint picker extension.
    pub endpoint_picker_ref: EndpointPickerRef,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub number: i32,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPickerRef {
    pub group: Option<String>,

    /// Kind defaults to `Service`, which is the only supported kind.
    pub kind: Option<String>,
    pub name: String,
    pub port: Option<Port>,

    /// FailureMode is `FailOpen` or `FailClose` (the default).
    pub failure_mode: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolStatus {
    pub parents: Option<Vec<InferencePoolParentStatus>>,
}

#[derive(
    Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolParentStatus {
    pub parent_ref: crate::gateway::ParentReference,
    pub conditions: Vec<Condition>,
}
