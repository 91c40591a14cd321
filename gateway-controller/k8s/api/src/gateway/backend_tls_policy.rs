use super::{LocalObjectReference, LocalPolicyTargetReferenceWithSectionName, Options, PolicyStatus};

/// BackendTLSPolicy provides a way to configure how a Gateway connects to a
/// backend via TLS.
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
    kind = "BackendTLSPolicy",
    root = "BackendTlsPolicy",
    derive = "PartialEq",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTlsPolicySpec {
    /// TargetRefs identifies the Services this policy applies to. A
    /// `sectionName` restricts the policy to the named Service port.
    pub target_refs: Vec<LocalPolicyTargetReferenceWithSectionName>,

    pub validation: BackendTlsPolicyValidation,

    pub options: Option<Options>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTlsPolicyValidation {
    /// CACertificateRefs contains one or more references to ConfigMaps or
    /// Secrets holding a `ca.crt` PEM bundle. Only a single reference is
    /// supported.
    pub ca_certificate_refs: Option<Vec<LocalObjectReference>>,

    /// WellKnownCACertificates specifies whether system CA certificates may
    /// be used. Only `System` is recognized. Mutually exclusive with
    /// `caCertificateRefs`.
    #[serde(rename = "wellKnownCACertificates")]
    pub well_known_ca_certificates: Option<String>,

    /// Hostname is used for SNI and certificate verification.
    pub hostname: String,

    pub subject_alt_names: Option<Vec<SubjectAltName>>,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAltName {
    #[serde(rename = "type")]
    pub type_: String,
    pub hostname: Option<String>,
    pub uri: Option<String>,
}
