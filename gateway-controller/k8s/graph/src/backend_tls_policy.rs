use crate::{
    config_map::ConfigMapResolver,
    gateway::Gateway,
    policy_ancestor,
    secret::SecretResolver,
    service::ReferencedService,
};
use nginx_gateway_controller_core::{
    conditions, hostname, Condition, FieldError, Path, ResourceId,
};
use nginx_gateway_controller_k8s_api::gateway as api;
use std::collections::{BTreeMap, BTreeSet};

pub const KIND: &str = "BackendTLSPolicy";

const WELL_KNOWN_CA_SYSTEM: &str = "System";
const CA_CERT_KINDS: [&str; 2] = ["ConfigMap", "Secret"];

#[derive(Clone, Debug, PartialEq)]
pub struct BackendTlsPolicy {
    pub source: api::BackendTlsPolicy,

    /// The ConfigMap or Secret holding the CA certificate, set only for a
    /// valid policy that references one.
    pub ca_cert_ref: Option<ResourceId>,

    /// The gateways the policy applies to, within the ancestor limit.
    pub gateways: Vec<ResourceId>,
    pub conditions: Vec<Condition>,
    pub valid: bool,

    /// Set once a backend ref selects this policy, even when it loses a
    /// conflict.
    pub is_referenced: bool,
}

/// Validates every BackendTLSPolicy. Nothing is processed without a gateway
/// to apply policies to.
pub(crate) fn process(
    policies: &BTreeMap<ResourceId, api::BackendTlsPolicy>,
    config_maps: &mut ConfigMapResolver<'_>,
    secrets: &mut SecretResolver<'_>,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> BTreeMap<ResourceId, BackendTlsPolicy> {
    if policies.is_empty() || gateways.is_empty() {
        return BTreeMap::new();
    }

    policies
        .iter()
        .map(|(id, source)| {
            let conditions = validate(source, &id.namespace, config_maps, secrets);
            let valid = conditions.is_empty();
            let ca_cert_ref = source
                .spec
                .validation
                .ca_certificate_refs
                .as_ref()
                .and_then(|refs| refs.first())
                .filter(|_| valid)
                .map(|r| ResourceId::new(id.namespace.clone(), r.name.clone()));
            if !valid {
                tracing::debug!(policy = %id, "BackendTLSPolicy is invalid");
            }

            let policy = BackendTlsPolicy {
                source: source.clone(),
                ca_cert_ref,
                gateways: Vec::new(),
                conditions,
                valid,
                is_referenced: false,
            };
            (id.clone(), policy)
        })
        .collect()
}

fn validate(
    policy: &api::BackendTlsPolicy,
    ns: &str,
    config_maps: &mut ConfigMapResolver<'_>,
    secrets: &mut SecretResolver<'_>,
) -> Vec<Condition> {
    let mut conds = Vec::new();
    let validation = &policy.spec.validation;

    if let Err(e) = hostname::validate(&validation.hostname) {
        let err = FieldError::invalid(Path::new("tls.hostname"), &validation.hostname, e);
        conds.push(conditions::policy_invalid(format!("invalid hostname: {err}")));
    }

    let ca_refs = validation.ca_certificate_refs.as_deref().unwrap_or_default();
    match (ca_refs.is_empty(), validation.well_known_ca_certificates.as_deref()) {
        (false, Some(_)) => conds.push(conditions::policy_invalid(
            "CACertificateRefs and WellKnownCACertificates are mutually exclusive",
        )),
        (false, None) => {
            if let Err(err) = validate_ca_cert_ref(ca_refs, ns, config_maps, secrets) {
                conds.push(conditions::policy_invalid(format!(
                    "invalid CACertificateRef: {err}"
                )));
            }
        }
        (true, Some(well_known)) if well_known != WELL_KNOWN_CA_SYSTEM => {
            let err = FieldError::not_supported(
                Path::new("tls.wellknowncacertificates"),
                well_known,
                [WELL_KNOWN_CA_SYSTEM],
            );
            conds.push(conditions::policy_invalid(format!(
                "invalid WellKnownCACertificates: {err}"
            )));
        }
        (true, Some(_)) => {}
        (true, None) => conds.push(conditions::policy_invalid(
            "CACertRefs and WellKnownCACerts are both nil",
        )),
    }

    conds
}

fn validate_ca_cert_ref(
    refs: &[api::LocalObjectReference],
    ns: &str,
    config_maps: &mut ConfigMapResolver<'_>,
    secrets: &mut SecretResolver<'_>,
) -> Result<(), FieldError> {
    let path = Path::new("validation.caCertificateRefs");
    if refs.len() != 1 {
        return Err(FieldError::too_many(path, refs.len(), 1));
    }

    let cert_ref = &refs[0];
    let path = path.index(0);
    if !CA_CERT_KINDS.contains(&cert_ref.kind.as_str()) {
        return Err(FieldError::not_supported(
            path.child("kind"),
            &cert_ref.kind,
            CA_CERT_KINDS,
        ));
    }
    if !cert_ref.group.is_empty() && cert_ref.group != "core" {
        return Err(FieldError::not_supported(
            path.child("group"),
            &cert_ref.group,
            ["", "core"],
        ));
    }

    let id = ResourceId::new(ns.to_string(), cert_ref.name.clone());
    let error = if cert_ref.kind == "ConfigMap" {
        config_maps.resolve(&id).error.as_ref().map(ToString::to_string)
    } else {
        secrets.resolve(&id).error.as_ref().map(ToString::to_string)
    };
    match error {
        Some(e) => Err(FieldError::invalid(path, &cert_ref.name, e)),
        None => Ok(()),
    }
}

/// Records the gateways each policy applies to: those that reach one of the
/// policy's target Services. Gateways already listed in the policy's status
/// keep priority when the ancestor limit is reached.
pub(crate) fn add_gateways(
    policies: &mut BTreeMap<ResourceId, BackendTlsPolicy>,
    services: &BTreeMap<ResourceId, ReferencedService>,
    controller_name: &str,
    gateways: &mut BTreeMap<ResourceId, Gateway>,
) {
    for (id, policy) in policies.iter_mut() {
        let status = policy.source.status.as_ref();
        let existing = policy_ancestor::existing_gateway_ancestors(status, controller_name)
            .into_iter()
            .collect::<BTreeSet<_>>();
        let ordered = policy_ancestor::order_gateways(
            target_gateways(&policy.source, &id.namespace, services),
            &existing,
            gateways,
        );

        policy.gateways =
            policy_ancestor::admit_gateways(ordered, status, controller_name, id, KIND, gateways);
    }
}

/// The gateways that reach the target Services, in target order.
fn target_gateways(
    policy: &api::BackendTlsPolicy,
    ns: &str,
    services: &BTreeMap<ResourceId, ReferencedService>,
) -> Vec<ResourceId> {
    policy
        .spec
        .target_refs
        .iter()
        .filter(|t| t.kind == crate::backend_ref::SERVICE_KIND)
        .filter_map(|t| services.get(&ResourceId::new(ns.to_string(), t.name.clone())))
        .flat_map(|svc| svc.gateways.iter().cloned())
        .collect()
}
