//! Status conditions produced while building the graph.
//!
//! Every node in the graph accumulates an ordered list of conditions. The
//! constructors here fix the condition type, status and reason for each
//! outcome so that the graph builder only supplies the message.

use std::fmt;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Condition {
    pub type_: &'static str,
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ConditionStatus {
    True,
    False,
}

pub mod types {
    pub const ACCEPTED: &str = "Accepted";
    pub const PROGRAMMED: &str = "Programmed";
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    pub const CONFLICTED: &str = "Conflicted";
    pub const PARTIALLY_INVALID: &str = "PartiallyInvalid";
    pub const POLICY_AFFECTED: &str = "PolicyAffected";
}

pub mod reasons {
    pub const ACCEPTED: &str = "Accepted";
    pub const PROGRAMMED: &str = "Programmed";
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    pub const INVALID: &str = "Invalid";
    pub const UNSUPPORTED_VALUE: &str = "UnsupportedValue";
    pub const UNSUPPORTED_FIELD: &str = "UnsupportedField";
    pub const UNSUPPORTED_PROTOCOL: &str = "UnsupportedProtocol";
    pub const UNSUPPORTED_ADDRESS: &str = "UnsupportedAddress";
    pub const UNSUPPORTED_CONFIGURATION: &str = "UnsupportedConfiguration";
    pub const INVALID_KIND: &str = "InvalidKind";
    pub const REF_NOT_PERMITTED: &str = "RefNotPermitted";
    pub const BACKEND_NOT_FOUND: &str = "BackendNotFound";
    pub const INVALID_IP_FAMILY: &str = "InvalidIPFamily";
    pub const INVALID_FILTER: &str = "InvalidFilter";
    pub const INVALID_INFERENCE_POOL: &str = "InvalidInferencePool";
    pub const NO_MATCHING_PARENT: &str = "NoMatchingParent";
    pub const NOT_ALLOWED_BY_LISTENERS: &str = "NotAllowedByListeners";
    pub const NO_MATCHING_LISTENER_HOSTNAME: &str = "NoMatchingListenerHostname";
    pub const HOSTNAME_CONFLICT: &str = "HostnameConflict";
    pub const PROTOCOL_CONFLICT: &str = "ProtocolConflict";
    pub const MULTIPLE_ROUTES_ON_LISTENER: &str = "MultipleRoutesOnListener";
    pub const INVALID_LISTENER: &str = "InvalidListener";
    pub const INVALID_GATEWAY: &str = "InvalidGateway";
    pub const INVALID_CERTIFICATE_REF: &str = "InvalidCertificateRef";
    pub const INVALID_CLIENT_CERTIFICATE_REF: &str = "InvalidClientCertificateRef";
    pub const INVALID_ROUTE_KINDS: &str = "InvalidRouteKinds";
    pub const INVALID_PARAMETERS: &str = "InvalidParameters";
    pub const PARAMETERS_REF_INVALID: &str = "ParametersRefInvalid";
    pub const PARAMETERS_REF_NOT_FOUND: &str = "ParametersRefNotFound";
    pub const GATEWAY_CLASS_CONFLICT: &str = "GatewayClassConflict";
    pub const CONFLICTED: &str = "Conflicted";
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";
    pub const ANCESTOR_LIMIT_REACHED: &str = "AncestorLimitReached";
    pub const NGINX_PROXY_CONFIG_NOT_SET: &str = "NginxProxyConfigNotSet";
    pub const INVALID_EXTENSION_REF: &str = "InvalidExtensionRef";
    pub const HTTP_ROUTE_NOT_ACCEPTED: &str = "HTTPRouteNotAccepted";
}

use self::{reasons as r, types as t};

// === impl ConditionStatus ===

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => "True".fmt(f),
            Self::False => "False".fmt(f),
        }
    }
}

// === impl Condition ===

impl Condition {
    fn new(
        type_: &'static str,
        status: ConditionStatus,
        reason: &'static str,
        message: impl ToString,
    ) -> Self {
        Self {
            type_,
            status,
            reason,
            message: message.to_string(),
        }
    }

    fn truthy(type_: &'static str, reason: &'static str, message: impl ToString) -> Self {
        Self::new(type_, ConditionStatus::True, reason, message)
    }

    fn falsy(type_: &'static str, reason: &'static str, message: impl ToString) -> Self {
        Self::new(type_, ConditionStatus::False, reason, message)
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Appends `cond` unless an identical condition is already present.
pub fn push_unique(conds: &mut Vec<Condition>, cond: Condition) {
    if !conds.contains(&cond) {
        conds.push(cond);
    }
}

/// Returns true if any condition carries `reason`.
pub fn has_reason(conds: &[Condition], reason: &str) -> bool {
    conds.iter().any(|c| c.reason == reason)
}

// === Routes ===

pub fn route_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "The Route is accepted")
}

pub fn route_unsupported_value(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_VALUE, msg)
}

pub fn route_partially_invalid(msg: impl ToString) -> Condition {
    Condition::truthy(t::PARTIALLY_INVALID, r::UNSUPPORTED_VALUE, msg)
}

pub fn route_accepted_unsupported_field(msg: impl ToString) -> Condition {
    Condition::truthy(t::ACCEPTED, r::UNSUPPORTED_FIELD, msg)
}

pub fn route_invalid_gateway() -> Condition {
    Condition::falsy(t::ACCEPTED, r::INVALID_GATEWAY, "Gateway is invalid")
}

pub fn route_no_matching_parent() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::NO_MATCHING_PARENT,
        "Listener is not found for this parent ref",
    )
}

pub fn route_not_allowed_by_listeners() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::NOT_ALLOWED_BY_LISTENERS,
        "Route is not allowed by any listener",
    )
}

pub fn route_no_matching_listener_hostname() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::NO_MATCHING_LISTENER_HOSTNAME,
        "Listener hostname does not match the Route hostnames",
    )
}

pub fn route_hostname_conflict() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::HOSTNAME_CONFLICT,
        "Hostname(s) conflict with another Route of the same kind on the same port",
    )
}

pub fn route_multiple_routes_on_listener() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::MULTIPLE_ROUTES_ON_LISTENER,
        "Multiple Routes are attached to a TCP or UDP listener; only one Route per port is supported",
    )
}

pub fn route_invalid_listener() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::INVALID_LISTENER,
        "Listener is invalid for this parent ref",
    )
}

pub fn route_invalid_ip_family(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::INVALID_IP_FAMILY, msg)
}

pub fn route_unsupported_configuration(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_CONFIGURATION, msg)
}

pub fn route_resolved_refs() -> Condition {
    Condition::truthy(
        t::RESOLVED_REFS,
        r::RESOLVED_REFS,
        "All references are resolved",
    )
}

pub fn route_backend_ref_invalid_kind(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_KIND, msg)
}

pub fn route_backend_ref_not_permitted(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::REF_NOT_PERMITTED, msg)
}

pub fn route_backend_ref_not_found(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::BACKEND_NOT_FOUND, msg)
}

pub fn route_backend_ref_unsupported_value(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::UNSUPPORTED_VALUE, msg)
}

pub fn route_backend_ref_unsupported_protocol(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::UNSUPPORTED_PROTOCOL, msg)
}

pub fn route_invalid_inference_pool(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_INFERENCE_POOL, msg)
}

pub fn route_resolved_refs_invalid_filter(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_FILTER, msg)
}

// === Listeners ===

pub fn listener_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "Listener is accepted")
}

pub fn listener_programmed() -> Condition {
    Condition::truthy(t::PROGRAMMED, r::PROGRAMMED, "Listener is programmed")
}

pub fn listener_resolved_refs() -> Condition {
    Condition::truthy(
        t::RESOLVED_REFS,
        r::RESOLVED_REFS,
        "All references are resolved",
    )
}

fn listener_not_programmed(msg: &str) -> Condition {
    Condition::falsy(t::PROGRAMMED, r::INVALID, msg)
}

pub fn listener_unsupported_protocol(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_PROTOCOL, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_unsupported_value(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_VALUE, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_invalid_certificate_ref(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::INVALID_CERTIFICATE_REF, &msg),
        Condition::falsy(t::RESOLVED_REFS, r::INVALID_CERTIFICATE_REF, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_ref_not_permitted(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::REF_NOT_PERMITTED, &msg),
        Condition::falsy(t::RESOLVED_REFS, r::REF_NOT_PERMITTED, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_invalid_route_kinds(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_ROUTE_KINDS, msg)
}

pub fn listener_protocol_conflict(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::truthy(t::CONFLICTED, r::PROTOCOL_CONFLICT, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_hostname_conflict(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::truthy(t::CONFLICTED, r::HOSTNAME_CONFLICT, &msg),
        listener_not_programmed(&msg),
    ]
}

pub fn listener_accepted_unsupported_field(msg: impl ToString) -> Condition {
    Condition::truthy(t::ACCEPTED, r::UNSUPPORTED_FIELD, msg)
}

// === Gateways ===

pub fn gateway_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "Gateway is accepted")
}

pub fn gateway_programmed() -> Condition {
    Condition::truthy(t::PROGRAMMED, r::PROGRAMMED, "Gateway is programmed")
}

pub fn gateway_invalid(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::INVALID, &msg),
        Condition::falsy(t::PROGRAMMED, r::INVALID, &msg),
    ]
}

pub fn gateway_unsupported_value(msg: impl ToString) -> Vec<Condition> {
    let msg = msg.to_string();
    vec![
        Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_VALUE, &msg),
        Condition::falsy(t::PROGRAMMED, r::INVALID, &msg),
    ]
}

pub fn gateway_unsupported_address(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::UNSUPPORTED_ADDRESS, msg)
}

pub fn gateway_secret_ref_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_CLIENT_CERTIFICATE_REF, msg)
}

pub fn gateway_secret_ref_not_permitted(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::REF_NOT_PERMITTED, msg)
}

pub fn gateway_accepted_unsupported_field(msg: impl ToString) -> Condition {
    Condition::truthy(t::ACCEPTED, r::UNSUPPORTED_FIELD, msg)
}

pub fn gateway_ref_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::PARAMETERS_REF_INVALID, msg)
}

pub fn gateway_ref_not_found() -> Condition {
    Condition::falsy(
        t::RESOLVED_REFS,
        r::PARAMETERS_REF_NOT_FOUND,
        "The ParametersRef resource could not be found",
    )
}

pub fn gateway_invalid_parameters(msg: impl ToString) -> Condition {
    Condition::truthy(t::ACCEPTED, r::INVALID_PARAMETERS, msg)
}

pub fn gateway_resolved_refs() -> Condition {
    Condition::truthy(
        t::RESOLVED_REFS,
        r::RESOLVED_REFS,
        "The ParametersRef resource is resolved",
    )
}

// === GatewayClasses ===

pub fn gateway_class_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "GatewayClass is accepted")
}

pub fn gateway_class_conflict() -> Condition {
    Condition::falsy(
        t::ACCEPTED,
        r::GATEWAY_CLASS_CONFLICT,
        "The resource is ignored due to a conflicting GatewayClass",
    )
}

pub fn gateway_class_invalid_parameters(msg: impl ToString) -> Condition {
    Condition::truthy(t::ACCEPTED, r::INVALID_PARAMETERS, msg)
}

pub fn gateway_class_ref_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::PARAMETERS_REF_INVALID, msg)
}

pub fn gateway_class_ref_not_found() -> Condition {
    Condition::falsy(
        t::RESOLVED_REFS,
        r::PARAMETERS_REF_NOT_FOUND,
        "The ParametersRef resource could not be found",
    )
}

pub fn gateway_class_resolved_refs() -> Condition {
    Condition::truthy(
        t::RESOLVED_REFS,
        r::RESOLVED_REFS,
        "The ParametersRef resource is resolved",
    )
}

// === Policies ===

pub fn policy_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "The Policy is accepted")
}

pub fn policy_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::INVALID, msg)
}

pub fn policy_conflicted(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::CONFLICTED, msg)
}

pub fn policy_target_not_found(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::TARGET_NOT_FOUND, msg)
}

pub fn policy_not_accepted_nginx_proxy_not_set(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::NGINX_PROXY_CONFIG_NOT_SET, msg)
}

/// Reported on an ancestor that could not be written into a policy's status
/// because the status already lists the maximum number of ancestors.
pub fn policy_ancestor_limit_reached(policy: impl fmt::Display) -> Condition {
    Condition::truthy(
        t::POLICY_AFFECTED,
        r::ANCESTOR_LIMIT_REACHED,
        format!(
            "Policies cannot be applied because the ancestor status list has reached the maximum size. \
             The following policies have been ignored: {policy}"
        ),
    )
}

// === InferencePools ===

pub fn inference_pool_invalid_extension_ref(msg: impl ToString) -> Condition {
    Condition::falsy(t::RESOLVED_REFS, r::INVALID_EXTENSION_REF, msg)
}

pub fn inference_pool_invalid_http_route_not_accepted(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::HTTP_ROUTE_NOT_ACCEPTED, msg)
}

// === Filters ===

pub fn snippets_filter_accepted() -> Condition {
    Condition::truthy(t::ACCEPTED, r::ACCEPTED, "The SnippetsFilter is accepted")
}

pub fn snippets_filter_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::INVALID, msg)
}

pub fn authentication_filter_accepted() -> Condition {
    Condition::truthy(
        t::ACCEPTED,
        r::ACCEPTED,
        "The AuthenticationFilter is accepted",
    )
}

pub fn authentication_filter_invalid(msg: impl ToString) -> Condition {
    Condition::falsy(t::ACCEPTED, r::INVALID, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_unique_skips_duplicates() {
        let mut conds = vec![policy_accepted()];
        push_unique(&mut conds, policy_accepted());
        push_unique(&mut conds, policy_conflicted("Conflicts with another policy"));
        assert_eq!(conds.len(), 2);
        assert!(has_reason(&conds, reasons::CONFLICTED));
    }

    #[test]
    fn listener_failures_are_not_programmed() {
        for conds in [
            listener_unsupported_protocol("x"),
            listener_unsupported_value("x"),
            listener_invalid_certificate_ref("x"),
            listener_ref_not_permitted("x"),
            listener_protocol_conflict("x"),
            listener_hostname_conflict("x"),
        ] {
            assert!(conds
                .iter()
                .any(|c| c.type_ == types::PROGRAMMED && !c.is_true()));
        }
    }
}
