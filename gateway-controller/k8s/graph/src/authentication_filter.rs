use crate::{
    extension_ref::{ExtensionRefFilter, ExtensionRefKind},
    secret::{SecretResolver, SECRET_TYPE_HTPASSWD},
};
use nginx_gateway_controller_core::{conditions, Condition, ErrorList, FieldError, Path, ResourceId};
use nginx_gateway_controller_k8s_api::nginx;
use std::collections::BTreeMap;

pub const AUTH_TYPE_BASIC: &str = "Basic";

#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticationFilter {
    pub source: nginx::AuthenticationFilter,
    pub conditions: Vec<Condition>,
    pub valid: bool,

    /// Set once a route's extensionRef resolves to this filter.
    pub referenced: bool,
}

pub(crate) fn process(
    filters: &BTreeMap<ResourceId, nginx::AuthenticationFilter>,
    secrets: &mut SecretResolver<'_>,
) -> BTreeMap<ResourceId, AuthenticationFilter> {
    filters
        .iter()
        .map(|(id, af)| {
            let errs = validate(af, &id.namespace, secrets);
            let (conditions, valid) = match errs.aggregate() {
                Some(msg) => (vec![conditions::authentication_filter_invalid(msg)], false),
                None => (vec![conditions::authentication_filter_accepted()], true),
            };
            let filter = AuthenticationFilter {
                source: af.clone(),
                conditions,
                valid,
                referenced: false,
            };
            (id.clone(), filter)
        })
        .collect()
}

fn validate(
    af: &nginx::AuthenticationFilter,
    namespace: &str,
    secrets: &mut SecretResolver<'_>,
) -> ErrorList {
    let spec = Path::new("spec");
    let mut errs = ErrorList::new();

    if af.spec.type_ != AUTH_TYPE_BASIC {
        errs.push(FieldError::not_supported(
            spec.child("type"),
            &af.spec.type_,
            [AUTH_TYPE_BASIC],
        ));
        return errs;
    }

    let Some(basic) = af.spec.basic.as_ref() else {
        errs.push(FieldError::required(
            spec.child("basic"),
            "basic must be specified for Basic authentication",
        ));
        return errs;
    };

    let secret = ResourceId::new(namespace.to_string(), basic.secret_ref.name.clone());
    let resolved = secrets.resolve(&secret);
    let path = spec.child("basic").child("secretRef");
    match &resolved.error {
        Some(error) => errs.push(FieldError::invalid(path, &basic.secret_ref.name, error)),
        None if resolved.secret_type() != Some(SECRET_TYPE_HTPASSWD) => {
            errs.push(FieldError::invalid(
                path,
                &basic.secret_ref.name,
                format!("secret must be of type {SECRET_TYPE_HTPASSWD:?}"),
            ))
        }
        None => {}
    }

    errs
}

/// Looks up an AuthenticationFilter in the route's namespace, marking it as
/// referenced.
pub(crate) fn resolve(
    filters: &mut BTreeMap<ResourceId, AuthenticationFilter>,
    namespace: &str,
    name: &str,
) -> Option<ExtensionRefFilter> {
    let id = ResourceId::new(namespace.to_string(), name.to_string());
    let af = filters.get_mut(&id)?;
    af.referenced = true;
    Some(ExtensionRefFilter {
        kind: ExtensionRefKind::AuthenticationFilter,
        id,
        valid: af.valid,
    })
}
