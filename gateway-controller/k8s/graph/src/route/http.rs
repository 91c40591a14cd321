use super::{
    filter, new_l7_route, rule_conditions, session_persistence, BackendFilter, L7Route,
    L7RouteContext, L7RouteSource, RouteBackendRef, RouteRule, RuleErrors,
};
use crate::{
    backend_ref::SERVICE_KIND, config::FeatureFlags, extension_ref::ExtensionRefResolver,
    validation::HttpFieldsValidator,
};
use nginx_gateway_controller_core::{ErrorList, FieldError, Path, ResourceId, INTERNAL_PATH_PREFIX};
use nginx_gateway_controller_k8s_api::{
    gateway::{
        self as api, BackendObjectReference, HttpBackendRef, HttpHeaderMatch, HttpPathMatch,
        HttpQueryParamMatch, HttpRouteMatch, HttpRouteRule,
    },
    inference::InferencePool,
    targets_kind,
};
use std::collections::BTreeMap;

pub(super) const SESSION_PERSISTENCE_ERR_MSG: &str = "SessionPersistence is only supported with NGINX Plus and when experimental features are enabled. This configuration will be ignored.";

pub(super) fn build(
    validator: &dyn HttpFieldsValidator,
    hr: &api::HttpRoute,
    inference_pools: &BTreeMap<ResourceId, InferencePool>,
    ctx: &mut L7RouteContext<'_>,
) -> Option<L7Route> {
    let mut route = new_l7_route(
        L7RouteSource::Http(hr.clone()),
        hr.spec.parent_refs.as_deref(),
        hr.spec.hostnames.as_deref(),
        ctx.gateways,
    )?;
    if !route.attachable {
        return Some(route);
    }

    let id = ResourceId::of(hr);
    let mut resolver =
        ExtensionRefResolver::new(&id.namespace, &mut *ctx.snippets, &mut *ctx.authentication);

    let mut errs = RuleErrors::default();
    let mut at_least_one_valid = false;
    for (idx, rule) in hr.spec.rules.iter().flatten().enumerate() {
        let (rule, rule_errs) = process_rule(
            validator,
            rule,
            idx,
            &id,
            inference_pools,
            ctx.features,
            &mut resolver,
        );
        at_least_one_valid |= rule.is_valid();
        errs.append(rule_errs);
        route.rules.push(rule);
    }

    let (valid, conds) = rule_conditions(errs, at_least_one_valid);
    route.valid = valid;
    route.conditions.extend(conds);
    Some(route)
}

fn process_rule(
    validator: &dyn HttpFieldsValidator,
    rule: &HttpRouteRule,
    idx: usize,
    route: &ResourceId,
    inference_pools: &BTreeMap<ResourceId, InferencePool>,
    features: FeatureFlags,
    resolver: &mut ExtensionRefResolver<'_>,
) -> (RouteRule, RuleErrors) {
    let path = Path::new("spec").child("rules").index(idx);
    let mut errs = RuleErrors::default();
    errs.warn = unsupported_fields(rule, &path, features);

    let matches = rule.matches.clone().unwrap_or_default();
    let mut valid_matches = true;
    for (j, m) in matches.iter().enumerate() {
        let match_errs = validate_match(validator, m, &path.child("matches").index(j));
        if !match_errs.is_empty() {
            valid_matches = false;
            errs.invalid.append(match_errs);
        }
    }

    let (filters, filter_errs) = filter::process(
        rule.filters.iter().flatten().map(filter::from_http).collect(),
        &path.child("filters"),
        validator,
        resolver,
    );
    errs.append(filter_errs);

    let mut session_persistence = None;
    if let Some(sp) = rule.session_persistence.as_ref() {
        let (config, sp_errs) = session_persistence::process(
            sp,
            Some(matches.as_slice()),
            route,
            idx,
            &path.child("sessionPersistence"),
            validator,
        );
        errs.append(sp_errs);
        session_persistence = config;
    }

    let (mut route_backend_refs, backend_errs) = backend_refs(
        rule,
        &route.namespace,
        inference_pools,
        &path,
        session_persistence.as_ref(),
    );
    errs.invalid.append(backend_errs);

    if filters.valid {
        route_backend_refs.extend(mirror_backend_refs(&filters.filters));
    }

    let rule = RouteRule {
        matches,
        filters,
        route_backend_refs,
        backend_refs: Vec::new(),
        session_persistence,
        valid_matches,
    };
    (rule, errs)
}

/// A backend for each RequestMirror filter, so the mirrored service is
/// resolved like any other backend of the rule.
pub(super) fn mirror_backend_refs(filters: &[filter::Filter]) -> Vec<RouteBackendRef> {
    filters
        .iter()
        .enumerate()
        .filter_map(|(i, f)| match f {
            filter::Filter::RequestMirror(m) => Some(RouteBackendRef {
                backend_ref: m.backend_ref.clone(),
                weight: None,
                mirror_backend_idx: Some(i),
                is_inference_pool: false,
                inference_pool_name: None,
                session_persistence: None,
                filters: Vec::new(),
            }),
            _ => None,
        })
        .collect()
}

fn backend_refs(
    rule: &HttpRouteRule,
    route_ns: &str,
    inference_pools: &BTreeMap<ResourceId, InferencePool>,
    path: &Path,
    sp: Option<&super::SessionPersistenceConfig>,
) -> (Vec<RouteBackendRef>, ErrorList) {
    let refs = rule.backend_refs.as_deref().unwrap_or_default();

    let pools = refs
        .iter()
        .map(|b| inference_pool_backend(b, route_ns, inference_pools))
        .collect::<Vec<_>>();
    if pools.iter().any(Option::is_some) && pools.iter().any(Option::is_none) {
        let err = FieldError::forbidden(
            path.child("backendRefs"),
            "mixing InferencePool and non-InferencePool backends in a rule is not supported",
        );
        return (Vec::new(), err.into());
    }

    let refs = refs
        .iter()
        .zip(pools)
        .map(|(b, pool)| {
            let filters = b
                .filters
                .iter()
                .flatten()
                .cloned()
                .map(BackendFilter::Http)
                .collect();
            match pool {
                Some(pool) => RouteBackendRef {
                    backend_ref: BackendObjectReference {
                        group: Some(String::new()),
                        kind: Some(SERVICE_KIND.to_string()),
                        name: inference_pool_service_name(&pool.name),
                        namespace: b.inner.namespace.clone(),
                        port: None,
                    },
                    weight: b.weight,
                    mirror_backend_idx: None,
                    is_inference_pool: true,
                    inference_pool_name: Some(pool.name),
                    session_persistence: None,
                    filters,
                },
                None => RouteBackendRef {
                    backend_ref: b.inner.clone(),
                    weight: b.weight,
                    mirror_backend_idx: None,
                    is_inference_pool: false,
                    inference_pool_name: None,
                    session_persistence: sp.cloned(),
                    filters,
                },
            }
        })
        .collect();
    (refs, ErrorList::new())
}

/// Returns the pool an InferencePool backend ref names, if it exists.
fn inference_pool_backend(
    b: &HttpBackendRef,
    route_ns: &str,
    inference_pools: &BTreeMap<ResourceId, InferencePool>,
) -> Option<ResourceId> {
    let kind = b.inner.kind.as_deref().unwrap_or(SERVICE_KIND);
    if !targets_kind::<InferencePool>(b.inner.group.as_deref(), kind) {
        return None;
    }
    let ns = b.inner.namespace.as_deref().unwrap_or(route_ns);
    let id = ResourceId::new(ns.to_string(), b.inner.name.clone());
    inference_pools.contains_key(&id).then_some(id)
}

/// The headless Service created for an InferencePool.
pub fn inference_pool_service_name(pool: &str) -> String {
    format!("{pool}-pool-svc")
}

fn unsupported_fields(rule: &HttpRouteRule, path: &Path, features: FeatureFlags) -> ErrorList {
    let mut errs = ErrorList::new();
    if rule.name.is_some() {
        errs.push(FieldError::forbidden(path.child("name"), "Name"));
    }
    if rule.timeouts.is_some() {
        errs.push(FieldError::forbidden(path.child("timeouts"), "Timeouts"));
    }
    if rule.retry.is_some() {
        errs.push(FieldError::forbidden(path.child("retry"), "Retry"));
    }
    if rule.session_persistence.is_some() {
        errs.append(session_persistence_gates(path, features));
    }
    errs
}

pub(super) fn session_persistence_gates(path: &Path, features: FeatureFlags) -> ErrorList {
    let path = path.child("sessionPersistence");
    let mut errs = ErrorList::new();
    if !features.plus {
        errs.push(FieldError::forbidden(
            path.clone(),
            format!("{SESSION_PERSISTENCE_ERR_MSG} OSS users can use `ip_hash` load balancing method via the UpstreamSettingsPolicy for session affinity."),
        ));
    }
    if !features.experimental {
        errs.push(FieldError::forbidden(path, SESSION_PERSISTENCE_ERR_MSG));
    }
    errs
}

fn validate_match(validator: &dyn HttpFieldsValidator, m: &HttpRouteMatch, path: &Path) -> ErrorList {
    // Routes generated for request mirroring are not validated.
    if validator.skip_validation() {
        return ErrorList::new();
    }

    let mut errs = ErrorList::new();

    if let Some(pm) = m.path.as_ref() {
        errs.append(validate_path_match(validator, pm, &path.child("path")));
    }

    for (j, h) in m.headers.iter().flatten().enumerate() {
        errs.append(validate_header_match(validator, h, &path.child("headers").index(j)));
    }

    for (j, q) in m.query_params.iter().flatten().enumerate() {
        let qpath = path.child("queryParams").index(j);
        let (HttpQueryParamMatch::Exact { name, value }
        | HttpQueryParamMatch::RegularExpression { name, value }) = q;
        if let Err(e) = validator.validate_query_param_name_in_match(name) {
            errs.push(FieldError::invalid(qpath.child("name"), name, e));
        }
        if let Err(e) = validator.validate_query_param_value_in_match(value) {
            errs.push(FieldError::invalid(qpath.child("value"), value, e));
        }
    }

    if let Some(method) = m.method.as_deref() {
        if let Err(supported) = validator.validate_method_in_match(method) {
            errs.push(FieldError::not_supported(
                path.child("method"),
                method,
                supported.iter().copied(),
            ));
        }
    }

    errs
}

fn validate_path_match(validator: &dyn HttpFieldsValidator, pm: &HttpPathMatch, path: &Path) -> ErrorList {
    let value = pm.value();
    let vpath = path.child("value");

    if value.starts_with(INTERNAL_PATH_PREFIX) {
        return FieldError::invalid(
            vpath,
            value,
            format!("path cannot start with {INTERNAL_PATH_PREFIX}. This prefix is reserved for internal use"),
        )
        .into();
    }

    let res = match pm {
        HttpPathMatch::Exact { .. } | HttpPathMatch::PathPrefix { .. } => {
            validator.validate_path_in_match(value)
        }
        HttpPathMatch::RegularExpression { .. } => validator.validate_path_in_regex_match(value),
    };
    match res {
        Ok(()) => ErrorList::new(),
        Err(e) => FieldError::invalid(vpath, value, e).into(),
    }
}

pub(super) fn validate_header_match(
    validator: &dyn HttpFieldsValidator,
    h: &HttpHeaderMatch,
    path: &Path,
) -> ErrorList {
    let (HttpHeaderMatch::Exact { name, value } | HttpHeaderMatch::RegularExpression { name, value }) =
        h;
    let mut errs = ErrorList::new();
    if let Err(e) = validator.validate_header_name_in_match(name) {
        errs.push(FieldError::invalid(path.child("name"), name, e));
    }
    if let Err(e) = validator.validate_header_value_in_match(value) {
        errs.push(FieldError::invalid(path.child("value"), value, e));
    }
    errs
}
