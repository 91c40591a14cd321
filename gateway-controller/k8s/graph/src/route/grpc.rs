use super::{
    filter, http, new_l7_route, rule_conditions, session_persistence, BackendFilter, L7Route,
    L7RouteContext, L7RouteSource, RouteBackendRef, RouteRule, RuleErrors,
};
use crate::{config::FeatureFlags, extension_ref::ExtensionRefResolver, validation::HttpFieldsValidator};
use nginx_gateway_controller_core::{ErrorList, FieldError, Path, ResourceId};
use nginx_gateway_controller_k8s_api::gateway::{
    self as api, GrpcMethodMatch, GrpcMethodMatchType, GrpcRouteMatch, GrpcRouteRule, HttpPathMatch,
    HttpRouteMatch,
};

pub(super) fn build(
    validator: &dyn HttpFieldsValidator,
    gr: &api::GrpcRoute,
    ctx: &mut L7RouteContext<'_>,
) -> Option<L7Route> {
    let mut route = new_l7_route(
        L7RouteSource::Grpc(gr.clone()),
        gr.spec.parent_refs.as_deref(),
        gr.spec.hostnames.as_deref(),
        ctx.gateways,
    )?;
    if !route.attachable {
        return Some(route);
    }

    let id = ResourceId::of(gr);
    let mut resolver =
        ExtensionRefResolver::new(&id.namespace, &mut *ctx.snippets, &mut *ctx.authentication);

    let mut errs = RuleErrors::default();
    let mut at_least_one_valid = false;
    for (idx, rule) in gr.spec.rules.iter().flatten().enumerate() {
        let (rule, rule_errs) = process_rule(validator, rule, idx, &id, ctx.features, &mut resolver);
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
    rule: &GrpcRouteRule,
    idx: usize,
    route: &ResourceId,
    features: FeatureFlags,
    resolver: &mut ExtensionRefResolver<'_>,
) -> (RouteRule, RuleErrors) {
    let path = Path::new("spec").child("rules").index(idx);
    let mut errs = RuleErrors::default();

    if rule.name.is_some() {
        errs.warn.push(FieldError::forbidden(path.child("name"), "Name"));
    }
    if rule.session_persistence.is_some() {
        errs.warn.append(http::session_persistence_gates(&path, features));
    }

    let grpc_matches = rule.matches.as_deref().unwrap_or_default();
    let mut valid_matches = true;
    for (j, m) in grpc_matches.iter().enumerate() {
        let match_errs = validate_match(validator, m, &path.child("matches").index(j));
        if !match_errs.is_empty() {
            valid_matches = false;
            errs.invalid.append(match_errs);
        }
    }

    let (filters, filter_errs) = filter::process(
        rule.filters
            .iter()
            .flatten()
            .map(|f| Ok(filter::from_grpc(f)))
            .collect(),
        &path.child("filters"),
        validator,
        resolver,
    );
    errs.append(filter_errs);

    let mut session_persistence = None;
    if let Some(sp) = rule.session_persistence.as_ref() {
        let (config, sp_errs) = session_persistence::process(
            sp,
            None,
            route,
            idx,
            &path.child("sessionPersistence"),
            validator,
        );
        errs.append(sp_errs);
        session_persistence = config;
    }

    let mut route_backend_refs = rule
        .backend_refs
        .iter()
        .flatten()
        .map(|b| RouteBackendRef {
            backend_ref: b.inner.clone(),
            weight: b.weight,
            mirror_backend_idx: None,
            is_inference_pool: false,
            inference_pool_name: None,
            session_persistence: session_persistence.clone(),
            filters: b
                .filters
                .iter()
                .flatten()
                .cloned()
                .map(BackendFilter::Grpc)
                .collect(),
        })
        .collect::<Vec<_>>();

    if filters.valid {
        route_backend_refs.extend(http::mirror_backend_refs(&filters.filters));
    }

    let rule = RouteRule {
        matches: convert_matches(grpc_matches),
        filters,
        route_backend_refs,
        backend_refs: Vec::new(),
        session_persistence,
        valid_matches,
    };
    (rule, errs)
}

/// Lowers gRPC matches to HTTP matches. A method match becomes an exact
/// `/service/method` path match; a rule without matches matches everything.
pub fn convert_matches(matches: &[GrpcRouteMatch]) -> Vec<HttpRouteMatch> {
    if matches.is_empty() {
        return vec![HttpRouteMatch::default()];
    }

    matches
        .iter()
        .map(|m| {
            let path = match m.method.as_ref() {
                Some(GrpcMethodMatch {
                    service: Some(service),
                    method: Some(method),
                    ..
                }) => HttpPathMatch::Exact {
                    value: format!("/{service}/{method}"),
                },
                _ => HttpPathMatch::default(),
            };
            HttpRouteMatch {
                path: Some(path),
                headers: m.headers.clone(),
                ..Default::default()
            }
        })
        .collect()
}

fn validate_match(validator: &dyn HttpFieldsValidator, m: &GrpcRouteMatch, path: &Path) -> ErrorList {
    // Routes generated for request mirroring are not validated.
    if validator.skip_validation() {
        return ErrorList::new();
    }

    let mut errs = ErrorList::new();

    if let Some(method) = m.method.as_ref() {
        errs.append(validate_method_match(validator, method, &path.child("method")));
    }

    for (j, h) in m.headers.iter().flatten().enumerate() {
        errs.append(http::validate_header_match(
            validator,
            h,
            &path.child("headers").index(j),
        ));
    }

    errs
}

fn validate_method_match(
    validator: &dyn HttpFieldsValidator,
    method: &GrpcMethodMatch,
    path: &Path,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(GrpcMethodMatchType::RegularExpression) = method.type_ {
        errs.push(FieldError::not_supported(
            path.child("type"),
            "RegularExpression",
            ["Exact"],
        ));
        return errs;
    }

    for (name, value) in [("service", &method.service), ("method", &method.method)] {
        match value.as_deref().filter(|v| !v.is_empty()) {
            None => errs.push(FieldError::required(
                path.child(name),
                format!("{name} is required"),
            )),
            Some(v) => {
                if let Err(e) = validator.validate_path_in_match(&format!("/{v}")) {
                    errs.push(FieldError::invalid(path.child(name), v, e));
                }
            }
        }
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        route::tests::{mk_context_parts, mk_gateways, mk_parent_ref},
        validation::NginxValidator,
    };
    use nginx_gateway_controller_core::conditions::{reasons, types};
    use nginx_gateway_controller_k8s_api::{
        gateway::{BackendObjectReference, GrpcBackendRef, HttpHeaderMatch},
        ObjectMeta,
    };
    use pretty_assertions::assert_eq;

    fn mk_grpc_route(rules: Vec<GrpcRouteRule>) -> api::GrpcRoute {
        api::GrpcRoute {
            metadata: ObjectMeta {
                namespace: Some("test".to_string()),
                name: Some("gr".to_string()),
                ..Default::default()
            },
            spec: api::GrpcRouteSpec {
                parent_refs: Some(vec![mk_parent_ref("gw", Some("http"), None)]),
                hostnames: Some(vec!["grpc.example.com".to_string()]),
                rules: Some(rules),
            },
            status: None,
        }
    }

    fn mk_method_rule(type_: Option<GrpcMethodMatchType>, service: &str, method: &str) -> GrpcRouteRule {
        GrpcRouteRule {
            matches: Some(vec![GrpcRouteMatch {
                method: Some(GrpcMethodMatch {
                    type_,
                    service: Some(service.to_string()),
                    method: Some(method.to_string()),
                }),
                headers: None,
            }]),
            backend_refs: Some(vec![GrpcBackendRef {
                inner: BackendObjectReference {
                    name: "svc".to_string(),
                    port: Some(50051),
                    ..Default::default()
                },
                weight: None,
                filters: None,
            }]),
            ..Default::default()
        }
    }

    fn build_route(gr: &api::GrpcRoute) -> L7Route {
        let gateways = mk_gateways();
        let (mut snippets, mut auth) = mk_context_parts();
        let mut ctx = L7RouteContext {
            gateways: &gateways,
            snippets: &mut snippets,
            authentication: &mut auth,
            features: FeatureFlags::default(),
        };
        build(&NginxValidator::default(), gr, &mut ctx).expect("route must be built")
    }

    #[test]
    fn lowers_method_matches() {
        let route = build_route(&mk_grpc_route(vec![mk_method_rule(
            Some(GrpcMethodMatchType::Exact),
            "myService",
            "myMethod",
        )]));
        assert!(route.valid);
        assert!(route.conditions.is_empty());
        assert_eq!(
            route.rules[0].matches,
            vec![HttpRouteMatch {
                path: Some(HttpPathMatch::Exact {
                    value: "/myService/myMethod".to_string(),
                }),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn header_only_and_empty_matches_match_everything() {
        let header = HttpHeaderMatch::Exact {
            name: "MyHeader".to_string(),
            value: "SomeValue".to_string(),
        };
        let lowered = convert_matches(&[GrpcRouteMatch {
            method: None,
            headers: Some(vec![header.clone()]),
        }]);
        assert_eq!(
            lowered,
            vec![HttpRouteMatch {
                path: Some(HttpPathMatch::default()),
                headers: Some(vec![header]),
                ..Default::default()
            }]
        );
        assert_eq!(convert_matches(&[]), vec![HttpRouteMatch::default()]);
    }

    #[test]
    fn untyped_method_match_is_exact() {
        let route = build_route(&mk_grpc_route(vec![mk_method_rule(None, "svc", "Get")]));
        assert!(route.valid);
        assert!(route.rules[0].valid_matches);
    }

    #[test]
    fn requires_service_and_method() {
        let route = build_route(&mk_grpc_route(vec![mk_method_rule(
            Some(GrpcMethodMatchType::Exact),
            "",
            "",
        )]));
        assert!(!route.valid);
        assert!(route.attachable);
        let cond = route
            .conditions
            .iter()
            .find(|c| c.reason == reasons::UNSUPPORTED_VALUE)
            .expect("condition must be set");
        assert_eq!(
            cond.message,
            "All rules are invalid: [spec.rules[0].matches[0].method.service: Required value: service is required, spec.rules[0].matches[0].method.method: Required value: method is required]"
        );
    }

    #[test]
    fn regex_method_matches_are_not_supported() {
        let mut valid = mk_method_rule(Some(GrpcMethodMatchType::Exact), "svc", "Get");
        valid.name = Some("named".to_string());
        let route = build_route(&mk_grpc_route(vec![
            valid,
            mk_method_rule(Some(GrpcMethodMatchType::RegularExpression), "svc", "Get.*"),
        ]));
        assert!(route.valid);

        let partial = route
            .conditions
            .iter()
            .find(|c| c.type_ == types::PARTIALLY_INVALID)
            .expect("condition must be set");
        assert_eq!(
            partial.message,
            r#"spec.rules[1].matches[0].method.type: Unsupported value: "RegularExpression": supported values: "Exact""#
        );
        let unsupported = route
            .conditions
            .iter()
            .find(|c| c.reason == reasons::UNSUPPORTED_FIELD)
            .expect("condition must be set");
        assert_eq!(unsupported.message, "spec.rules[0].name: Forbidden: Name");
    }
}
