use super::*;
use pretty_assertions::assert_eq;
use crate::{
    nginx_proxy::tests::mk_nginx_proxy,
    reference_grant::tests::{mk_grant, to_service},
    route::{L7Route, L7RouteKind, RouteKey},
};
use nginx_gateway_controller_core::conditions::reasons;
use nginx_gateway_controller_k8s_api::{
    gateway::ParametersReference,
    nginx::{NginxProxySpec, GROUP as NGINX_GROUP},
};

fn mk_cross_namespace_snapshot() -> Snapshot {
    let mut snapshot = mk_snapshot();
    Snapshot::insert(&mut snapshot.services, mk_service("other", "svc", 80));
    Snapshot::insert(
        &mut snapshot.http_routes,
        mk_route(
            "hr",
            &["http"],
            &["foo.example.com"],
            vec![mk_prefix_rule("/", mk_backend(Some("other"), "svc", 80))],
        ),
    );
    snapshot
}

fn route<'g>(graph: &'g Graph, name: &str) -> &'g L7Route {
    &graph.routes[&RouteKey::new(id("test", name), L7RouteKind::Http)]
}

#[test]
fn cross_namespace_backend_requires_grant() {
    let graph = build_default(&mk_cross_namespace_snapshot());

    let hr = route(&graph, "hr");
    assert!(hr.valid);
    let backends = &hr.rules[0].backend_refs;
    assert_eq!(backends.len(), 1);
    assert!(!backends[0].valid);
    assert!(
        hr.conditions
            .iter()
            .any(|c| c.reason == reasons::REF_NOT_PERMITTED),
        "{:?}",
        hr.conditions
    );
    assert!(graph.reference_grants_used.is_empty());
}

#[test]
fn reference_grant_permits_cross_namespace_backend() {
    let mut snapshot = mk_cross_namespace_snapshot();
    Snapshot::insert(
        &mut snapshot.reference_grants,
        mk_grant("other", "allow-test", "HTTPRoute", "test", to_service(None)),
    );

    let graph = build_default(&snapshot);
    let hr = route(&graph, "hr");
    let backends = &hr.rules[0].backend_refs;
    assert!(backends[0].valid);
    assert_eq!(backends[0].service, id("other", "svc"));
    assert!(!hr
        .conditions
        .iter()
        .any(|c| c.reason == reasons::REF_NOT_PERMITTED));
    assert_eq!(
        graph.reference_grants_used.iter().collect::<Vec<_>>(),
        vec![&id("other", "allow-test")]
    );
    assert!(graph.referenced_services.contains_key(&id("other", "svc")));
}

#[test]
fn ip_family_mismatch_is_scoped_to_gateway() {
    let mut snapshot = mk_snapshot();
    let mut class = mk_class();
    class.spec.parameters_ref = Some(ParametersReference {
        group: NGINX_GROUP.to_string(),
        kind: "NginxProxy".to_string(),
        name: "np".to_string(),
        namespace: Some("ngf".to_string()),
    });
    Snapshot::insert(&mut snapshot.gateway_classes, class);
    Snapshot::insert(
        &mut snapshot.nginx_proxies,
        mk_nginx_proxy(
            "ngf",
            "np",
            NginxProxySpec {
                ip_family: Some("ipv6".to_string()),
                ..Default::default()
            },
        ),
    );

    let mut svc = mk_service("test", "svc", 80);
    if let Some(spec) = svc.spec.as_mut() {
        spec.ip_families = Some(vec!["IPv4".to_string()]);
    }
    Snapshot::insert(&mut snapshot.services, svc);
    Snapshot::insert(
        &mut snapshot.http_routes,
        mk_route(
            "hr",
            &["http"],
            &["foo.example.com"],
            vec![mk_prefix_rule("/", mk_backend(None, "svc", 80))],
        ),
    );

    let graph = build_default(&snapshot);
    assert!(graph.nginx_proxies.contains_key(&id("ngf", "np")));

    let backend = &route(&graph, "hr").rules[0].backend_refs[0];
    assert!(backend.valid);
    let cond = backend
        .invalid_for_gateways
        .get(&id("test", "gw"))
        .expect("backend must be invalid for the gateway");
    assert_eq!(cond.reason, reasons::INVALID_IP_FAMILY);
    assert!(cond.message.contains("IPv4"), "{}", cond.message);
    assert!(cond.message.contains("IPv6"), "{}", cond.message);
}
