use super::*;
use crate::{
    nginx_proxy::EffectiveNginxProxy,
    route::{
        tests::mk_built_gateway, Attachment, L7RouteSource, ParentRef, ParentRefGateway,
    },
};
use maplit::{btreemap, btreeset};
use nginx_gateway_controller_core::conditions::reasons;
use nginx_gateway_controller_k8s_api::{
    chrono::{TimeZone, Utc},
    gateway::{self as api, PolicyAncestorStatus},
    nginx::{
        ClientBody, ClientKeepAlive, ClientKeepAliveTimeout, NginxProxySpec, Telemetry,
        TelemetryExporter, UpstreamKeepAlive,
    },
    Time,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn id(name: &str) -> ResourceId {
    ResourceId::new("test".to_string(), name.to_string())
}

fn mk_meta(name: &str, created_secs: i64) -> ObjectMeta {
    ObjectMeta {
        namespace: Some("test".to_string()),
        name: Some(name.to_string()),
        creation_timestamp: Some(Time(Utc.timestamp_opt(created_secs, 0).unwrap())),
        ..Default::default()
    }
}

fn mk_target(group: &str, kind: &str, name: &str) -> LocalPolicyTargetReference {
    LocalPolicyTargetReference {
        group: group.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn mk_csp(name: &str, created_secs: i64, target: LocalPolicyTargetReference) -> ClientSettingsPolicy {
    ClientSettingsPolicy {
        metadata: mk_meta(name, created_secs),
        spec: ClientSettingsPolicySpec {
            target_ref: target,
            body: Some(ClientBody {
                max_size: Some("10m".to_string()),
                timeout: None,
            }),
            keep_alive: None,
        },
        status: None,
    }
}

fn mk_op(name: &str, routes: &[&str]) -> ObservabilityPolicy {
    ObservabilityPolicy {
        metadata: mk_meta(name, 0),
        spec: ObservabilityPolicySpec {
            target_refs: routes
                .iter()
                .map(|r| mk_target(api::GROUP, "HTTPRoute", r))
                .collect(),
            tracing: Some(Tracing {
                strategy: "ratio".to_string(),
                ratio: Some(50),
                ..Default::default()
            }),
        },
        status: None,
    }
}

fn mk_usp(name: &str, services: &[&str]) -> UpstreamSettingsPolicy {
    UpstreamSettingsPolicy {
        metadata: mk_meta(name, 0),
        spec: UpstreamSettingsPolicySpec {
            target_refs: services
                .iter()
                .map(|s| mk_target("", "Service", s))
                .collect(),
            zone_size: Some("512k".to_string()),
            keep_alive: None,
        },
        status: None,
    }
}

fn mk_route(name: &str, gateways: &[&str], attached: bool) -> (RouteKey, L7Route) {
    let route = L7Route {
        source: L7RouteSource::Http(api::HttpRoute {
            metadata: mk_meta(name, 0),
            spec: Default::default(),
            status: None,
        }),
        hostnames: Vec::new(),
        rules: Vec::new(),
        parent_refs: gateways
            .iter()
            .enumerate()
            .map(|(idx, gw)| ParentRef {
                idx,
                gateway: ParentRefGateway {
                    id: id(gw),
                    effective_nginx_proxy: None,
                },
                section_name: None,
                port: None,
                attachment: Some(Attachment {
                    attached,
                    ..Default::default()
                }),
            })
            .collect(),
        conditions: Vec::new(),
        policies: Vec::new(),
        valid: true,
        attachable: true,
    };
    (RouteKey::new(id(name), L7RouteKind::Http), route)
}

fn with_telemetry(mut gw: Gateway) -> Gateway {
    gw.effective_nginx_proxy = Some(EffectiveNginxProxy(NginxProxySpec {
        telemetry: Some(Telemetry {
            exporter: Some(TelemetryExporter {
                endpoint: Some("otel-collector:4317".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }));
    gw
}

/// The graph nodes policies are resolved against.
struct Fixture {
    gateways: BTreeMap<ResourceId, Gateway>,
    routes: BTreeMap<RouteKey, L7Route>,
    services: BTreeMap<ResourceId, ReferencedService>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            gateways: btreemap! {
                id("gw") => with_telemetry(mk_built_gateway("test", "gw", &[])),
                id("gw-2") => mk_built_gateway("test", "gw-2", &[]),
            },
            routes: [mk_route("hr", &["gw"], true), mk_route("hr-detached", &["gw"], false)]
                .into_iter()
                .collect(),
            services: btreemap! {
                id("svc") => ReferencedService {
                    gateways: btreeset! { id("gw"), id("gw-2") },
                    ..Default::default()
                },
            },
        }
    }

    fn process(
        &mut self,
        client_settings: Vec<ClientSettingsPolicy>,
        observability: Vec<ObservabilityPolicy>,
        upstream_settings: Vec<UpstreamSettingsPolicy>,
    ) -> BTreeMap<PolicyKey, Policy> {
        let client_settings = client_settings
            .into_iter()
            .map(|p| (ResourceId::of(&p), p))
            .collect::<BTreeMap<_, _>>();
        let observability = observability
            .into_iter()
            .map(|p| (ResourceId::of(&p), p))
            .collect::<BTreeMap<_, _>>();
        let upstream_settings = upstream_settings
            .into_iter()
            .map(|p| (ResourceId::of(&p), p))
            .collect::<BTreeMap<_, _>>();
        process(
            PolicySources {
                client_settings: &client_settings,
                observability: &observability,
                upstream_settings: &upstream_settings,
            },
            PolicyContext {
                gateways: &mut self.gateways,
                routes: &mut self.routes,
                services: &mut self.services,
                controller_name: "ctlr",
            },
        )
    }
}

fn key(kind: PolicyKind, name: &str) -> PolicyKey {
    PolicyKey { kind, id: id(name) }
}

fn http_route_key(name: &str) -> RouteKey {
    RouteKey::new(id(name), L7RouteKind::Http)
}

#[test]
fn excludes_policies_without_targets_in_graph() {
    let mut fixture = Fixture::new();
    let policies = fixture.process(
        vec![
            mk_csp("missing-gw", 0, mk_target(api::GROUP, "Gateway", "missing")),
            mk_csp("other-group", 0, mk_target("example.com", "Gateway", "gw")),
        ],
        vec![mk_op("missing-route", &["missing"])],
        vec![mk_usp("unreferenced-svc", &["other"])],
    );
    assert!(policies.is_empty(), "{policies:#?}");
}

#[test]
fn nothing_is_processed_without_gateways() {
    let mut fixture = Fixture::new();
    fixture.gateways.clear();
    let policies = fixture.process(vec![], vec![], vec![mk_usp("usp", &["svc"])]);
    assert!(policies.is_empty());
}

#[test]
fn attaches_policies_to_targets() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .try_init()
        .ok();

    let mut fixture = Fixture::new();
    let policies = fixture.process(
        vec![mk_csp("csp", 0, mk_target(api::GROUP, "Gateway", "gw"))],
        vec![mk_op("op", &["hr", "hr", "hr-detached"])],
        vec![mk_usp("usp", &["svc"])],
    );

    let csp = &policies[&key(PolicyKind::ClientSettings, "csp")];
    assert!(csp.valid, "{:?}", csp.conditions);
    assert_eq!(csp.ancestors, vec![id("gw")]);

    let op = &policies[&key(PolicyKind::Observability, "op")];
    assert!(op.valid, "{:?}", op.conditions);
    assert_eq!(
        op.targets.iter().map(|t| t.id.name.as_str()).collect::<Vec<_>>(),
        vec!["hr", "hr-detached"]
    );
    assert_eq!(op.ancestors, vec![id("gw")]);
    assert!(op.invalid_for_gateways.is_empty());

    let usp = &policies[&key(PolicyKind::UpstreamSettings, "usp")];
    assert!(usp.valid, "{:?}", usp.conditions);
    assert_eq!(usp.ancestors, vec![id("gw"), id("gw-2")]);

    assert_eq!(
        fixture.gateways[&id("gw")].policies,
        vec![key(PolicyKind::ClientSettings, "csp")]
    );
    assert!(fixture.gateways[&id("gw-2")].policies.is_empty());
    assert_eq!(
        fixture.routes[&http_route_key("hr")].policies,
        vec![key(PolicyKind::Observability, "op")]
    );
    assert!(fixture.routes[&http_route_key("hr-detached")].policies.is_empty());
    assert_eq!(
        fixture.services[&id("svc")].policies,
        vec![key(PolicyKind::UpstreamSettings, "usp")]
    );
}

#[rstest]
#[case::csp_size(
    |p: &mut ClientSettingsPolicy| p.spec.body = Some(ClientBody { max_size: Some("1MB".to_string()), timeout: None }),
    r#"spec.body.maxSize: Invalid value: "1MB""#
)]
#[case::csp_duration(
    |p: &mut ClientSettingsPolicy| p.spec.keep_alive = Some(ClientKeepAlive { time: Some("forever".to_string()), ..Default::default() }),
    r#"spec.keepAlive.time: Invalid value: "forever""#
)]
#[case::csp_header_without_server(
    |p: &mut ClientSettingsPolicy| p.spec.keep_alive = Some(ClientKeepAlive {
        timeout: Some(ClientKeepAliveTimeout { server: None, header: Some("10s".to_string()) }),
        ..Default::default()
    }),
    "spec.keepAlive.timeout.header: Forbidden: header can only be specified if server is specified"
)]
fn rejects_invalid_client_settings(#[case] mutate: fn(&mut ClientSettingsPolicy), #[case] msg: &str) {
    let mut csp = mk_csp("csp", 0, mk_target(api::GROUP, "Gateway", "gw"));
    mutate(&mut csp);

    let mut fixture = Fixture::new();
    let policies = fixture.process(vec![csp], vec![], vec![]);
    let csp = &policies[&key(PolicyKind::ClientSettings, "csp")];

    assert!(!csp.valid);
    assert_eq!(csp.conditions.len(), 1);
    assert_eq!(csp.conditions[0].reason, reasons::INVALID);
    assert!(csp.conditions[0].message.contains(msg), "{}", csp.conditions[0].message);
    assert!(fixture.gateways[&id("gw")].policies.is_empty());
    assert_eq!(csp.ancestors, vec![id("gw")]);
}

#[rstest]
#[case::strategy(
    |t: &mut Tracing| t.strategy = "always".to_string(),
    r#"spec.tracing.strategy: Unsupported value: "always": supported values: "ratio", "parent""#
)]
#[case::ratio_range(
    |t: &mut Tracing| t.ratio = Some(101),
    "spec.tracing.ratio: Invalid value: 101: must be between 0 and 100"
)]
#[case::ratio_with_parent(
    |t: &mut Tracing| t.strategy = "parent".to_string(),
    "spec.tracing.ratio: Forbidden: ratio can only be specified if strategy is of type ratio"
)]
#[case::context(
    |t: &mut Tracing| t.context = Some("drop".to_string()),
    r#"spec.tracing.context: Unsupported value: "drop""#
)]
fn rejects_invalid_tracing(#[case] mutate: fn(&mut Tracing), #[case] msg: &str) {
    let mut op = mk_op("op", &["hr"]);
    if let Some(tracing) = op.spec.tracing.as_mut() {
        mutate(tracing);
    }

    let mut fixture = Fixture::new();
    let policies = fixture.process(vec![], vec![op], vec![]);
    let op = &policies[&key(PolicyKind::Observability, "op")];

    assert!(!op.valid);
    assert!(op.conditions[0].message.contains(msg), "{}", op.conditions[0].message);
}

#[test]
fn rejects_unsupported_target_kinds() {
    let mut op = mk_op("op", &["hr"]);
    op.spec.target_refs.push(mk_target(api::GROUP, "Gateway", "gw"));
    let mut usp = mk_usp("usp", &["svc"]);
    usp.spec.keep_alive = Some(UpstreamKeepAlive {
        timeout: Some("1d".to_string()),
        ..Default::default()
    });

    let mut fixture = Fixture::new();
    let policies = fixture.process(vec![], vec![op], vec![usp]);

    let op = &policies[&key(PolicyKind::Observability, "op")];
    assert!(!op.valid);
    assert_eq!(
        op.conditions[0].message,
        r#"spec.targetRefs[1].kind: Unsupported value: "Gateway": supported values: "HTTPRoute", "GRPCRoute""#
    );

    let usp = &policies[&key(PolicyKind::UpstreamSettings, "usp")];
    assert!(!usp.valid);
    assert!(usp.conditions[0]
        .message
        .starts_with(r#"spec.keepAlive.timeout: Invalid value: "1d""#));
}

#[test]
fn older_policy_wins_conflicts() {
    let mut newer = mk_csp("newer", 20, mk_target(api::GROUP, "Gateway", "gw"));
    newer.spec.keep_alive = Some(ClientKeepAlive {
        requests: Some(10),
        ..Default::default()
    });
    let older = mk_csp("older", 10, mk_target(api::GROUP, "Gateway", "gw"));
    let mut disjoint = mk_csp("disjoint", 30, mk_target(api::GROUP, "Gateway", "gw"));
    disjoint.spec.body = None;
    disjoint.spec.keep_alive = Some(ClientKeepAlive {
        time: Some("10s".to_string()),
        ..Default::default()
    });

    let mut fixture = Fixture::new();
    let policies = fixture.process(vec![newer, older, disjoint], vec![], vec![]);

    assert!(policies[&key(PolicyKind::ClientSettings, "older")].valid);
    assert!(policies[&key(PolicyKind::ClientSettings, "disjoint")].valid);

    let newer = &policies[&key(PolicyKind::ClientSettings, "newer")];
    assert!(!newer.valid);
    assert_eq!(newer.conditions.len(), 1);
    assert_eq!(newer.conditions[0].reason, reasons::CONFLICTED);
    assert_eq!(
        newer.conditions[0].message,
        "Conflicts with another ClientSettingsPolicy"
    );

    assert_eq!(
        fixture.gateways[&id("gw")].policies,
        vec![
            key(PolicyKind::ClientSettings, "disjoint"),
            key(PolicyKind::ClientSettings, "older"),
        ]
    );
}

#[test]
fn policies_on_different_targets_do_not_conflict() {
    let mut fixture = Fixture::new();
    let policies = fixture.process(
        vec![
            mk_csp("csp-gw", 10, mk_target(api::GROUP, "Gateway", "gw")),
            mk_csp("csp-hr", 20, mk_target(api::GROUP, "HTTPRoute", "hr")),
        ],
        vec![],
        vec![],
    );
    assert!(policies.values().all(|p| p.valid));
}

#[test]
fn tracing_requires_telemetry_on_each_gateway() {
    let mut fixture = Fixture::new();
    fixture.routes.extend([mk_route("hr-2", &["gw", "gw-2"], true)]);

    let policies = fixture.process(vec![], vec![mk_op("op", &["hr-2"])], vec![]);
    let op = &policies[&key(PolicyKind::Observability, "op")];

    assert!(op.valid);
    assert_eq!(op.ancestors, vec![id("gw"), id("gw-2")]);
    assert_eq!(op.invalid_for_gateways.keys().collect::<Vec<_>>(), vec![&id("gw-2")]);
    let cond = &op.invalid_for_gateways[&id("gw-2")];
    assert_eq!(cond.reason, reasons::NGINX_PROXY_CONFIG_NOT_SET);
    assert_eq!(cond.message, "Telemetry is not enabled in the NginxProxy resource");
}

#[test]
fn enforces_ancestor_limit() {
    let mut usp = mk_usp("usp", &["svc"]);
    usp.status = Some(PolicyStatus {
        ancestors: (0..15)
            .map(|i| PolicyAncestorStatus {
                ancestor_ref: policy_ancestor::create_parent_reference(
                    api::GROUP,
                    "Gateway",
                    &id(&format!("other-{i}")),
                ),
                controller_name: "example.com/other".to_string(),
                conditions: vec![],
            })
            .collect(),
    });

    let mut fixture = Fixture::new();
    let policies = fixture.process(vec![], vec![], vec![usp]);
    let usp = &policies[&key(PolicyKind::UpstreamSettings, "usp")];

    assert_eq!(usp.ancestors, vec![id("gw")]);
    assert!(fixture.gateways[&id("gw")].conditions.is_empty());
    let conds = &fixture.gateways[&id("gw-2")].conditions;
    assert_eq!(conds.len(), 1);
    assert_eq!(conds[0].reason, reasons::ANCESTOR_LIMIT_REACHED);
    assert!(conds[0].message.contains("UpstreamSettingsPolicy test/usp"));

    // The Service is still reachable through the admitted gateway.
    assert_eq!(
        fixture.services[&id("svc")].policies,
        vec![key(PolicyKind::UpstreamSettings, "usp")]
    );
}

#[rstest]
#[case::gateway("gateway.networking.k8s.io", "Gateway", Some(TargetKind::Gateway))]
#[case::grpc_route("gateway.networking.k8s.io", "GRPCRoute", Some(TargetKind::GrpcRoute))]
#[case::core_service("core", "Service", Some(TargetKind::Service))]
#[case::service_wrong_group("gateway.networking.k8s.io", "Service", None)]
#[case::unknown("", "ConfigMap", None)]
fn parses_target_kinds(#[case] group: &str, #[case] kind: &str, #[case] expected: Option<TargetKind>) {
    assert_eq!(TargetKind::parse(group, kind), expected);
}
