use super::*;
use pretty_assertions::assert_eq;
use crate::{
    backend_tls_policy::tests::mk_policy,
    policy::{PolicyKey, PolicyKind},
    policy_ancestor,
    route::{L7RouteKind, RouteKey},
};
use nginx_gateway_controller_core::conditions::reasons;
use nginx_gateway_controller_k8s_api::{
    gateway::{LocalPolicyTargetReference, PolicyAncestorStatus, PolicyStatus, GROUP},
    nginx::{ClientBody, ClientSettingsPolicy, ClientSettingsPolicySpec},
};

/// A snapshot in which `test/svc:443` is reachable from `test/gw`.
fn mk_service_snapshot() -> Snapshot {
    let mut snapshot = mk_snapshot();
    Snapshot::insert(&mut snapshot.services, mk_service("test", "svc", 443));
    Snapshot::insert(
        &mut snapshot.http_routes,
        mk_route(
            "hr",
            &["http"],
            &["foo.example.com"],
            vec![mk_prefix_rule("/", mk_backend(None, "svc", 443))],
        ),
    );
    snapshot
}

fn mk_btp(name: &str, created_secs: i64) -> api::BackendTlsPolicy {
    let mut btp = mk_policy(name, "svc", None);
    btp.metadata = mk_meta("test", name, created_secs);
    btp
}

fn mk_csp(name: &str, created_secs: i64, target: &str) -> ClientSettingsPolicy {
    ClientSettingsPolicy {
        metadata: mk_meta("test", name, created_secs),
        spec: ClientSettingsPolicySpec {
            target_ref: LocalPolicyTargetReference {
                group: GROUP.to_string(),
                kind: "Gateway".to_string(),
                name: target.to_string(),
            },
            body: Some(ClientBody {
                max_size: Some("10m".to_string()),
                timeout: None,
            }),
            keep_alive: None,
        },
        status: None,
    }
}

#[test]
fn oldest_backend_tls_policy_wins() {
    let mut snapshot = mk_service_snapshot();
    Snapshot::insert(&mut snapshot.backend_tls_policies, mk_btp("btp-b", 300));
    Snapshot::insert(&mut snapshot.backend_tls_policies, mk_btp("btp-a", 0));

    let graph = build_default(&snapshot);

    let winner = &graph.backend_tls_policies[&id("test", "btp-a")];
    assert!(winner
        .conditions
        .iter()
        .any(|c| c.reason == reasons::ACCEPTED && c.is_true()));
    assert_eq!(winner.gateways, vec![id("test", "gw")]);

    let loser = &graph.backend_tls_policies[&id("test", "btp-b")];
    assert!(loser.conditions.iter().any(|c| c.reason == reasons::CONFLICTED));

    let route = &graph.routes[&RouteKey::new(id("test", "hr"), L7RouteKind::Http)];
    assert_eq!(
        route.rules[0].backend_refs[0].backend_tls_policy,
        Some(id("test", "btp-a"))
    );
}

#[test]
fn full_ancestor_status_blocks_new_gateways() {
    let mut snapshot = mk_service_snapshot();
    let mut btp = mk_btp("btp", 0);
    btp.status = Some(PolicyStatus {
        ancestors: (0..16)
            .map(|i| PolicyAncestorStatus {
                ancestor_ref: policy_ancestor::create_parent_reference(
                    GROUP,
                    "Gateway",
                    &id("test", &format!("other-{i}")),
                ),
                controller_name: "example.com/other".to_string(),
                conditions: vec![],
            })
            .collect(),
    });
    Snapshot::insert(&mut snapshot.backend_tls_policies, btp);

    let graph = build_default(&snapshot);

    let btp = &graph.backend_tls_policies[&id("test", "btp")];
    assert!(btp.gateways.is_empty());

    let gw = &graph.gateways[&id("test", "gw")];
    let limits = gw
        .conditions
        .iter()
        .filter(|c| c.reason == reasons::ANCESTOR_LIMIT_REACHED)
        .collect::<Vec<_>>();
    assert_eq!(limits.len(), 1);
    assert!(limits[0].message.contains("test/btp"), "{}", limits[0].message);
}

#[test]
fn attaches_client_settings_to_gateway() {
    let mut snapshot = mk_snapshot();
    Snapshot::insert(&mut snapshot.client_settings_policies, mk_csp("csp", 0, "gw"));
    Snapshot::insert(&mut snapshot.client_settings_policies, mk_csp("csp-late", 60, "gw"));
    Snapshot::insert(&mut snapshot.client_settings_policies, mk_csp("csp-missing", 0, "nope"));

    let graph = build_default(&snapshot);

    let key = |name: &str| PolicyKey {
        kind: PolicyKind::ClientSettings,
        id: id("test", name),
    };
    assert_eq!(
        graph.ngf_policies.keys().cloned().collect::<Vec<_>>(),
        vec![key("csp"), key("csp-late")]
    );

    let csp = &graph.ngf_policies[&key("csp")];
    assert!(csp.valid);
    assert_eq!(csp.ancestors, vec![id("test", "gw")]);

    let late = &graph.ngf_policies[&key("csp-late")];
    assert!(!late.valid);
    assert!(late.conditions.iter().any(|c| c.reason == reasons::CONFLICTED));

    assert_eq!(graph.gateways[&id("test", "gw")].policies, vec![key("csp")]);
}
