//! Binds routes to the listeners their parent refs select.

use super::{
    listener_key, Attachment, L4Route, L4RouteKey, L4RouteKind, L7Route, L7RouteKind, ParentRef,
    RouteKey, RouteKind,
};
use crate::{gateway::Gateway, listener::Listener, nginx_proxy::EffectiveNginxProxy};
use nginx_gateway_controller_core::{conditions, creation_order, hostname, Condition, ResourceId};
use nginx_gateway_controller_k8s_api::Namespace;
use std::collections::{BTreeMap, BTreeSet};

/// The outcome of offering a route to the listeners of one parent ref.
#[derive(Debug, Default)]
struct Offer {
    /// Some listener admits the route's namespace and kind.
    allowed: bool,
    attached: bool,
    attached_to_valid: bool,

    /// Some listener had hostnames left after removing those already taken
    /// on its port.
    hostnames_unique: bool,

    /// A TCP or UDP listener already carries another route.
    multiple_routes: bool,
}

/// Binds every attachable route to the listeners of each gateway, then
/// isolates listeners that share a port.
///
/// L4 routes are bound oldest first so the oldest route keeps a contested
/// hostname and port.
pub(crate) fn bind_routes(
    l7_routes: &mut BTreeMap<RouteKey, L7Route>,
    l4_routes: &mut BTreeMap<L4RouteKey, L4Route>,
    gateways: &mut BTreeMap<ResourceId, Gateway>,
    namespaces: &BTreeMap<ResourceId, Namespace>,
) {
    for (id, gw) in gateways.iter_mut() {
        for (key, route) in l7_routes.iter_mut() {
            bind_l7_route(key, route, id, gw, namespaces);
        }
        for route in l7_routes.values_mut() {
            isolate_hostnames(&mut route.parent_refs, id, gw, false);
        }

        let mut l4 = l4_routes.iter_mut().collect::<Vec<_>>();
        l4.sort_by(|(_, a), (_, b)| creation_order(a.source.metadata(), b.source.metadata()));

        let mut host_ports = BTreeSet::new();
        for (key, route) in l4.iter_mut() {
            bind_l4_route(key, route, id, gw, namespaces, &mut host_ports);
        }
        for (_, route) in l4 {
            isolate_hostnames(&mut route.parent_refs, id, gw, true);
        }
    }
}

fn bind_l7_route(
    key: &RouteKey,
    route: &mut L7Route,
    gw_id: &ResourceId,
    gw: &mut Gateway,
    namespaces: &BTreeMap<ResourceId, Namespace>,
) {
    if !route.attachable {
        return;
    }

    let route_ns = route.source.namespace().to_string();
    let L7Route {
        hostnames,
        rules,
        parent_refs,
        conditions: route_conditions,
        ..
    } = route;

    for parent in parent_refs.iter_mut().filter(|p| p.gateway.id == *gw_id) {
        let (mut attachment, listeners) = validate_parent_ref(parent, gw);

        let http2_disabled = gw
            .effective_nginx_proxy
            .as_ref()
            .is_some_and(EffectiveNginxProxy::is_http2_disabled);
        if key.kind == L7RouteKind::Grpc && http2_disabled {
            attachment.failed_conditions.push(conditions::route_unsupported_configuration(
                "HTTP2 is disabled - cannot configure GRPCRoutes",
            ));
        }

        if attachment.failed_conditions.is_empty() {
            attachment.failed_conditions.extend(
                rules
                    .iter()
                    .flat_map(|r| r.backend_refs.iter())
                    .filter_map(|b| b.invalid_for_gateways.get(gw_id).cloned()),
            );

            let offer = offer_l7(&mut attachment, &listeners, key, &route_ns, hostnames, gw, namespaces);
            match outcome(&offer, listeners.is_empty()) {
                Ok(cond) => {
                    route_conditions.extend(cond);
                    attachment.attached = true;
                }
                Err(cond) => attachment.failed_conditions.push(cond),
            }
        }

        parent.attachment = Some(attachment);
    }
}

fn bind_l4_route(
    key: &L4RouteKey,
    route: &mut L4Route,
    gw_id: &ResourceId,
    gw: &mut Gateway,
    namespaces: &BTreeMap<ResourceId, Namespace>,
    host_ports: &mut BTreeSet<String>,
) {
    if !route.attachable {
        return;
    }

    let route_ns = route.source.namespace().to_string();
    let L4Route {
        spec,
        parent_refs,
        conditions: route_conditions,
        ..
    } = route;

    for parent in parent_refs.iter_mut().filter(|p| p.gateway.id == *gw_id) {
        let (mut attachment, listeners) = validate_parent_ref(parent, gw);

        if attachment.failed_conditions.is_empty() {
            if let Some(cond) = spec
                .backend_refs
                .iter()
                .find_map(|b| b.invalid_for_gateways.get(gw_id))
            {
                attachment.failed_conditions.push(cond.clone());
            }

            let offer = offer_l4(
                &mut attachment,
                &listeners,
                key,
                &route_ns,
                &spec.hostnames,
                gw,
                namespaces,
                host_ports,
            );
            match outcome(&offer, listeners.is_empty()) {
                Ok(cond) => {
                    route_conditions.extend(cond);
                    attachment.attached = true;
                }
                Err(cond) => attachment.failed_conditions.push(cond),
            }
        }

        parent.attachment = Some(attachment);
    }
}

/// Starts the attachment of a parent ref, returning the indexes of the
/// listeners it may attach to. Failures that prevent any attachment are
/// recorded on the attachment.
fn validate_parent_ref(parent: &ParentRef, gw: &Gateway) -> (Attachment, Vec<usize>) {
    let mut attachment = Attachment::default();

    let Some(mut listeners) = find_attachable_listeners(parent, &gw.listeners) else {
        attachment.failed_conditions.push(conditions::route_no_matching_parent());
        return (attachment, Vec::new());
    };

    if !gw.valid {
        attachment.failed_conditions.push(conditions::route_invalid_gateway());
        return (attachment, listeners);
    }

    listeners.sort_by(|a, b| {
        let host = |idx: &usize| gw.listeners[*idx].source.hostname.as_deref().unwrap_or_default();
        hostname::specificity_order(host(a), host(b))
    });
    (attachment, listeners)
}

/// Returns `None` when the parent ref selects no listener at all. A listener
/// that is selected but not attachable yields an empty list.
fn find_attachable_listeners(parent: &ParentRef, listeners: &[Listener]) -> Option<Vec<usize>> {
    if let Some(section) = parent.section_name.as_deref() {
        let (idx, l) = listeners.iter().enumerate().find(|(_, l)| l.name == section)?;
        if parent.port.is_some_and(|p| p != l.port()) {
            return None;
        }
        return Some(if l.attachable { vec![idx] } else { Vec::new() });
    }

    if let Some(port) = parent.port {
        let on_port = listeners
            .iter()
            .enumerate()
            .filter(|(_, l)| l.port() == port)
            .collect::<Vec<_>>();
        if on_port.is_empty() {
            return None;
        }
        return Some(
            on_port
                .into_iter()
                .filter(|(_, l)| l.attachable)
                .map(|(idx, _)| idx)
                .collect(),
        );
    }

    if listeners.is_empty() {
        return None;
    }
    Some(
        listeners
            .iter()
            .enumerate()
            .filter(|(_, l)| l.attachable)
            .map(|(idx, _)| idx)
            .collect(),
    )
}

fn offer_l7(
    attachment: &mut Attachment,
    listeners: &[usize],
    key: &RouteKey,
    route_ns: &str,
    route_hostnames: &[String],
    gw: &mut Gateway,
    namespaces: &BTreeMap<ResourceId, Namespace>,
) -> Offer {
    let mut offer = Offer::default();

    for idx in listeners {
        let l = &mut gw.listeners[*idx];
        if !admits(l, route_ns, key.kind.route_kind(), namespaces) {
            continue;
        }
        offer.allowed = true;

        let hostnames = hostname::accepted_hostnames(l.hostname(), route_hostnames);
        if hostnames.is_empty() {
            continue;
        }

        attachment
            .accepted_hostnames
            .insert(listener_key(&l.gateway, &l.name), hostnames);
        attachment.listener_port = Some(l.port());
        l.routes.insert(key.clone());

        offer.attached = true;
        offer.attached_to_valid |= l.valid;
    }

    offer.hostnames_unique = true;
    offer
}

#[allow(clippy::too_many_arguments)]
fn offer_l4(
    attachment: &mut Attachment,
    listeners: &[usize],
    key: &L4RouteKey,
    route_ns: &str,
    route_hostnames: &[String],
    gw: &mut Gateway,
    namespaces: &BTreeMap<ResourceId, Namespace>,
    host_ports: &mut BTreeSet<String>,
) -> Offer {
    let mut offer = Offer::default();
    let single_route = matches!(key.kind, L4RouteKind::Tcp | L4RouteKind::Udp);

    for idx in listeners {
        let l = &mut gw.listeners[*idx];
        if !admits(l, route_ns, key.kind.route_kind(), namespaces) {
            continue;
        }
        offer.allowed = true;

        if single_route && l.l4_routes.iter().any(|k| k != key) {
            offer.multiple_routes = true;
            offer.hostnames_unique = true;
            continue;
        }

        let accepted = hostname::accepted_hostnames(l.hostname(), route_hostnames);
        let port = l.port();
        let hostnames = accepted
            .iter()
            .filter(|h| host_ports.insert(format!("{h}:{port}")))
            .cloned()
            .collect::<Vec<_>>();

        if hostnames.is_empty() {
            // Nothing matched, or every match is taken on this port.
            offer.hostnames_unique |= accepted.is_empty();
            continue;
        }
        offer.hostnames_unique = true;

        attachment
            .accepted_hostnames
            .insert(listener_key(&l.gateway, &l.name), hostnames);
        attachment.listener_port = Some(port);
        l.l4_routes.insert(key.clone());

        offer.attached = true;
        offer.attached_to_valid |= l.valid;
    }

    offer
}

fn admits(
    l: &Listener,
    route_ns: &str,
    kind: RouteKind,
    namespaces: &BTreeMap<ResourceId, Namespace>,
) -> bool {
    l.allows_route_namespace(route_ns, namespaces) && l.allows_kind(kind)
}

/// Turns an offer into the parent ref's outcome. An attached route may still
/// carry a condition for the route when no valid listener took it.
fn outcome(offer: &Offer, no_listeners: bool) -> Result<Option<Condition>, Condition> {
    if no_listeners {
        return Err(conditions::route_invalid_listener());
    }

    if !offer.attached {
        if !offer.allowed {
            return Err(conditions::route_not_allowed_by_listeners());
        }
        if offer.multiple_routes {
            return Err(conditions::route_multiple_routes_on_listener());
        }
        if !offer.hostnames_unique {
            return Err(conditions::route_hostname_conflict());
        }
        return Err(conditions::route_no_matching_listener_hostname());
    }

    if !offer.attached_to_valid {
        return Ok(Some(conditions::route_invalid_listener()));
    }
    Ok(None)
}

/// Removes, from parent refs that name a listener, the hostnames that
/// another listener of the gateway serves explicitly.
///
/// For L7 routes only listeners on the attachment's port are considered.
fn isolate_hostnames(parent_refs: &mut [ParentRef], gw_id: &ResourceId, gw: &Gateway, l4: bool) {
    for parent in parent_refs.iter_mut().filter(|p| p.gateway.id == *gw_id) {
        if parent.section_name.is_none() {
            continue;
        }
        let Some(attachment) = parent.attachment.as_mut() else {
            continue;
        };

        let port = attachment.listener_port;
        for (key, hostnames) in attachment.accepted_hostnames.iter_mut() {
            hostnames.retain(|h| {
                !gw.listeners.iter().any(|l| {
                    let other = l.source.hostname.as_deref().unwrap_or_default();
                    !other.is_empty()
                        && other == h
                        && listener_key(gw_id, &l.name) != *key
                        && (l4 || Some(l.port()) == port)
                })
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend_ref::BackendRef,
        route::{
            tests::mk_built_gateway, L4RouteSource, L4RouteSpec, L7RouteSource, ParentRefGateway,
            RouteRule, RouteRuleFilters,
        },
    };
    use maplit::btreemap;
    use nginx_gateway_controller_core::conditions::reasons;
    use nginx_gateway_controller_k8s_api::{
        chrono::{TimeZone, Utc},
        gateway as api,
        nginx::NginxProxySpec,
        ObjectMeta, Time,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn gw_id() -> ResourceId {
        ResourceId::new("test".to_string(), "gw".to_string())
    }

    fn mk_ref(section: Option<&str>, port: Option<i32>) -> ParentRef {
        ParentRef {
            idx: 0,
            gateway: ParentRefGateway {
                id: gw_id(),
                effective_nginx_proxy: None,
            },
            section_name: section.map(str::to_string),
            port,
            attachment: None,
        }
    }

    fn meta(ns: &str, name: &str, created: i64) -> ObjectMeta {
        ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            creation_timestamp: Some(Time(Utc.timestamp_opt(created, 0).unwrap())),
            ..Default::default()
        }
    }

    fn mk_l7(
        kind: L7RouteKind,
        ns: &str,
        hostnames: &[&str],
        parent_refs: Vec<ParentRef>,
    ) -> (RouteKey, L7Route) {
        let metadata = meta(ns, "route", 0);
        let source = match kind {
            L7RouteKind::Http => L7RouteSource::Http(api::HttpRoute {
                metadata,
                spec: Default::default(),
                status: None,
            }),
            L7RouteKind::Grpc => L7RouteSource::Grpc(api::GrpcRoute {
                metadata,
                spec: Default::default(),
                status: None,
            }),
        };
        let route = L7Route {
            source,
            hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
            rules: vec![RouteRule {
                matches: Vec::new(),
                filters: RouteRuleFilters {
                    filters: Vec::new(),
                    valid: true,
                },
                route_backend_refs: Vec::new(),
                backend_refs: Vec::new(),
                session_persistence: None,
                valid_matches: true,
            }],
            parent_refs,
            conditions: Vec::new(),
            policies: Vec::new(),
            valid: true,
            attachable: true,
        };
        (route.key(), route)
    }

    fn mk_l4(
        kind: L4RouteKind,
        name: &str,
        created: i64,
        hostnames: &[&str],
        parent_refs: Vec<ParentRef>,
    ) -> (L4RouteKey, L4Route) {
        let metadata = meta("test", name, created);
        let source = match kind {
            L4RouteKind::Tls => L4RouteSource::Tls(api::TlsRoute {
                metadata,
                spec: Default::default(),
                status: None,
            }),
            L4RouteKind::Tcp => L4RouteSource::Tcp(api::TcpRoute {
                metadata,
                spec: Default::default(),
                status: None,
            }),
            L4RouteKind::Udp => L4RouteSource::Udp(api::UdpRoute {
                metadata,
                spec: Default::default(),
                status: None,
            }),
        };
        let route = L4Route {
            source,
            spec: L4RouteSpec {
                hostnames: hostnames.iter().map(|h| h.to_string()).collect(),
                backend_refs: Vec::new(),
            },
            parent_refs,
            conditions: Vec::new(),
            valid: true,
            attachable: true,
        };
        (route.key(), route)
    }

    fn bind_l7(
        gateway: Gateway,
        route: (RouteKey, L7Route),
    ) -> (L7Route, Gateway) {
        let key = route.0.clone();
        let mut l7 = BTreeMap::from([route]);
        let mut gateways = btreemap! { gw_id() => gateway };
        bind_routes(&mut l7, &mut BTreeMap::new(), &mut gateways, &BTreeMap::new());
        (
            l7.remove(&key).expect("route must exist"),
            gateways.remove(&gw_id()).expect("gateway must exist"),
        )
    }

    fn bind_l4(
        gateway: Gateway,
        routes: Vec<(L4RouteKey, L4Route)>,
    ) -> (BTreeMap<L4RouteKey, L4Route>, Gateway) {
        let mut l4 = routes.into_iter().collect();
        let mut gateways = btreemap! { gw_id() => gateway };
        bind_routes(&mut BTreeMap::new(), &mut l4, &mut gateways, &BTreeMap::new());
        (l4, gateways.remove(&gw_id()).expect("gateway must exist"))
    }

    fn attachment(parent: &ParentRef) -> &Attachment {
        parent.attachment.as_ref().expect("parent ref must be processed")
    }

    fn failed_reasons(parent: &ParentRef) -> Vec<&'static str> {
        attachment(parent)
            .failed_conditions
            .iter()
            .map(|c| c.reason)
            .collect()
    }

    fn http_gateway() -> Gateway {
        mk_built_gateway(
            "test",
            "gw",
            &[
                ("http", "HTTP", 80, Some("*.example.com")),
                ("other", "HTTP", 8080, None),
            ],
        )
    }

    #[test]
    fn attaches_to_named_listener() {
        let (route, gw) = bind_l7(
            http_gateway(),
            mk_l7(L7RouteKind::Http, "test", &["foo.example.com"], vec![mk_ref(Some("http"), None)]),
        );

        let a = attachment(&route.parent_refs[0]);
        assert!(a.attached);
        assert!(a.failed_conditions.is_empty());
        assert_eq!(a.listener_port, Some(80));
        assert_eq!(
            a.accepted_hostnames,
            btreemap! { "test/gw/http".to_string() => vec!["foo.example.com".to_string()] }
        );
        assert!(gw.listeners[0].routes.contains(&route.key()));
        assert!(gw.listeners[1].routes.is_empty());
        assert!(route.conditions.is_empty());
    }

    #[test]
    fn attaches_to_every_listener_on_port() {
        let gw = mk_built_gateway(
            "test",
            "gw",
            &[("a", "HTTP", 80, Some("a.example.com")), ("b", "HTTP", 80, None)],
        );
        let (route, gw) = bind_l7(gw, mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(None, Some(80))]));

        let a = attachment(&route.parent_refs[0]);
        assert!(a.attached);
        assert_eq!(
            a.accepted_hostnames,
            btreemap! {
                "test/gw/a".to_string() => vec!["a.example.com".to_string()],
                "test/gw/b".to_string() => vec![hostname::WILDCARD_HOSTNAME.to_string()],
            }
        );
        assert!(gw.listeners.iter().all(|l| l.routes.len() == 1));
    }

    #[rstest]
    #[case::unknown_section(Some("missing"), None)]
    #[case::section_port_mismatch(Some("http"), Some(8080))]
    #[case::unknown_port(None, Some(9999))]
    fn reports_missing_parent(#[case] section: Option<&str>, #[case] port: Option<i32>) {
        let (route, _) = bind_l7(
            http_gateway(),
            mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(section, port)]),
        );
        assert!(!attachment(&route.parent_refs[0]).attached);
        assert_eq!(
            failed_reasons(&route.parent_refs[0]),
            vec![reasons::NO_MATCHING_PARENT]
        );
    }

    #[test]
    fn reports_invalid_gateway() {
        let mut gw = http_gateway();
        gw.valid = false;
        let (route, gw) = bind_l7(gw, mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("http"), None)]));
        assert_eq!(failed_reasons(&route.parent_refs[0]), vec![reasons::INVALID_GATEWAY]);
        assert!(gw.listeners[0].routes.is_empty());
    }

    #[test]
    fn grpc_requires_http2() {
        let mut gw = http_gateway();
        gw.effective_nginx_proxy = Some(EffectiveNginxProxy(NginxProxySpec {
            disable_http2: Some(true),
            ..Default::default()
        }));
        let (route, _) = bind_l7(
            gw,
            mk_l7(L7RouteKind::Grpc, "test", &[], vec![mk_ref(Some("other"), None)]),
        );

        let a = attachment(&route.parent_refs[0]);
        assert!(!a.attached);
        assert_eq!(a.failed_conditions.len(), 1);
        assert_eq!(
            a.failed_conditions[0].message,
            "HTTP2 is disabled - cannot configure GRPCRoutes"
        );
    }

    #[test]
    fn listeners_admit_same_namespace_by_default() {
        let (route, _) = bind_l7(
            http_gateway(),
            mk_l7(L7RouteKind::Http, "other", &[], vec![mk_ref(Some("other"), None)]),
        );
        assert_eq!(
            failed_reasons(&route.parent_refs[0]),
            vec![reasons::NOT_ALLOWED_BY_LISTENERS]
        );
    }

    #[test]
    fn listeners_check_route_kind() {
        let gw = mk_built_gateway("test", "gw", &[("tls", "TLS", 443, None)]);
        let (route, _) = bind_l7(gw, mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("tls"), None)]));
        assert_eq!(
            failed_reasons(&route.parent_refs[0]),
            vec![reasons::NOT_ALLOWED_BY_LISTENERS]
        );
    }

    #[test]
    fn reports_hostname_mismatch() {
        let (route, _) = bind_l7(
            http_gateway(),
            mk_l7(L7RouteKind::Http, "test", &["foo.other.com"], vec![mk_ref(Some("http"), None)]),
        );
        assert_eq!(
            failed_reasons(&route.parent_refs[0]),
            vec![reasons::NO_MATCHING_LISTENER_HOSTNAME]
        );
    }

    #[test]
    fn invalid_listeners_attach_with_condition() {
        let mut gw = http_gateway();
        gw.listeners[0].valid = false;
        let (route, gw) = bind_l7(gw, mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("http"), None)]));

        assert!(attachment(&route.parent_refs[0]).attached);
        assert!(gw.listeners[0].routes.contains(&route.key()));
        assert_eq!(
            route.conditions.iter().map(|c| c.reason).collect::<Vec<_>>(),
            vec![reasons::INVALID_LISTENER]
        );
    }

    #[test]
    fn unattachable_listeners_fail_the_ref() {
        let mut gw = http_gateway();
        gw.listeners[0].attachable = false;
        let (route, _) = bind_l7(gw, mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("http"), None)]));
        assert_eq!(
            failed_reasons(&route.parent_refs[0]),
            vec![reasons::INVALID_LISTENER]
        );
    }

    #[test]
    fn propagates_backend_gateway_failures() {
        let (key, mut route) =
            mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("other"), None)]);
        route.rules[0].backend_refs = vec![BackendRef {
            valid: true,
            invalid_for_gateways: btreemap! {
                gw_id() => conditions::route_invalid_ip_family("mismatch"),
            },
            ..Default::default()
        }];

        let (route, _) = bind_l7(http_gateway(), (key, route));
        let a = attachment(&route.parent_refs[0]);
        assert!(a.attached);
        assert_eq!(failed_reasons(&route.parent_refs[0]), vec![reasons::INVALID_IP_FAMILY]);
    }

    #[test]
    fn skips_unattachable_routes() {
        let (key, mut route) = mk_l7(L7RouteKind::Http, "test", &[], vec![mk_ref(Some("http"), None)]);
        route.attachable = false;
        let (route, gw) = bind_l7(http_gateway(), (key, route));
        assert_eq!(route.parent_refs[0].attachment, None);
        assert!(gw.listeners[0].routes.is_empty());
    }

    #[test]
    fn isolates_wildcard_listener_hostnames() {
        let gw = mk_built_gateway(
            "test",
            "gw",
            &[
                ("l1", "HTTP", 443, Some("*.example.com")),
                ("l2", "HTTP", 443, Some("foo.example.com")),
            ],
        );
        let (route, _) = bind_l7(
            gw,
            mk_l7(
                L7RouteKind::Http,
                "test",
                &["foo.example.com"],
                vec![mk_ref(Some("l1"), None), mk_ref(Some("l2"), None)],
            ),
        );

        let l1 = attachment(&route.parent_refs[0]);
        let l2 = attachment(&route.parent_refs[1]);
        assert!(l1.attached);
        assert!(l2.attached);
        assert_eq!(l1.accepted_hostnames["test/gw/l1"], Vec::<String>::new());
        assert_eq!(l2.accepted_hostnames["test/gw/l2"], vec!["foo.example.com".to_string()]);
    }

    #[test]
    fn isolation_ignores_other_ports() {
        let gw = mk_built_gateway(
            "test",
            "gw",
            &[
                ("l1", "HTTP", 80, Some("*.example.com")),
                ("l2", "HTTP", 8080, Some("foo.example.com")),
            ],
        );
        let (route, _) = bind_l7(
            gw,
            mk_l7(L7RouteKind::Http, "test", &["foo.example.com"], vec![mk_ref(Some("l1"), None)]),
        );
        assert_eq!(
            attachment(&route.parent_refs[0]).accepted_hostnames["test/gw/l1"],
            vec!["foo.example.com".to_string()]
        );
    }

    #[test]
    fn oldest_tcp_route_owns_the_listener() {
        let gw = mk_built_gateway("test", "gw", &[("tcp", "TCP", 9000, None)]);
        let (routes, gw) = bind_l4(
            gw,
            vec![
                mk_l4(L4RouteKind::Tcp, "newer", 20, &[], vec![mk_ref(Some("tcp"), None)]),
                mk_l4(L4RouteKind::Tcp, "older", 10, &[], vec![mk_ref(Some("tcp"), None)]),
            ],
        );

        let [newer, older] = ["newer", "older"].map(|name| {
            routes
                .values()
                .find(|r| r.source.metadata().name.as_deref() == Some(name))
                .expect("route must exist")
        });
        assert!(attachment(&older.parent_refs[0]).attached);
        assert_eq!(
            failed_reasons(&newer.parent_refs[0]),
            vec![reasons::MULTIPLE_ROUTES_ON_LISTENER]
        );
        assert_eq!(gw.listeners[0].l4_routes.len(), 1);
        assert!(gw.listeners[0].l4_routes.contains(&older.key()));
    }

    #[test]
    fn tls_routes_conflict_on_hostname_and_port() {
        let gw = mk_built_gateway(
            "test",
            "gw",
            &[("a", "TLS", 443, None), ("b", "TLS", 443, Some("app.example.com"))],
        );
        let (routes, gw) = bind_l4(
            gw,
            vec![
                mk_l4(L4RouteKind::Tls, "first", 10, &["app.example.com"], vec![mk_ref(Some("b"), None)]),
                mk_l4(L4RouteKind::Tls, "second", 20, &["app.example.com"], vec![mk_ref(Some("a"), None)]),
                mk_l4(L4RouteKind::Tls, "third", 30, &["other.example.com"], vec![mk_ref(Some("a"), None)]),
            ],
        );

        let by_name = |name: &str| {
            routes
                .values()
                .find(|r| r.source.metadata().name.as_deref() == Some(name))
                .expect("route must exist")
        };
        assert!(attachment(&by_name("first").parent_refs[0]).attached);
        assert_eq!(
            failed_reasons(&by_name("second").parent_refs[0]),
            vec![reasons::HOSTNAME_CONFLICT]
        );
        assert!(attachment(&by_name("third").parent_refs[0]).attached);
        assert_eq!(gw.listeners[0].l4_routes.len(), 1);
        assert_eq!(gw.listeners[1].l4_routes.len(), 1);
    }

    #[test]
    fn l4_isolation_removes_hostnames_of_other_listeners() {
        let gw = mk_built_gateway(
            "test",
            "gw",
            &[
                ("wildcard", "TLS", 443, Some("*.example.com")),
                ("app", "TLS", 8443, Some("app.example.com")),
            ],
        );
        let (routes, _) = bind_l4(
            gw,
            vec![mk_l4(
                L4RouteKind::Tls,
                "route",
                10,
                &["app.example.com", "api.example.com"],
                vec![mk_ref(Some("wildcard"), None)],
            )],
        );

        let route = routes.values().next().expect("route must exist");
        assert_eq!(
            attachment(&route.parent_refs[0]).accepted_hostnames["test/gw/wildcard"],
            vec!["api.example.com".to_string()]
        );
    }
}
