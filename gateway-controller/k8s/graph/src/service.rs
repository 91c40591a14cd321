use crate::{
    backend_ref::{self, BackendRef},
    gateway::Gateway,
    policy::PolicyKey,
    route::{L4Route, L4RouteKey, L7Route, ParentRef, RouteKey},
};
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api::Service;
use std::collections::{BTreeMap, BTreeSet};

/// A Service that a valid route of one of our gateways sends traffic to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferencedService {
    /// The gateways whose routes reference this Service.
    pub gateways: BTreeSet<ResourceId>,

    /// Set for an `ExternalName` Service.
    pub external_name: Option<String>,

    /// NGF policies targeting this Service.
    pub policies: Vec<PolicyKey>,
}

/// Indexes the Services referenced by valid routes, by gateway. Invalid
/// backend refs still count once their Service is known.
pub(crate) fn build_referenced(
    l7_routes: &BTreeMap<RouteKey, L7Route>,
    l4_routes: &BTreeMap<L4RouteKey, L4Route>,
    gateways: &BTreeMap<ResourceId, Gateway>,
    services: &BTreeMap<ResourceId, Service>,
) -> BTreeMap<ResourceId, ReferencedService> {
    let mut referenced = BTreeMap::new();

    for gw in gateways.keys() {
        let l7 = l7_routes
            .values()
            .filter(|r| r.valid && belongs_to(&r.parent_refs, gw))
            .flat_map(|r| r.rules.iter().flat_map(|rule| rule.backend_refs.iter()));
        let l4 = l4_routes
            .values()
            .filter(|r| r.valid && belongs_to(&r.parent_refs, gw))
            .flat_map(|r| r.spec.backend_refs.iter());

        for backend in l7.chain(l4) {
            add(&mut referenced, backend, gw, services);
        }
    }

    referenced
}

fn belongs_to(parent_refs: &[ParentRef], gateway: &ResourceId) -> bool {
    parent_refs.iter().any(|p| p.gateway.id == *gateway)
}

fn add(
    referenced: &mut BTreeMap<ResourceId, ReferencedService>,
    backend: &BackendRef,
    gateway: &ResourceId,
    services: &BTreeMap<ResourceId, Service>,
) {
    if backend.service.name.is_empty() {
        return;
    }

    referenced
        .entry(backend.service.clone())
        .or_insert_with(|| ReferencedService {
            external_name: services
                .get(&backend.service)
                .filter(|svc| backend_ref::is_external_name(svc))
                .map(|svc| {
                    svc.spec
                        .as_ref()
                        .and_then(|s| s.external_name.clone())
                        .unwrap_or_default()
                }),
            ..Default::default()
        })
        .gateways
        .insert(gateway.clone());
}

// === impl ReferencedService ===

impl ReferencedService {
    pub fn is_external_name(&self) -> bool {
        self.external_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{
        tests::mk_built_gateway, L4RouteKind, L4RouteSource, L4RouteSpec, ParentRefGateway,
    };
    use maplit::{btreemap, btreeset};
    use nginx_gateway_controller_k8s_api::{gateway as api, ObjectMeta, ServiceSpec};
    use pretty_assertions::assert_eq;

    fn id(ns: &str, name: &str) -> ResourceId {
        ResourceId::new(ns.to_string(), name.to_string())
    }

    fn mk_parent(gw: &str) -> ParentRef {
        ParentRef {
            idx: 0,
            gateway: ParentRefGateway {
                id: id("test", gw),
                effective_nginx_proxy: None,
            },
            section_name: None,
            port: None,
            attachment: None,
        }
    }

    fn mk_backend(name: &str) -> BackendRef {
        BackendRef {
            service: if name.is_empty() {
                ResourceId::default()
            } else {
                id("test", name)
            },
            valid: true,
            ..Default::default()
        }
    }

    fn mk_tcp_route(name: &str, valid: bool, gateways: &[&str], backends: &[&str]) -> L4Route {
        L4Route {
            source: L4RouteSource::Tcp(api::TcpRoute {
                metadata: ObjectMeta {
                    namespace: Some("test".to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: api::TcpRouteSpec::default(),
                status: None,
            }),
            spec: L4RouteSpec {
                hostnames: Vec::new(),
                backend_refs: backends.iter().map(|b| mk_backend(b)).collect(),
            },
            parent_refs: gateways.iter().map(|gw| mk_parent(gw)).collect(),
            conditions: Vec::new(),
            valid,
            attachable: true,
        }
    }

    fn l4_key(name: &str) -> L4RouteKey {
        L4RouteKey {
            id: id("test", name),
            kind: L4RouteKind::Tcp,
        }
    }

    #[test]
    fn indexes_services_by_gateway() {
        let gateways = btreemap! {
            id("test", "gw-a") => mk_built_gateway("test", "gw-a", &[]),
            id("test", "gw-b") => mk_built_gateway("test", "gw-b", &[]),
        };
        let l4 = btreemap! {
            l4_key("r1") => mk_tcp_route("r1", true, &["gw-a", "gw-b"], &["svc", ""]),
            l4_key("r2") => mk_tcp_route("r2", true, &["gw-b"], &["other"]),
            l4_key("r3") => mk_tcp_route("r3", false, &["gw-a"], &["invalid-route-svc"]),
        };

        let referenced = build_referenced(&BTreeMap::new(), &l4, &gateways, &BTreeMap::new());
        assert_eq!(
            referenced,
            btreemap! {
                id("test", "svc") => ReferencedService {
                    gateways: btreeset! { id("test", "gw-a"), id("test", "gw-b") },
                    ..Default::default()
                },
                id("test", "other") => ReferencedService {
                    gateways: btreeset! { id("test", "gw-b") },
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn records_external_names() {
        let gateways = btreemap! { id("test", "gw") => mk_built_gateway("test", "gw", &[]) };
        let l4 = btreemap! { l4_key("r") => mk_tcp_route("r", true, &["gw"], &["ext"]) };
        let services = btreemap! {
            id("test", "ext") => Service {
                metadata: ObjectMeta {
                    namespace: Some("test".to_string()),
                    name: Some("ext".to_string()),
                    ..Default::default()
                },
                spec: Some(ServiceSpec {
                    type_: Some("ExternalName".to_string()),
                    external_name: Some("example.com".to_string()),
                    ..Default::default()
                }),
                status: None,
            },
        };

        let referenced = build_referenced(&BTreeMap::new(), &l4, &gateways, &services);
        let svc = &referenced[&id("test", "ext")];
        assert!(svc.is_external_name());
        assert_eq!(svc.external_name.as_deref(), Some("example.com"));
    }
}
