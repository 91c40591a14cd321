use ahash::AHashMap as HashMap;
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api::{
    gateway::{self, ReferenceGrant},
    inference,
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
};

/// The target of a cross-namespace reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToResource {
    pub group: String,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
}

/// The kind and namespace of the object making a cross-namespace reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FromResource {
    pub group: &'static str,
    pub kind: &'static str,
    pub namespace: String,
}

/// Answers whether a ReferenceGrant permits a given cross-namespace
/// reference, and remembers which grants were needed to answer.
#[derive(Debug, Default)]
pub struct RefGrantResolver {
    by_target: HashMap<TargetKey, Vec<GrantEntry>>,
    used: RefCell<BTreeSet<ResourceId>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TargetKey {
    group: String,
    kind: String,
    namespace: String,
}

#[derive(Debug)]
struct GrantEntry {
    grant: ResourceId,
    name: Option<String>,
    from: Vec<(String, String, String)>,
}

// === impl ToResource ===

impl ToResource {
    pub fn secret(id: &ResourceId) -> Self {
        Self::core("Secret", id)
    }

    pub fn service(id: &ResourceId) -> Self {
        Self::core("Service", id)
    }

    pub fn inference_pool(id: &ResourceId) -> Self {
        Self {
            group: inference::GROUP.to_string(),
            kind: "InferencePool",
            namespace: id.namespace.clone(),
            name: id.name.clone(),
        }
    }

    fn core(kind: &'static str, id: &ResourceId) -> Self {
        Self {
            group: String::new(),
            kind,
            namespace: id.namespace.clone(),
            name: id.name.clone(),
        }
    }
}

// === impl FromResource ===

impl FromResource {
    pub fn gateway(namespace: &str) -> Self {
        Self::gateway_api("Gateway", namespace)
    }

    pub fn http_route(namespace: &str) -> Self {
        Self::gateway_api("HTTPRoute", namespace)
    }

    pub fn grpc_route(namespace: &str) -> Self {
        Self::gateway_api("GRPCRoute", namespace)
    }

    pub fn tls_route(namespace: &str) -> Self {
        Self::gateway_api("TLSRoute", namespace)
    }

    pub fn tcp_route(namespace: &str) -> Self {
        Self::gateway_api("TCPRoute", namespace)
    }

    pub fn udp_route(namespace: &str) -> Self {
        Self::gateway_api("UDPRoute", namespace)
    }

    fn gateway_api(kind: &'static str, namespace: &str) -> Self {
        Self {
            group: gateway::GROUP,
            kind,
            namespace: namespace.to_string(),
        }
    }
}

// === impl RefGrantResolver ===

impl RefGrantResolver {
    pub fn new(grants: &BTreeMap<ResourceId, ReferenceGrant>) -> Self {
        let mut by_target = HashMap::<TargetKey, Vec<GrantEntry>>::default();
        for (id, grant) in grants {
            let from = grant
                .spec
                .from
                .iter()
                .map(|f| {
                    (
                        normalize_group(&f.group).to_string(),
                        f.kind.clone(),
                        f.namespace.clone(),
                    )
                })
                .collect::<Vec<_>>();

            for to in &grant.spec.to {
                let key = TargetKey {
                    group: normalize_group(&to.group).to_string(),
                    kind: to.kind.clone(),
                    namespace: id.namespace.clone(),
                };
                by_target.entry(key).or_default().push(GrantEntry {
                    grant: id.clone(),
                    name: to.name.clone().filter(|n| !n.is_empty()),
                    from: from.clone(),
                });
            }
        }

        Self {
            by_target,
            used: RefCell::default(),
        }
    }

    /// Returns true if some grant in the target's namespace permits `from`
    /// to reference `to`. Same-namespace references are always allowed and
    /// never consult grants.
    pub fn allowed(&self, to: &ToResource, from: &FromResource) -> bool {
        if to.namespace == from.namespace {
            return true;
        }

        let key = TargetKey {
            group: normalize_group(&to.group).to_string(),
            kind: to.kind.to_string(),
            namespace: to.namespace.clone(),
        };
        let Some(entries) = self.by_target.get(&key) else {
            return false;
        };

        let matched = entries.iter().find(|e| {
            e.name.as_deref().is_none_or(|n| n == to.name)
                && e.from.iter().any(|(g, k, ns)| {
                    g == normalize_group(from.group) && k == from.kind && *ns == from.namespace
                })
        });

        match matched {
            Some(entry) => {
                self.used.borrow_mut().insert(entry.grant.clone());
                true
            }
            None => false,
        }
    }

    /// Binds the referring object so callers can check many targets.
    pub fn allowed_from<'r>(
        &'r self,
        from: &'r FromResource,
    ) -> impl Fn(&ToResource) -> bool + 'r {
        move |to| self.allowed(to, from)
    }

    /// The grants that permitted at least one reference.
    pub fn into_used(self) -> BTreeSet<ResourceId> {
        self.used.into_inner()
    }
}

fn normalize_group(group: &str) -> &str {
    if group == "core" {
        ""
    } else {
        group
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nginx_gateway_controller_k8s_api::{
        gateway::{ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo},
        ObjectMeta,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    pub(crate) fn mk_grant(
        ns: &str,
        name: &str,
        from_kind: &str,
        from_ns: &str,
        to: ReferenceGrantTo,
    ) -> ReferenceGrant {
        ReferenceGrant {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: ReferenceGrantSpec {
                from: vec![ReferenceGrantFrom {
                    group: gateway::GROUP.to_string(),
                    kind: from_kind.to_string(),
                    namespace: from_ns.to_string(),
                }],
                to: vec![to],
            },
        }
    }

    pub(crate) fn to_service(name: Option<&str>) -> ReferenceGrantTo {
        ReferenceGrantTo {
            group: "core".to_string(),
            kind: "Service".to_string(),
            name: name.map(String::from),
        }
    }

    pub(crate) fn resolver(grants: impl IntoIterator<Item = ReferenceGrant>) -> RefGrantResolver {
        let grants = grants
            .into_iter()
            .map(|g| (ResourceId::of(&g), g))
            .collect::<BTreeMap<_, _>>();
        RefGrantResolver::new(&grants)
    }

    fn svc(ns: &str, name: &str) -> ToResource {
        ToResource::service(&ResourceId::new(ns.to_string(), name.to_string()))
    }

    #[rstest]
    #[case::wildcard_name(to_service(None), svc("backends", "any"), true)]
    #[case::named(to_service(Some("web")), svc("backends", "web"), true)]
    #[case::other_name(to_service(Some("web")), svc("backends", "api"), false)]
    #[case::other_namespace(to_service(None), svc("elsewhere", "web"), false)]
    #[case::other_kind(
        to_service(None),
        ToResource::secret(&ResourceId::new("backends".to_string(), "web".to_string())),
        false
    )]
    fn service_grants(
        #[case] to: ReferenceGrantTo,
        #[case] target: ToResource,
        #[case] expected: bool,
    ) {
        let refs = resolver([mk_grant("backends", "rg", "HTTPRoute", "routes", to)]);
        assert_eq!(
            refs.allowed(&target, &FromResource::http_route("routes")),
            expected
        );
    }

    #[test]
    fn same_namespace_never_needs_grant() {
        let refs = resolver([]);
        assert!(refs.allowed(&svc("ns", "web"), &FromResource::grpc_route("ns")));
        assert!(refs.into_used().is_empty());
    }

    #[test]
    fn from_kind_must_match() {
        let refs = resolver([mk_grant(
            "backends",
            "rg",
            "HTTPRoute",
            "routes",
            to_service(None),
        )]);
        let from = FromResource::tcp_route("routes");
        let allowed = refs.allowed_from(&from);
        assert!(!allowed(&svc("backends", "web")));
    }

    #[test]
    fn records_used_grants() {
        let refs = resolver([
            mk_grant(
                "backends",
                "used",
                "Gateway",
                "gw",
                ReferenceGrantTo {
                    group: String::new(),
                    kind: "Secret".to_string(),
                    name: None,
                },
            ),
            mk_grant("backends", "unused", "HTTPRoute", "routes", to_service(None)),
        ]);
        let from = FromResource::gateway("gw");
        assert!(refs.allowed(
            &ToResource::secret(&ResourceId::new("backends".to_string(), "cert".to_string())),
            &from
        ));
        assert_eq!(
            refs.into_used().into_iter().collect::<Vec<_>>(),
            vec![ResourceId::new("backends".to_string(), "used".to_string())]
        );
    }
}
