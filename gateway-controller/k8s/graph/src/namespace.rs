use crate::gateway::Gateway;
use nginx_gateway_controller_core::ResourceId;
use nginx_gateway_controller_k8s_api::{Labels, Namespace};
use std::collections::BTreeMap;

/// Selects the namespaces whose labels match the `allowedRoutes` selector of
/// some listener of our gateways. Route admission depends on their labels.
pub(crate) fn build_referenced(
    namespaces: &BTreeMap<ResourceId, Namespace>,
    gateways: &BTreeMap<ResourceId, Gateway>,
) -> BTreeMap<ResourceId, Namespace> {
    let selectors = gateways
        .values()
        .flat_map(|gw| gw.listeners.iter())
        .filter_map(|l| l.allowed_route_label_selector.as_ref())
        .collect::<Vec<_>>();
    if selectors.is_empty() {
        return BTreeMap::new();
    }

    namespaces
        .iter()
        .filter(|(_, ns)| {
            let labels = Labels::from(ns.metadata.labels.clone());
            selectors.iter().any(|s| s.matches(&labels))
        })
        .map(|(id, ns)| (id.clone(), ns.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::mk_built_gateway;
    use maplit::btreemap;
    use nginx_gateway_controller_k8s_api::{ObjectMeta, Selector};
    use pretty_assertions::assert_eq;

    fn mk_namespace(name: &str, labels: &[(&str, &str)]) -> (ResourceId, Namespace) {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        (ResourceId::cluster(name.to_string()), ns)
    }

    #[test]
    fn selects_namespaces_matching_listener_selectors() {
        let namespaces = [
            mk_namespace("apps", &[("team", "apps")]),
            mk_namespace("infra", &[("team", "infra")]),
            mk_namespace("bare", &[]),
        ]
        .into_iter()
        .collect();

        let mut gw = mk_built_gateway("test", "gw", &[("http", "HTTP", 80, None)]);
        gw.listeners[0].allowed_route_label_selector =
            Some(Selector::from_iter(Some(("team", "apps"))));
        let gateways = btreemap! { ResourceId::new("test".to_string(), "gw".to_string()) => gw };

        let referenced = build_referenced(&namespaces, &gateways);
        assert_eq!(
            referenced.keys().collect::<Vec<_>>(),
            vec![&ResourceId::cluster("apps".to_string())]
        );
    }

    #[test]
    fn nothing_is_referenced_without_selectors() {
        let namespaces = [mk_namespace("apps", &[("team", "apps")])].into_iter().collect();
        let gateways = btreemap! {
            ResourceId::new("test".to_string(), "gw".to_string()) =>
                mk_built_gateway("test", "gw", &[("http", "HTTP", 80, None)]),
        };
        assert!(build_referenced(&namespaces, &gateways).is_empty());
    }
}
