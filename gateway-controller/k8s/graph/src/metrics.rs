use crate::{policy::PolicyKind, route::RouteKind, Graph};
use nginx_gateway_controller_core::Condition;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::collections::BTreeMap;

const NODE_KINDS: [&str; 8] = [
    "GatewayClass",
    "Gateway",
    "Listener",
    "BackendTLSPolicy",
    "NginxProxy",
    "SnippetsFilter",
    "AuthenticationFilter",
    "InferencePool",
];

/// Describes the graphs produced by [`crate::build`].
#[derive(Clone, Debug)]
pub struct GraphMetrics {
    graph_builds: Counter,
    graph_resources: Family<ResourceLabels, Gauge>,
    graph_conditions: Family<ConditionLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResourceLabels {
    kind: String,
    valid: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ConditionLabels {
    kind: String,
    reason: String,
}

#[derive(Default)]
struct Tally<'g> {
    // (valid, invalid) per kind.
    resources: BTreeMap<&'static str, (i64, i64)>,
    conditions: Vec<(&'static str, &'g Condition)>,
}

// === impl GraphMetrics ===

impl GraphMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let graph_builds = Counter::default();
        prom.register(
            "graph_builds",
            "Count of resource graph builds",
            graph_builds.clone(),
        );

        let graph_resources = Family::default();
        prom.register(
            "graph_resources",
            "Gauge of the number of nodes in the last graph built",
            graph_resources.clone(),
        );

        let graph_conditions = Family::default();
        prom.register(
            "graph_conditions",
            "Count of conditions reported on graph nodes",
            graph_conditions.clone(),
        );

        Self {
            graph_builds,
            graph_resources,
            graph_conditions,
        }
    }

    /// Records a freshly built graph. Resource gauges are reset for every
    /// kind, so kinds absent from `graph` report zero.
    pub fn observe(&self, graph: &Graph) {
        self.graph_builds.inc();

        let mut tally = Tally::default();
        let kinds = NODE_KINDS
            .into_iter()
            .chain(RouteKind::ALL.iter().map(|k| k.as_str()))
            .chain(PolicyKind::ALL.iter().map(|k| k.as_str()));
        for kind in kinds {
            tally.resources.insert(kind, (0, 0));
        }

        if let Some(gc) = &graph.gateway_class {
            tally.record("GatewayClass", gc.valid, &gc.conditions);
        }
        for gw in graph.gateways.values() {
            tally.record("Gateway", gw.valid, &gw.conditions);
            for l in &gw.listeners {
                tally.record("Listener", l.valid, &l.conditions);
            }
        }
        for route in graph.routes.values() {
            tally.record(route.kind().route_kind().as_str(), route.valid, &route.conditions);
        }
        for route in graph.l4_routes.values() {
            tally.record(route.kind().route_kind().as_str(), route.valid, &route.conditions);
        }
        for btp in graph.backend_tls_policies.values() {
            tally.record("BackendTLSPolicy", btp.valid, &btp.conditions);
        }
        for np in graph.nginx_proxies.values() {
            tally.record("NginxProxy", np.valid, &[]);
        }
        for sf in graph.snippets_filters.values() {
            tally.record("SnippetsFilter", sf.valid, &sf.conditions);
        }
        for af in graph.authentication_filters.values() {
            tally.record("AuthenticationFilter", af.valid, &af.conditions);
        }
        for pool in graph.referenced_inference_pools.values() {
            tally.record("InferencePool", pool.valid, &pool.conditions);
        }
        for (key, policy) in &graph.ngf_policies {
            tally.record(key.kind.as_str(), policy.valid, &policy.conditions);
        }

        for (kind, (valid, invalid)) in tally.resources {
            self.graph_resources
                .get_or_create(&ResourceLabels::new(kind, true))
                .set(valid);
            self.graph_resources
                .get_or_create(&ResourceLabels::new(kind, false))
                .set(invalid);
        }
        for (kind, cond) in tally.conditions {
            self.graph_conditions
                .get_or_create(&ConditionLabels {
                    kind: kind.to_string(),
                    reason: cond.reason.to_string(),
                })
                .inc();
        }
    }
}

// === impl ResourceLabels ===

impl ResourceLabels {
    fn new(kind: &str, valid: bool) -> Self {
        Self {
            kind: kind.to_string(),
            valid: valid.to_string(),
        }
    }
}

// === impl Tally ===

impl<'g> Tally<'g> {
    fn record(&mut self, kind: &'static str, valid: bool, conditions: &'g [Condition]) {
        let (v, i) = self.resources.entry(kind).or_default();
        if valid {
            *v += 1;
        } else {
            *i += 1;
        }
        self.conditions.extend(conditions.iter().map(|c| (kind, c)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::mk_built_gateway;
    use nginx_gateway_controller_core::{conditions, ResourceId};
    use prometheus_client::encoding::text::encode;

    fn render(prom: &Registry) -> String {
        let mut out = String::new();
        encode(&mut out, prom).expect("metrics must encode");
        out
    }

    #[test]
    fn counts_nodes_by_kind_and_validity() {
        let mut prom = Registry::default();
        let metrics = GraphMetrics::register(&mut prom);

        let mut invalid = mk_built_gateway("test", "broken", &[("http", "HTTP", 80, None)]);
        invalid.valid = false;
        invalid
            .conditions
            .extend(conditions::gateway_invalid("GatewayClass is invalid"));
        let graph = Graph {
            gateways: [
                (
                    ResourceId::new("test".to_string(), "gw".to_string()),
                    mk_built_gateway(
                        "test",
                        "gw",
                        &[
                            ("http", "HTTP", 80, None),
                            ("https", "HTTPS", 443, Some("*.example.com")),
                        ],
                    ),
                ),
                (ResourceId::new("test".to_string(), "broken".to_string()), invalid),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        metrics.observe(&graph);

        let text = render(&prom);
        assert!(text.contains("graph_builds_total 1"), "{text}");
        assert!(text.contains(r#"graph_resources{kind="Gateway",valid="true"} 1"#), "{text}");
        assert!(text.contains(r#"graph_resources{kind="Gateway",valid="false"} 1"#), "{text}");
        assert!(text.contains(r#"graph_resources{kind="Listener",valid="true"} 3"#), "{text}");
        assert!(text.contains(r#"graph_resources{kind="HTTPRoute",valid="true"} 0"#), "{text}");
        assert!(
            text.contains(r#"graph_conditions_total{kind="Gateway",reason="Invalid"} 2"#),
            "{text}"
        );
    }

    #[test]
    fn resets_kinds_missing_from_later_graphs() {
        let mut prom = Registry::default();
        let metrics = GraphMetrics::register(&mut prom);

        let graph = Graph {
            gateways: [(
                ResourceId::new("test".to_string(), "gw".to_string()),
                mk_built_gateway("test", "gw", &[("http", "HTTP", 80, None)]),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        metrics.observe(&graph);
        metrics.observe(&Graph::default());

        let text = render(&prom);
        assert!(text.contains("graph_builds_total 2"), "{text}");
        assert!(text.contains(r#"graph_resources{kind="Gateway",valid="true"} 0"#), "{text}");
    }
}
