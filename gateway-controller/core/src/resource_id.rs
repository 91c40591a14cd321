use nginx_gateway_controller_k8s_api::{ObjectMeta, Resource, ResourceExt};
use std::{cmp::Ordering, fmt};

/// Identifies a Kubernetes object by namespace and name.
///
/// Cluster-scoped objects carry an empty namespace.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }

    pub fn cluster(name: String) -> Self {
        Self {
            namespace: String::new(),
            name,
        }
    }

    pub fn of<T: Resource>(resource: &T) -> Self {
        Self {
            namespace: resource.namespace().unwrap_or_default(),
            name: resource.name_any(),
        }
    }
}

/// Orders objects by creation timestamp, oldest first, breaking ties by
/// namespace and then name. Objects without a timestamp sort first.
pub fn creation_order(a: &ObjectMeta, b: &ObjectMeta) -> Ordering {
    let created = |m: &ObjectMeta| m.creation_timestamp.as_ref().map(|t| t.0);
    created(a)
        .cmp(&created(b))
        .then_with(|| a.namespace.cmp(&b.namespace))
        .then_with(|| a.name.cmp(&b.name))
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            return self.name.fmt(f);
        }
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
