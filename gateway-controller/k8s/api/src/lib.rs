#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod gateway;
pub mod inference;
pub mod labels;
pub mod nginx;

pub use self::labels::{Labels, Selector};
pub use k8s_openapi::{
    api::core::v1::{
        ConfigMap, Namespace, Secret, Service, ServicePort, ServiceSpec, ServiceStatus,
    },
    apimachinery::pkg::apis::meta::v1::{
        Condition, LabelSelector, LabelSelectorRequirement, Time,
    },
    chrono, ByteString,
};
pub use kube::{core::ObjectMeta, Resource, ResourceExt};

/// Checks whether a `group`/`kind` reference names the given resource type.
///
/// An absent or empty group is treated as the core API group.
pub fn targets_kind<T>(group: Option<&str>, kind: &str) -> bool
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();

    let mut t_group = &*T::group(&dt);
    if t_group.is_empty() {
        t_group = "core";
    }

    let group = match group {
        None | Some("") => "core",
        Some(g) => g,
    };

    group == t_group && *kind == *T::kind(&dt)
}
