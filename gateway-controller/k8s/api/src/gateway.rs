//! Gateway API resources.

mod backend_tls_policy;
#[allow(clippy::module_inception)]
mod gateway;
mod gateway_class;
mod grpcroute;
mod httproute;
mod l4route;
mod reference_grant;
mod shared;

pub use self::{
    backend_tls_policy::*, gateway::*, gateway_class::*, grpcroute::*, httproute::*, l4route::*,
    reference_grant::*, shared::*,
};

pub const GROUP: &str = "gateway.networking.k8s.io";
