#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod conditions;
pub mod field;
pub mod hostname;
mod resource_id;

pub use self::{
    conditions::{Condition, ConditionStatus},
    field::{ErrorList, FieldError, Path},
    resource_id::{creation_order, ResourceId},
};

/// The controller name NGINX Gateway Fabric writes into status entries.
pub const DEFAULT_CONTROLLER_NAME: &str = "gateway.nginx.org/nginx-gateway-controller";

/// The API group of every NGINX Gateway Fabric extension resource.
pub const NGINX_API_GROUP: &str = "gateway.nginx.org";

/// Paths with this prefix are reserved for routes the controller generates itself.
pub const INTERNAL_PATH_PREFIX: &str = "/_ngf-internal";
