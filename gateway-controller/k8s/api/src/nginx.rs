//! NGINX Gateway Fabric extension resources.

mod authentication_filter;
mod nginx_proxy;
mod policies;
mod snippets_filter;

pub use self::{authentication_filter::*, nginx_proxy::*, policies::*, snippets_filter::*};

pub const GROUP: &str = "gateway.nginx.org";
