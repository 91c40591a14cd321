//! Route filters that reference NGINX Gateway Fabric extension resources.

use crate::{
    authentication_filter::{self, AuthenticationFilter},
    snippets_filter::{self, SnippetsFilter},
};
use nginx_gateway_controller_core::{ErrorList, FieldError, Path, ResourceId, NGINX_API_GROUP};
use nginx_gateway_controller_k8s_api::gateway::LocalObjectReference;
use std::collections::BTreeMap;

pub const SNIPPETS_FILTER_KIND: &str = "SnippetsFilter";
pub const AUTHENTICATION_FILTER_KIND: &str = "AuthenticationFilter";

/// A filter resolved through an `extensionRef`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionRefFilter {
    pub kind: ExtensionRefKind,
    pub id: ResourceId,
    pub valid: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtensionRefKind {
    SnippetsFilter,
    AuthenticationFilter,
}

/// Resolves extension refs for the routes of one namespace.
#[derive(Debug)]
pub(crate) struct ExtensionRefResolver<'f> {
    namespace: &'f str,
    snippets: &'f mut BTreeMap<ResourceId, SnippetsFilter>,
    authentication: &'f mut BTreeMap<ResourceId, AuthenticationFilter>,
}

/// Checks the reference itself, independent of whether its target exists.
pub(crate) fn validate(ext: &LocalObjectReference, path: &Path) -> ErrorList {
    let path = path.child("extensionRef");
    let mut errs = ErrorList::new();

    if ext.name.is_empty() {
        errs.push(FieldError::required(path.clone(), "name cannot be empty"));
    }

    if ext.group != NGINX_API_GROUP {
        errs.push(FieldError::not_supported(
            path.clone(),
            &ext.group,
            [NGINX_API_GROUP],
        ));
    }

    if ext.kind != SNIPPETS_FILTER_KIND && ext.kind != AUTHENTICATION_FILTER_KIND {
        errs.push(FieldError::not_supported(
            path,
            &ext.kind,
            [SNIPPETS_FILTER_KIND, AUTHENTICATION_FILTER_KIND],
        ));
    }

    errs
}

// === impl ExtensionRefResolver ===

impl<'f> ExtensionRefResolver<'f> {
    pub(crate) fn new(
        namespace: &'f str,
        snippets: &'f mut BTreeMap<ResourceId, SnippetsFilter>,
        authentication: &'f mut BTreeMap<ResourceId, AuthenticationFilter>,
    ) -> Self {
        Self {
            namespace,
            snippets,
            authentication,
        }
    }

    /// Returns the referenced filter, or `None` when the group or kind is
    /// unknown or no such filter exists.
    pub(crate) fn resolve(&mut self, ext: &LocalObjectReference) -> Option<ExtensionRefFilter> {
        if ext.group != NGINX_API_GROUP {
            return None;
        }
        match ext.kind.as_str() {
            SNIPPETS_FILTER_KIND => snippets_filter::resolve(self.snippets, self.namespace, &ext.name),
            AUTHENTICATION_FILTER_KIND => {
                authentication_filter::resolve(self.authentication, self.namespace, &ext.name)
            }
            _ => None,
        }
    }
}
