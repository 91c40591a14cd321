use super::RuleErrors;
use crate::{
    extension_ref::{self, ExtensionRefFilter, ExtensionRefKind, ExtensionRefResolver},
    validation::HttpFieldsValidator,
};
use nginx_gateway_controller_core::{ErrorList, FieldError, Path};
use nginx_gateway_controller_k8s_api::gateway::{
    GrpcRouteFilter, HttpHeaderModifier, HttpPathModifier, HttpRequestMirrorFilter,
    HttpRequestRedirectFilter, HttpRouteFilter, HttpUrlRewriteFilter, LocalObjectReference,
};
use std::collections::BTreeSet;

/// A supported rule filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    RequestHeaderModifier(HttpHeaderModifier),
    ResponseHeaderModifier(HttpHeaderModifier),
    RequestRedirect(HttpRequestRedirectFilter),
    UrlRewrite(HttpUrlRewriteFilter),
    RequestMirror(HttpRequestMirrorFilter),
    ExtensionRef {
        source: LocalObjectReference,

        /// `None` when the referenced filter does not exist.
        resolved: Option<ExtensionRefFilter>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteRuleFilters {
    pub filters: Vec<Filter>,

    /// Unset when any filter is invalid. Filters whose extension ref does not
    /// resolve leave the rule valid; they are reported as unresolved refs.
    pub valid: bool,
}

const HTTP_FILTER_TYPES: &[&str] = &[
    "RequestHeaderModifier",
    "ResponseHeaderModifier",
    "RequestRedirect",
    "URLRewrite",
    "RequestMirror",
    "ExtensionRef",
];

/// Response headers NGINX manages itself.
const DISALLOWED_RESPONSE_HEADERS: &[&str] = &[
    "server",
    "date",
    "x-pad",
    "content-type",
    "content-length",
    "connection",
];
const DISALLOWED_RESPONSE_HEADER_PREFIX: &str = "x-accel-";

/// Converts an HTTPRoute filter, failing with the filter type when it is not
/// supported.
pub(super) fn from_http(filter: &HttpRouteFilter) -> Result<Filter, &'static str> {
    Ok(match filter {
        HttpRouteFilter::RequestHeaderModifier {
            request_header_modifier,
        } => Filter::RequestHeaderModifier(request_header_modifier.clone()),
        HttpRouteFilter::ResponseHeaderModifier {
            response_header_modifier,
        } => Filter::ResponseHeaderModifier(response_header_modifier.clone()),
        HttpRouteFilter::RequestRedirect { request_redirect } => {
            Filter::RequestRedirect(request_redirect.clone())
        }
        HttpRouteFilter::UrlRewrite { url_rewrite } => Filter::UrlRewrite(url_rewrite.clone()),
        HttpRouteFilter::RequestMirror { request_mirror } => {
            Filter::RequestMirror(request_mirror.clone())
        }
        HttpRouteFilter::ExtensionRef { extension_ref } => Filter::ExtensionRef {
            source: extension_ref.clone(),
            resolved: None,
        },
        HttpRouteFilter::Cors { .. } => return Err("CORS"),
        HttpRouteFilter::ExternalAuth { .. } => return Err("ExternalAuth"),
    })
}

pub(super) fn from_grpc(filter: &GrpcRouteFilter) -> Filter {
    match filter {
        GrpcRouteFilter::RequestHeaderModifier {
            request_header_modifier,
        } => Filter::RequestHeaderModifier(request_header_modifier.clone()),
        GrpcRouteFilter::ResponseHeaderModifier {
            response_header_modifier,
        } => Filter::ResponseHeaderModifier(response_header_modifier.clone()),
        GrpcRouteFilter::RequestMirror { request_mirror } => {
            Filter::RequestMirror(request_mirror.clone())
        }
        GrpcRouteFilter::ExtensionRef { extension_ref } => Filter::ExtensionRef {
            source: extension_ref.clone(),
            resolved: None,
        },
    }
}

/// Validates a rule's filters and resolves their extension refs.
pub(super) fn process(
    filters: Vec<Result<Filter, &'static str>>,
    path: &Path,
    validator: &dyn HttpFieldsValidator,
    resolver: &mut ExtensionRefResolver<'_>,
) -> (RouteRuleFilters, RuleErrors) {
    let mut errs = RuleErrors::default();
    let mut processed = Vec::with_capacity(filters.len());
    let mut authentication_filters = 0;

    for (i, filter) in filters.into_iter().enumerate() {
        let filter_path = path.index(i);
        let mut filter = match filter {
            Ok(f) => f,
            Err(type_) => {
                errs.invalid.push(FieldError::not_supported(
                    filter_path.child("type"),
                    type_,
                    HTTP_FILTER_TYPES.iter().copied(),
                ));
                continue;
            }
        };

        let invalid = validate(validator, &filter, &filter_path);
        if !invalid.is_empty() {
            errs.invalid.append(invalid);
            continue;
        }

        if let Filter::ExtensionRef { source, resolved } = &mut filter {
            let ext_path = filter_path.child("extensionRef");
            match resolver.resolve(source) {
                None => errs
                    .resolve
                    .push(FieldError::not_found(ext_path, &source.name)),
                Some(ext) => {
                    if !ext.valid {
                        errs.resolve.push(FieldError::invalid(
                            ext_path.clone(),
                            &source.name,
                            format!("referenced {} is invalid", source.kind),
                        ));
                    }
                    if ext.kind == ExtensionRefKind::AuthenticationFilter {
                        authentication_filters += 1;
                        if authentication_filters > 1 {
                            errs.invalid.push(FieldError::forbidden(
                                ext_path,
                                "only one AuthenticationFilter may be referenced per rule",
                            ));
                        }
                    }
                    *resolved = Some(ext);
                }
            }
        }

        processed.push(filter);
    }

    let valid = errs.invalid.is_empty();
    let filters = RouteRuleFilters {
        filters: if valid { processed } else { Vec::new() },
        valid,
    };
    (filters, errs)
}

fn validate(validator: &dyn HttpFieldsValidator, filter: &Filter, path: &Path) -> ErrorList {
    match filter {
        Filter::RequestHeaderModifier(m) => validate_header_modifier(
            validator,
            m,
            &path.child("requestHeaderModifier"),
            false,
        ),
        Filter::ResponseHeaderModifier(m) => validate_header_modifier(
            validator,
            m,
            &path.child("responseHeaderModifier"),
            true,
        ),
        Filter::RequestRedirect(r) => validate_redirect(validator, r, &path.child("requestRedirect")),
        Filter::UrlRewrite(r) => validate_rewrite(validator, r, &path.child("urlRewrite")),
        Filter::RequestMirror(m) => validate_mirror(m, &path.child("requestMirror")),
        Filter::ExtensionRef { source, .. } => extension_ref::validate(source, path),
    }
}

fn validate_header_modifier(
    validator: &dyn HttpFieldsValidator,
    modifier: &HttpHeaderModifier,
    path: &Path,
    response: bool,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut seen = BTreeSet::new();

    let mut check_name = |errs: &mut ErrorList, name: &str, path: Path| {
        if let Err(e) = validator.validate_filter_header_name(name) {
            errs.push(FieldError::invalid(path.clone(), name, e));
        }
        if response && is_disallowed_response_header(name) {
            errs.push(FieldError::invalid(
                path.clone(),
                name,
                "header name is not allowed",
            ));
        }
        if !seen.insert(name.to_ascii_lowercase()) {
            errs.push(FieldError::duplicate(path, name));
        }
    };

    for (field, headers) in [("set", &modifier.set), ("add", &modifier.add)] {
        for (i, h) in headers.iter().flatten().enumerate() {
            let hpath = path.child(field).index(i);
            check_name(&mut errs, &h.name, hpath.child("name"));
            if let Err(e) = validator.validate_filter_header_value(&h.value) {
                errs.push(FieldError::invalid(hpath.child("value"), &h.value, e));
            }
        }
    }

    for (i, name) in modifier.remove.iter().flatten().enumerate() {
        check_name(&mut errs, name, path.child("remove").index(i));
    }

    errs
}

fn is_disallowed_response_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    DISALLOWED_RESPONSE_HEADERS.contains(&name.as_str())
        || name.starts_with(DISALLOWED_RESPONSE_HEADER_PREFIX)
}

fn validate_redirect(
    validator: &dyn HttpFieldsValidator,
    redirect: &HttpRequestRedirectFilter,
    path: &Path,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(scheme) = redirect.scheme.as_deref() {
        if let Err(supported) = validator.validate_redirect_scheme(scheme) {
            errs.push(FieldError::not_supported(
                path.child("scheme"),
                scheme,
                supported.iter().copied(),
            ));
        }
    }

    if let Some(hostname) = redirect.hostname.as_deref() {
        if let Err(e) = validator.validate_hostname(hostname) {
            errs.push(FieldError::invalid(path.child("hostname"), hostname, e));
        }
    }

    if let Some(port) = redirect.port {
        if !(1..=65535).contains(&port) {
            errs.push(FieldError::invalid(
                path.child("port"),
                port,
                "must be between 1 and 65535, inclusive",
            ));
        }
    }

    if let Some(modifier) = redirect.path.as_ref() {
        errs.append(validate_path_modifier(validator, modifier, &path.child("path")));
    }

    if let Some(code) = redirect.status_code {
        if let Err(supported) = validator.validate_redirect_status_code(code) {
            errs.push(FieldError::not_supported(
                path.child("statusCode"),
                code,
                supported.iter().copied(),
            ));
        }
    }

    errs
}

fn validate_rewrite(
    validator: &dyn HttpFieldsValidator,
    rewrite: &HttpUrlRewriteFilter,
    path: &Path,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(hostname) = rewrite.hostname.as_deref() {
        if let Err(e) = validator.validate_hostname(hostname) {
            errs.push(FieldError::invalid(path.child("hostname"), hostname, e));
        }
    }

    if let Some(modifier) = rewrite.path.as_ref() {
        errs.append(validate_path_modifier(validator, modifier, &path.child("path")));
    }

    errs
}

fn validate_path_modifier(
    validator: &dyn HttpFieldsValidator,
    modifier: &HttpPathModifier,
    path: &Path,
) -> ErrorList {
    let (field, value) = match modifier {
        HttpPathModifier::ReplaceFullPath { replace_full_path } => {
            ("replaceFullPath", replace_full_path)
        }
        HttpPathModifier::ReplacePrefixMatch {
            replace_prefix_match,
        } => ("replacePrefixMatch", replace_prefix_match),
    };

    match validator.validate_rewrite_path(value) {
        Ok(()) => ErrorList::new(),
        Err(e) => FieldError::invalid(path.child(field), value, e).into(),
    }
}

fn validate_mirror(mirror: &HttpRequestMirrorFilter, path: &Path) -> ErrorList {
    let mut errs = ErrorList::new();
    if mirror.percent.is_some() {
        errs.push(FieldError::forbidden(path.child("percent"), "percent is not supported"));
    }
    if mirror.fraction.is_some() {
        errs.push(FieldError::forbidden(path.child("fraction"), "fraction is not supported"));
    }
    errs
}

// === impl Filter ===

impl Filter {
    pub fn is_request_mirror(&self) -> bool {
        matches!(self, Self::RequestMirror(_))
    }
}
