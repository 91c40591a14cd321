//! Hostname validation and matching for listeners and routes.

use regex::Regex;
use std::{cmp::Ordering, sync::LazyLock};

/// The hostname recorded for a route attached to a listener that has no
/// hostname and a route that declares none: it matches every host.
pub const WILDCARD_HOSTNAME: &str = "~^";

const DNS1123_SUBDOMAIN_FMT: &str = r"[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*";
const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

static DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{DNS1123_SUBDOMAIN_FMT}$")).expect("subdomain regex must compile")
});

static WILDCARD_DNS1123_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\*\.{DNS1123_SUBDOMAIN_FMT}$"))
        .expect("wildcard subdomain regex must compile")
});

/// Validates a hostname as an RFC 1123 subdomain, optionally prefixed by a
/// single `*.` wildcard label.
pub fn validate(hostname: &str) -> Result<(), String> {
    if hostname.is_empty() {
        return Err("cannot be empty string".to_string());
    }

    let mut msgs = Vec::new();
    if hostname.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        msgs.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LEN} characters"
        ));
    }

    if hostname.starts_with("*.") {
        if !WILDCARD_DNS1123_SUBDOMAIN.is_match(hostname) {
            msgs.push(format!(
                "a wildcard DNS-1123 subdomain must start with '*.', followed by a valid DNS \
                 subdomain, which must consist of lower case alphanumeric characters, '-' or '.' \
                 and end with an alphanumeric character (e.g. '*.example.com', regex used for \
                 validation is '\\*\\.{DNS1123_SUBDOMAIN_FMT}')"
            ));
        }
    } else if !DNS1123_SUBDOMAIN.is_match(hostname) {
        msgs.push(format!(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, \
             '-' or '.', and must start and end with an alphanumeric character (e.g. \
             'example.com', regex used for validation is '{DNS1123_SUBDOMAIN_FMT}')"
        ));
    }

    if msgs.is_empty() {
        Ok(())
    } else {
        Err(msgs.join(","))
    }
}

/// Returns true if either hostname matches the other, honoring a leading
/// wildcard label on either side.
pub fn matches(listener: &str, route: &str) -> bool {
    fn wildcard_match(wildcard: &str, host: &str) -> bool {
        match wildcard.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => host.ends_with(suffix),
            _ => false,
        }
    }

    listener == route || wildcard_match(listener, route) || wildcard_match(route, listener)
}

/// Returns the more specific of two hostnames, or an empty string when
/// neither is more specific.
///
/// Exact hostnames beat wildcards, then more labels beat fewer, then longer
/// beats shorter. An empty hostname is the least specific.
pub fn more_specific<'h>(a: &'h str, b: &'h str) -> &'h str {
    if a == b {
        return a;
    }
    if a.is_empty() {
        return b;
    }
    if b.is_empty() {
        return a;
    }

    match (a.starts_with('*'), b.starts_with('*')) {
        (false, true) => return a,
        (true, false) => return b,
        _ => {}
    }

    let (dots_a, dots_b) = (a.matches('.').count(), b.matches('.').count());
    if dots_a != dots_b {
        return if dots_a > dots_b { a } else { b };
    }

    match a.len().cmp(&b.len()) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => "",
    }
}

/// Orders listener hostnames so that more specific hostnames come first and
/// empty hostnames come last.
pub fn specificity_order(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if a.is_empty() {
        return Ordering::Greater;
    }
    if b.is_empty() {
        return Ordering::Less;
    }
    if more_specific(a, b) == a {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Computes the hostnames a route is accepted for on a listener.
///
/// With no route hostnames the listener hostname is accepted (or every host
/// if the listener has none). Otherwise each matching route hostname
/// contributes the more specific of the pair.
pub fn accepted_hostnames(listener: Option<&str>, route: &[String]) -> Vec<String> {
    let listener = listener.unwrap_or_default();

    if route.is_empty() {
        if listener.is_empty() {
            return vec![WILDCARD_HOSTNAME.to_string()];
        }
        return vec![listener.to_string()];
    }

    route
        .iter()
        .filter_map(|host| {
            if listener.is_empty() {
                return Some(host.clone());
            }
            if matches(listener, host) {
                return Some(more_specific(listener, host).to_string());
            }
            None
        })
        .collect()
}
