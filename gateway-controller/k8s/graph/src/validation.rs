//! Validation of values that end up in the generated NGINX configuration.
//!
//! The CRDs already enforce most of the Gateway API constraints; these checks
//! guard against values that would break or inject into NGINX directives.

use nginx_gateway_controller_core::hostname;
use regex::Regex;
use std::{net::IpAddr, sync::LazyLock};

/// Validates the HTTP route fields that are rendered into NGINX directives.
pub trait HttpFieldsValidator {
    /// Returns true if validation of user-supplied values should be skipped,
    /// as it is for routes the builder generates itself.
    fn skip_validation(&self) -> bool {
        false
    }

    fn validate_path_in_match(&self, path: &str) -> Result<(), String>;
    fn validate_path_in_regex_match(&self, path: &str) -> Result<(), String>;
    fn validate_header_name_in_match(&self, name: &str) -> Result<(), String>;
    fn validate_header_value_in_match(&self, value: &str) -> Result<(), String>;
    fn validate_query_param_name_in_match(&self, name: &str) -> Result<(), String>;
    fn validate_query_param_value_in_match(&self, value: &str) -> Result<(), String>;

    /// On failure, returns the supported methods.
    fn validate_method_in_match(&self, method: &str) -> Result<(), &'static [&'static str]>;

    /// On failure, returns the supported schemes.
    fn validate_redirect_scheme(&self, scheme: &str) -> Result<(), &'static [&'static str]>;

    /// On failure, returns the supported status codes.
    fn validate_redirect_status_code(&self, code: i32) -> Result<(), &'static [&'static str]>;

    fn validate_hostname(&self, hostname: &str) -> Result<(), String>;
    fn validate_rewrite_path(&self, path: &str) -> Result<(), String>;
    fn validate_filter_header_name(&self, name: &str) -> Result<(), String>;
    fn validate_filter_header_value(&self, value: &str) -> Result<(), String>;
}

/// Validates fields against what NGINX accepts.
#[derive(Copy, Clone, Debug, Default)]
pub struct NginxValidator(());

/// Accepts everything. Used for internally generated routes.
#[derive(Copy, Clone, Debug, Default)]
pub struct SkipValidator(());

const PATH_FMT: &str = r"/[^\s{};]*";
const PATH_ERR_MSG: &str =
    "must start with / and must not include any whitespace character, `{`, `}` or `;`";
const PATH_EXAMPLES: &[&str] = &["/", "/path", "/path/subpath-123"];

const ESCAPED_STRING_FMT: &str = r#"([^"\\]|\\.)*"#;
const ESCAPED_STRING_ERR_MSG: &str = r#"must have all '"' (double quotes) escaped and must not end with an unescaped '\' (backslash)"#;

const ESCAPED_STRING_NO_VAR_FMT: &str = r#"([^"$\\]|\\[^$])*"#;
const ESCAPED_STRING_NO_VAR_ERR_MSG: &str = r#"a valid value must have all '"' escaped and must not contain any '$' or end with an unescaped '\'"#;

const HEADER_NAME_FMT: &str = "[-A-Za-z0-9]+";
const HEADER_NAME_ERR_MSG: &str = "a valid HTTP header must consist of alphanumeric characters or '-'";
const MAX_HEADER_LENGTH: usize = 256;
const UNSUPPORTED_HEADERS: &[&str] = &["host", "connection", "upgrade"];

const DURATION_FMT: &str = r"\d{1,4}(ms|s|m|h)?";
const DURATION_ERR_MSG: &str =
    "must contain an, at most, four digit number followed by 'ms', 's', 'm', or 'h'";

const SIZE_FMT: &str = r"\d{1,4}(k|m|g)?";
const SIZE_ERR_MSG: &str = "must contain a number that may be followed by 'k', 'm', or 'g'";

pub const SUPPORTED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];
pub const SUPPORTED_REDIRECT_SCHEMES: &[&str] = &["http", "https"];
pub const SUPPORTED_REDIRECT_STATUS_CODES: &[&str] = &["301", "302"];

macro_rules! anchored {
    ($name:ident, $fmt:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(&format!("^{}$", $fmt)).expect(concat!(stringify!($name), " must compile"))
        });
    };
}

anchored!(PATH, PATH_FMT);
anchored!(ESCAPED_STRING, ESCAPED_STRING_FMT);
anchored!(ESCAPED_STRING_NO_VAR, ESCAPED_STRING_NO_VAR_FMT);
anchored!(HEADER_NAME, HEADER_NAME_FMT);
anchored!(DURATION, DURATION_FMT);
anchored!(SIZE, SIZE_FMT);

// === impl NginxValidator ===

impl HttpFieldsValidator for NginxValidator {
    fn validate_path_in_match(&self, path: &str) -> Result<(), String> {
        if path.is_empty() {
            return Err("cannot be empty".to_string());
        }
        if !PATH.is_match(path) {
            return Err(regex_error(PATH_ERR_MSG, PATH_FMT, PATH_EXAMPLES));
        }
        Ok(())
    }

    fn validate_path_in_regex_match(&self, path: &str) -> Result<(), String> {
        self.validate_path_in_match(path)?;
        Regex::new(path)
            .map(|_| ())
            .map_err(|e| format!("invalid regex for path {path:?}: {e}"))
    }

    fn validate_header_name_in_match(&self, name: &str) -> Result<(), String> {
        validate_header_name(name)
    }

    fn validate_header_value_in_match(&self, value: &str) -> Result<(), String> {
        validate_escaped_string(value, &["my-header-value", "example/12345=="])
    }

    fn validate_query_param_name_in_match(&self, name: &str) -> Result<(), String> {
        validate_escaped_string_no_var_expansion(name, &["myParam", "my-param"])
    }

    fn validate_query_param_value_in_match(&self, value: &str) -> Result<(), String> {
        validate_escaped_string(value, &["my-value", "example/12345=="])
    }

    fn validate_method_in_match(&self, method: &str) -> Result<(), &'static [&'static str]> {
        supported(method, SUPPORTED_METHODS)
    }

    fn validate_redirect_scheme(&self, scheme: &str) -> Result<(), &'static [&'static str]> {
        supported(scheme, SUPPORTED_REDIRECT_SCHEMES)
    }

    fn validate_redirect_status_code(&self, code: i32) -> Result<(), &'static [&'static str]> {
        supported(&code.to_string(), SUPPORTED_REDIRECT_STATUS_CODES)
    }

    fn validate_hostname(&self, hostname: &str) -> Result<(), String> {
        validate_escaped_string_no_var_expansion(hostname, &["host", "example.com"])
    }

    fn validate_rewrite_path(&self, path: &str) -> Result<(), String> {
        if path.is_empty() {
            return Ok(());
        }
        if !PATH.is_match(path) {
            return Err(regex_error(PATH_ERR_MSG, PATH_FMT, PATH_EXAMPLES));
        }
        if path.contains('$') {
            return Err("cannot contain $".to_string());
        }
        Ok(())
    }

    fn validate_filter_header_name(&self, name: &str) -> Result<(), String> {
        validate_header_name(name)
    }

    fn validate_filter_header_value(&self, value: &str) -> Result<(), String> {
        validate_escaped_string_no_var_expansion(value, &["my-header-value", "example/12345=="])
    }
}

// === impl SkipValidator ===

impl HttpFieldsValidator for SkipValidator {
    fn skip_validation(&self) -> bool {
        true
    }

    fn validate_path_in_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_path_in_regex_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_header_name_in_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_header_value_in_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_query_param_name_in_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_query_param_value_in_match(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_method_in_match(&self, _: &str) -> Result<(), &'static [&'static str]> {
        Ok(())
    }

    fn validate_redirect_scheme(&self, _: &str) -> Result<(), &'static [&'static str]> {
        Ok(())
    }

    fn validate_redirect_status_code(&self, _: i32) -> Result<(), &'static [&'static str]> {
        Ok(())
    }

    fn validate_hostname(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_rewrite_path(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_filter_header_name(&self, _: &str) -> Result<(), String> {
        Ok(())
    }

    fn validate_filter_header_value(&self, _: &str) -> Result<(), String> {
        Ok(())
    }
}

// === Generic NGINX values ===

/// Validates an NGINX time value, e.g. `10s`.
pub fn validate_nginx_duration(duration: &str) -> Result<(), String> {
    if DURATION.is_match(duration) {
        return Ok(());
    }
    Err(regex_error(
        DURATION_ERR_MSG,
        DURATION_FMT,
        &["5ms", "10s", "500m", "1000h"],
    ))
}

/// Validates an NGINX size value, e.g. `1m`.
pub fn validate_nginx_size(size: &str) -> Result<(), String> {
    if SIZE.is_match(size) {
        return Ok(());
    }
    Err(regex_error(SIZE_ERR_MSG, SIZE_FMT, &["1024", "8k", "20m", "1g"]))
}

pub fn validate_escaped_string(value: &str, examples: &[&str]) -> Result<(), String> {
    if ESCAPED_STRING.is_match(value) {
        return Ok(());
    }
    Err(regex_error(ESCAPED_STRING_ERR_MSG, ESCAPED_STRING_FMT, examples))
}

pub fn validate_escaped_string_no_var_expansion(
    value: &str,
    examples: &[&str],
) -> Result<(), String> {
    if ESCAPED_STRING_NO_VAR.is_match(value) {
        return Ok(());
    }
    Err(regex_error(
        ESCAPED_STRING_NO_VAR_ERR_MSG,
        ESCAPED_STRING_NO_VAR_FMT,
        examples,
    ))
}

/// Validates a `host[:port]` endpoint where the host is an IP address or a
/// DNS name.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    let (host, port) = match endpoint.rsplit_once(':') {
        // A bare IPv6 address contains colons but no port.
        Some(_) if endpoint.parse::<IpAddr>().is_ok() => (endpoint, None),
        Some((host, port)) => (host.trim_start_matches('[').trim_end_matches(']'), Some(port)),
        None => (endpoint, None),
    };

    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => return Err(format!("port must be a number between 1 and 65535, got {port:?}")),
        }
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    validate_dns_name(host)
}

pub fn validate_ip_address(value: &str) -> Result<(), String> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| "must be a valid IP address".to_string())
}

pub fn validate_cidr(value: &str) -> Result<(), String> {
    value
        .parse::<ipnet::IpNet>()
        .map(|_| ())
        .map_err(|_| "must be a valid CIDR value, (e.g. 10.9.8.0/24 or 2001:db8::/64)".to_string())
}

/// Validates a DNS name. Wildcards are not allowed.
pub fn validate_dns_name(value: &str) -> Result<(), String> {
    if value.starts_with('*') {
        return Err("wildcards are not allowed".to_string());
    }
    hostname::validate(value)
}

fn validate_header_name(name: &str) -> Result<(), String> {
    if name.len() > MAX_HEADER_LENGTH {
        return Err(format!(
            "must be no more than {MAX_HEADER_LENGTH} characters"
        ));
    }
    if !HEADER_NAME.is_match(name) {
        return Err(regex_error(
            HEADER_NAME_ERR_MSG,
            HEADER_NAME_FMT,
            &["X-Header-Name"],
        ));
    }
    if UNSUPPORTED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(format!(
            "unsupported header name configured, unsupported names are: {}",
            UNSUPPORTED_HEADERS.join(", ")
        ));
    }
    Ok(())
}

fn supported(value: &str, values: &'static [&'static str]) -> Result<(), &'static [&'static str]> {
    if values.contains(&value) {
        Ok(())
    } else {
        Err(values)
    }
}

/// Renders a regex validation failure the way the Kubernetes API server does.
fn regex_error(msg: &str, fmt: &str, examples: &[&str]) -> String {
    if examples.is_empty() {
        return format!("{msg} (regex used for validation is '{fmt}')");
    }
    let examples = examples
        .iter()
        .map(|e| format!("'{e}', "))
        .collect::<Vec<_>>()
        .join("or ");
    format!("{msg} (e.g. {examples}regex used for validation is '{fmt}')")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::root("/", true)]
    #[case::nested("/path/subpath-123", true)]
    #[case::relative("path", false)]
    #[case::whitespace("/pa th", false)]
    #[case::brace("/path{", false)]
    #[case::semicolon("/path;", false)]
    #[case::empty("", false)]
    fn paths_in_match(#[case] path: &str, #[case] valid: bool) {
        assert_eq!(NginxValidator::default().validate_path_in_match(path).is_ok(), valid);
        assert!(SkipValidator::default().validate_path_in_match(path).is_ok());
    }

    #[test]
    fn regex_paths_must_compile() {
        let v = NginxValidator::default();
        assert!(v.validate_path_in_regex_match("/v[0-9]+/.*").is_ok());
        assert!(v.validate_path_in_regex_match("/v[0-9+").is_err());
    }

    #[test]
    fn path_error_message() {
        assert_eq!(
            NginxValidator::default().validate_path_in_match("x"),
            Err("must start with / and must not include any whitespace character, `{`, `}` or `;` \
                 (e.g. '/', or '/path', or '/path/subpath-123', regex used for validation is '/[^\\s{};]*')"
                .to_string())
        );
    }

    #[rstest]
    #[case::ok("X-Header", true)]
    #[case::underscore("X_Header", false)]
    #[case::host("Host", false)]
    #[case::upgrade("upgrade", false)]
    fn header_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(
            NginxValidator::default().validate_filter_header_name(name).is_ok(),
            valid
        );
    }

    #[rstest]
    #[case::plain("value", true)]
    #[case::escaped_quote(r#"va\"lue"#, true)]
    #[case::quote(r#"va"lue"#, false)]
    #[case::var("$host", false)]
    #[case::trailing_backslash(r"value\", false)]
    fn filter_header_values(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(
            NginxValidator::default().validate_filter_header_value(value).is_ok(),
            valid
        );
    }

    #[test]
    fn methods_schemes_and_codes() {
        let v = NginxValidator::default();
        assert!(v.validate_method_in_match("GET").is_ok());
        assert_eq!(v.validate_method_in_match("FOO"), Err(SUPPORTED_METHODS));
        assert!(v.validate_redirect_scheme("https").is_ok());
        assert_eq!(v.validate_redirect_scheme("ftp"), Err(SUPPORTED_REDIRECT_SCHEMES));
        assert!(v.validate_redirect_status_code(301).is_ok());
        assert!(v.validate_redirect_status_code(307).is_err());
    }

    #[rstest]
    #[case::ms("100ms", true)]
    #[case::bare("10", true)]
    #[case::hours("1000h", true)]
    #[case::too_long("10000s", false)]
    #[case::units("1d", false)]
    fn durations(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(validate_nginx_duration(value).is_ok(), valid);
    }

    #[rstest]
    #[case::bytes("1024", true)]
    #[case::kilo("8k", true)]
    #[case::giga("1g", true)]
    #[case::upper("1M", false)]
    fn sizes(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(validate_nginx_size(value).is_ok(), valid);
    }

    #[rstest]
    #[case::host("collector.example.com", true)]
    #[case::host_port("collector:4317", true)]
    #[case::ipv4_port("10.0.0.1:4317", true)]
    #[case::ipv6("::1", true)]
    #[case::ipv6_port("[::1]:4317", true)]
    #[case::zero_port("collector:0", false)]
    #[case::bad_port("collector:http", false)]
    #[case::bad_host("-collector", false)]
    fn endpoints(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(validate_endpoint(value).is_ok(), valid, "{value}");
    }

    #[test]
    fn addresses() {
        assert!(validate_ip_address("10.0.0.1").is_ok());
        assert!(validate_ip_address("10.0.0.0/8").is_err());
        assert!(validate_cidr("10.0.0.0/8").is_ok());
        assert!(validate_cidr("2001:db8::/64").is_ok());
        assert!(validate_cidr("10.0.0.1").is_err());
        assert!(validate_dns_name("dns.example.com").is_ok());
        assert!(validate_dns_name("*.example.com").is_err());
    }
}
