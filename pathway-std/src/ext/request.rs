//! Request helpers derived from headers, params and the handling application.

use pathway_core::Request;
use serde_json::Value;
use std::net::IpAddr;

const DEFAULT_SUBDOMAIN_OFFSET: usize = 2;

/// Request helpers.
pub trait RequestExt {
    /// A header value. `Referer` and `Referrer` are interchangeable.
    fn get(&self, field: &str) -> Option<String>;

    /// Look up `name` in route params, then the body, then the query.
    fn param_or(&self, name: &str, default: impl Into<Value>) -> Value;

    /// Path portion of the current url.
    fn path(&self) -> String;

    /// Host name from `X-Forwarded-Host` or `Host`, without the port.
    fn header_hostname(&self) -> Option<String>;

    /// Subdomains in reverse order, dropping the `subdomain offset` last
    /// labels.
    fn subdomains(&self) -> Vec<String>;

    /// Whether the request was made over `https`.
    fn secure(&self) -> bool;

    /// Whether `X-Requested-With` is `XMLHttpRequest`.
    fn xhr(&self) -> bool;
}

impl RequestExt for Request {
    fn get(&self, field: &str) -> Option<String> {
        let field = field.to_ascii_lowercase();
        match field.as_str() {
            "referer" | "referrer" => self.header("referrer").or_else(|| self.header("referer")),
            _ => self.header(&field),
        }
    }

    fn param_or(&self, name: &str, default: impl Into<Value>) -> Value {
        if let Some(value) = self.param(name) {
            return Value::String(value);
        }
        for source in [self.body(), self.query()] {
            match source.get(name) {
                Some(Value::Null) | None => {}
                Some(value) => return value.clone(),
            }
        }
        default.into()
    }

    fn path(&self) -> String {
        self.pathname()
    }

    fn header_hostname(&self) -> Option<String> {
        let host = match self.header("x-forwarded-host") {
            Some(forwarded) => forwarded
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_owned(),
            None => self.header("host")?,
        };
        if host.is_empty() {
            return None;
        }
        let offset = if host.starts_with('[') {
            host.find(']').map_or(0, |i| i + 1)
        } else {
            0
        };
        Some(match host[offset..].find(':') {
            Some(colon) => host[..offset + colon].to_owned(),
            None => host,
        })
    }

    fn subdomains(&self) -> Vec<String> {
        let Some(hostname) = self.header_hostname() else {
            return Vec::new();
        };
        let offset = self
            .app()
            .and_then(|app| app.setting("subdomain offset"))
            .and_then(|value| value.as_u64())
            .map_or(DEFAULT_SUBDOMAIN_OFFSET, |n| n as usize);
        let is_ip = hostname
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok();
        let labels: Vec<String> = if is_ip {
            vec![hostname]
        } else {
            hostname.split('.').rev().map(str::to_owned).collect()
        };
        labels.into_iter().skip(offset).collect()
    }

    fn secure(&self) -> bool {
        self.protocol() == "https"
    }

    fn xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn referrer_alias() {
        let req = Request::builder("GET", "/")
            .header("Referer", "http://example.com/")
            .build()
            .unwrap();
        assert_eq!(req.get("Referrer").as_deref(), Some("http://example.com/"));
        assert_eq!(req.get("referer").as_deref(), Some("http://example.com/"));
        assert_eq!(req.get("x-missing"), None);
    }

    #[test]
    fn path_ignores_query() {
        let req = Request::new("GET", "/users/1?tab=posts").unwrap();
        assert_eq!(req.path(), "/users/1");
        assert!(!req.secure());
    }

    #[test]
    fn param_lookup_order() {
        let req = Request::builder("POST", "/")
            .body(json!({"name": "body"}))
            .build()
            .unwrap();
        req.set_query(json!({"name": "query", "page": "2"}));
        assert_eq!(req.param_or("name", "none"), json!("body"));
        assert_eq!(req.param_or("page", "1"), json!("2"));
        assert_eq!(req.param_or("missing", "tj"), json!("tj"));
        req.set_param("name", "params");
        assert_eq!(req.param_or("name", "none"), json!("params"));
    }

    #[test]
    fn hostnames() {
        let req = Request::builder("GET", "/")
            .header("Host", "example.com:3000")
            .build()
            .unwrap();
        assert_eq!(req.header_hostname().as_deref(), Some("example.com"));

        let ipv6 = Request::builder("GET", "/")
            .header("Host", "[::1]:3000")
            .build()
            .unwrap();
        assert_eq!(ipv6.header_hostname().as_deref(), Some("[::1]"));
        assert!(ipv6.subdomains().is_empty());

        let forwarded = Request::builder("GET", "/")
            .header("Host", "localhost")
            .header("X-Forwarded-Host", "example.com, proxy.internal")
            .build()
            .unwrap();
        assert_eq!(forwarded.header_hostname().as_deref(), Some("example.com"));
    }

    #[test]
    fn subdomains_use_default_offset() {
        let req = Request::builder("GET", "/")
            .header("Host", "tobi.ferrets.example.com")
            .build()
            .unwrap();
        assert_eq!(req.subdomains(), ["ferrets", "tobi"]);
    }
}
