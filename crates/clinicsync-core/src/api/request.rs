use serde_json::Value;
use url::form_urlencoded;

use super::transport::Method;

/// Which variants the dispatcher may explore for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Retry with the other trailing-slash form of the path.
    pub try_alternate_slash: bool,
    /// Retry with the credential's secondary scheme after an auth failure.
    pub try_secondary_scheme: bool,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            try_alternate_slash: true,
            try_secondary_scheme: true,
        }
    }
}

/// One logical request. Built per call and never reused.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<Value>,
    policy: AttemptPolicy,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            policy: AttemptPolicy::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append query parameters, skipping any whose value is `None`.
    pub fn with_query(mut self, params: &[(&str, Option<String>)]) -> Self {
        let mut pairs = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .peekable();
        if pairs.peek().is_some() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            let sep = if self.path.contains('?') { '&' } else { '?' };
            self.path = format!("{}{}{}", self.path, sep, query);
        }
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn policy(&self) -> AttemptPolicy {
        self.policy
    }
}

/// The other trailing-slash form of `path`, leaving any query string alone.
///
/// `/visits` <-> `/visits/`, `/sales/range?start=x` <-> `/sales/range/?start=x`.
/// The root path has no alternate form and is returned unchanged.
pub fn alternate_slash(path: &str) -> String {
    let (route, query) = match path.split_once('?') {
        Some((route, query)) => (route, Some(query)),
        None => (path, None),
    };

    let toggled = if route.len() > 1 && route.ends_with('/') {
        route.trim_end_matches('/').to_string()
    } else if route.is_empty() || route == "/" {
        route.to_string()
    } else {
        format!("{}/", route)
    };

    match query {
        Some(query) => format!("{}?{}", toggled, query),
        None => toggled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternate_slash_toggles() {
        assert_eq!(alternate_slash("/visits"), "/visits/");
        assert_eq!(alternate_slash("/visits/"), "/visits");
        assert_eq!(alternate_slash("/visits//"), "/visits");
        assert_eq!(alternate_slash("/"), "/");
    }

    #[test]
    fn test_alternate_slash_keeps_query() {
        assert_eq!(
            alternate_slash("/pharmacy/sales/range/?start=2024-01-01"),
            "/pharmacy/sales/range?start=2024-01-01"
        );
        assert_eq!(alternate_slash("/visits?page=2"), "/visits/?page=2");
    }

    #[test]
    fn test_with_query_skips_missing_values() {
        let req = RequestDescriptor::get("/visits/").with_query(&[
            ("start_date", Some("2024-01-01".to_string())),
            ("end_date", None),
        ]);
        assert_eq!(req.path(), "/visits/?start_date=2024-01-01");

        let req = RequestDescriptor::get("/visits/").with_query(&[("q", None)]);
        assert_eq!(req.path(), "/visits/");
    }

    #[test]
    fn test_with_query_encodes_values() {
        let req = RequestDescriptor::get("/patients/").with_query(&[("q", Some("a b&c".to_string()))]);
        assert_eq!(req.path(), "/patients/?q=a+b%26c");

        let req = RequestDescriptor::get("/visits/?page=2")
            .with_query(&[("since", Some("2024-01-01T08:00".to_string()))]);
        assert_eq!(req.path(), "/visits/?page=2&since=2024-01-01T08%3A00");
    }
}
