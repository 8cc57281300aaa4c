//! Request descriptor handed to the page cache

use std::collections::BTreeMap;

use http::header::{COOKIE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// What the page cache needs to know about an incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
}

impl RequestContext {
    /// Create a context for a plain request without headers or query
    pub fn new(
        method: Method,
        scheme: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method,
            scheme: scheme.into(),
            host: host.into().to_ascii_lowercase(),
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
        }
    }

    /// Build from the head of an HTTP request.
    ///
    /// The scheme comes from `X-Forwarded-Proto`, then the URI, defaulting to
    /// `http`. The host comes from the URI authority, then the `Host` header.
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let scheme = header_str(headers, FORWARDED_PROTO)
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| header_str(headers, HOST.as_str()).map(str::to_string))
            .unwrap_or_default();

        let mut context = Self::new(method.clone(), scheme, host, uri.path());
        context.query = uri.query().filter(|q| !q.is_empty()).map(str::to_string);
        context.headers = headers.clone();
        context.cookies = parse_cookies(headers);
        context
    }

    /// Build from an [`http::Request`], ignoring the body
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.method(), request.uri(), request.headers())
    }

    /// Set the raw query string
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name == COOKIE {
            if let Ok(raw) = value.to_str() {
                self.cookies.extend(parse_cookie_header(raw));
            }
        }
        self.headers.append(name, value);
        self
    }

    /// Add a cookie
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid text
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_cookie_header)
        .collect()
}

fn parse_cookie_header(raw: &str) -> impl Iterator<Item = (String, String)> + '_ {
    raw.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
    })
}
