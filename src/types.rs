use serde::{Deserialize, Serialize};
use serde_json::Value;

// Shared request/response shapes used by the HTTP pipeline, capability probing and tools.

/// Logical throttling domain and its steady-state budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub key: String,
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl RateLimitConfig {
    pub fn new(key: impl Into<String>, capacity: f64, refill_per_second: f64) -> Self {
        Self {
            key: key.into(),
            capacity,
            refill_per_second,
        }
    }

    pub fn public(key: &str, rps: u32) -> Self {
        Self::new(format!("public:{key}"), rps as f64, rps as f64)
    }

    pub fn private(key: &str, rps: u32) -> Self {
        Self::new(format!("private:{key}"), rps as f64, rps as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Public,
    Private,
}

/// Ordered query parameters. Insertion order is the wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, Value)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Pushes only when the value is present.
    pub fn push_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One outbound call. Built per request, never persisted.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub auth: AuthMode,
    pub query: QueryParams,
    pub body: Option<Value>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>, auth: AuthMode) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            auth,
            query: QueryParams::new(),
            body: None,
            rate_limit: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            auth: AuthMode::Private,
            query: QueryParams::new(),
            body: Some(body),
            rate_limit: None,
        }
    }

    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// `METHOD path` without the query string.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

/// Successful pipeline outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub endpoint: String,
    #[serde(rename = "requestTime")]
    pub request_time: String,
    pub data: Value,
    #[serde(skip)]
    pub raw: Value,
}
