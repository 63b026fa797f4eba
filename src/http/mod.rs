pub mod rate_limit;
pub mod signer;

use crate::config::Config;
use crate::error::{now_iso, McpError};
use crate::types::{
    AuthMode, HttpMethod, QueryParams, RateLimitConfig, RequestDescriptor, RequestResult,
};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub use rate_limit::RateLimiter;

pub const SUCCESS_CODE: &str = "00000";
pub const AUTH_FAILURE_CODES: [&str; 3] = ["40017", "40018", "40036"];
const PREVIEW_LIMIT: usize = 160;

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    default_headers.insert("locale", HeaderValue::from_static("en-US"));
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .use_rustls_tls()
        .build()
}

/// Serializes query parameters in caller order. Nulls are dropped, arrays are
/// comma-joined and strings are emitted without JSON quoting.
pub fn build_query_string(query: &QueryParams) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in query.iter() {
        if let Some(text) = query_value_text(value) {
            ser.append_pair(key, &text);
        }
    }
    ser.finish()
}

fn query_value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// First 160 characters of a response body with whitespace runs collapsed.
pub fn body_preview(raw: &str) -> String {
    let head: String = raw.chars().take(PREVIEW_LIMIT).collect();
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Maps a non-success HTTP status with an unparseable body to a vendor error.
pub fn map_status_to_error(status: StatusCode, raw: &str) -> McpError {
    let preview = body_preview(raw);
    let preview = if preview.is_empty() {
        "Non-JSON response body".to_string()
    } else {
        preview
    };
    McpError::api(
        format!("HTTP {} from Bitget: {}", status.as_u16(), preview),
        status.as_u16().to_string(),
    )
    .with_suggestion("Verify endpoint path and request parameters.")
}

/// Classifies a parsed vendor body received with a success status.
pub fn classify_vendor_code(body: &Value, endpoint: &str) -> Result<(), McpError> {
    let code = match body.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(()),
    };
    if code.is_empty() || code == SUCCESS_CODE {
        return Ok(());
    }
    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("Bitget API request failed.")
        .to_string();
    if AUTH_FAILURE_CODES.contains(&code.as_str()) {
        return Err(McpError::Authentication {
            message,
            suggestion: Some("Check API key, secret, passphrase and permissions.".into()),
            endpoint: Some(endpoint.to_string()),
        });
    }
    Err(McpError::api(message, code).with_endpoint(endpoint))
}

/// Signed, throttled REST pipeline shared by every tool.
pub struct BitgetClient {
    config: Config,
    http: Client,
    limiter: RateLimiter,
}

impl BitgetClient {
    pub fn new(config: Config) -> Result<Self, McpError> {
        Self::with_limiter(config, RateLimiter::default())
    }

    pub fn with_limiter(config: Config, limiter: RateLimiter) -> Result<Self, McpError> {
        let http = build_client(&config).map_err(|e| {
            McpError::config(
                format!("HTTP client could not be constructed: {e}"),
                "Check BITGET_API_BASE_URL and TLS configuration.",
            )
        })?;
        Ok(Self {
            config,
            http,
            limiter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn public_get(
        &self,
        path: &str,
        query: QueryParams,
        rate_limit: Option<RateLimitConfig>,
    ) -> Result<RequestResult, McpError> {
        let mut req = RequestDescriptor::get(path, AuthMode::Public).query(query);
        req.rate_limit = rate_limit;
        self.execute(req).await
    }

    pub async fn private_get(
        &self,
        path: &str,
        query: QueryParams,
        rate_limit: Option<RateLimitConfig>,
    ) -> Result<RequestResult, McpError> {
        let mut req = RequestDescriptor::get(path, AuthMode::Private).query(query);
        req.rate_limit = rate_limit;
        self.execute(req).await
    }

    pub async fn private_post(
        &self,
        path: &str,
        body: Value,
        rate_limit: Option<RateLimitConfig>,
    ) -> Result<RequestResult, McpError> {
        let mut req = RequestDescriptor::post(path, body);
        req.rate_limit = rate_limit;
        self.execute(req).await
    }

    /// Issues exactly one HTTP call for `req` and classifies the outcome.
    ///
    /// Transport failures carry `METHOD path?query` as their endpoint. Vendor,
    /// HTTP-status and rate-limit failures carry the bare `METHOD path`, the
    /// same value a successful result reports.
    pub async fn execute(&self, req: RequestDescriptor) -> Result<RequestResult, McpError> {
        let query = build_query_string(&req.query);
        let path_with_query = if query.is_empty() {
            req.path.clone()
        } else {
            format!("{}?{}", req.path, query)
        };
        let endpoint = req.endpoint();
        let full_endpoint = format!("{} {}", req.method.as_str(), path_with_query);
        let body = match &req.body {
            Some(v) => serde_json::to_string(v).map_err(|e| {
                McpError::validation(format!("Request body is not serializable: {e}"))
            })?,
            None => String::new(),
        };

        let credentials = match req.auth {
            AuthMode::Public => None,
            AuthMode::Private => Some(self.config.credentials.as_ref().ok_or_else(|| {
                McpError::config(
                    "Private endpoint requires API credentials.",
                    "Configure BITGET_API_KEY, BITGET_SECRET_KEY and BITGET_PASSPHRASE.",
                )
            })?),
        };

        if let Some(rl) = &req.rate_limit {
            self.limiter
                .consume(rl, 1.0)
                .await
                .map_err(|e| e.with_endpoint(endpoint.clone()))?;
        }

        let url = format!("{}{}", self.config.base_url, path_with_query);
        let mut builder = match req.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url).body(body.clone()),
        };
        if let Some(creds) = credentials {
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let payload =
                signer::signing_payload(&timestamp, req.method.as_str(), &path_with_query, &body);
            let signature = signer::sign(&payload, &creds.secret_key)?;
            builder = builder
                .header("ACCESS-KEY", &creds.api_key)
                .header("ACCESS-SIGN", signature)
                .header("ACCESS-PASSPHRASE", &creds.passphrase)
                .header("ACCESS-TIMESTAMP", timestamp);
        }

        debug!("bitget request {}", full_endpoint);
        let res = builder.send().await.map_err(|e| {
            warn!("bitget transport error on {}: {}", full_endpoint, e);
            McpError::network(
                format!("Failed to call Bitget endpoint {full_endpoint}."),
                full_endpoint.clone(),
                Some(Box::new(e)),
            )
        })?;

        let status = res.status();
        let raw_text = res.text().await.map_err(|e| {
            McpError::network(
                format!("Failed to read Bitget response for {full_endpoint}."),
                full_endpoint.clone(),
                Some(Box::new(e)),
            )
        })?;

        let parsed: Value = if raw_text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&raw_text) {
                Ok(v) => v,
                Err(e) => {
                    if !status.is_success() {
                        return Err(map_status_to_error(status, &raw_text).with_endpoint(endpoint));
                    }
                    return Err(McpError::network(
                        format!("Bitget returned non-JSON response for {full_endpoint}."),
                        full_endpoint.clone(),
                        Some(Box::new(e)),
                    ));
                }
            }
        };

        if !status.is_success() {
            let msg = parsed
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            warn!("bitget {} returned HTTP {}", endpoint, status.as_u16());
            return Err(McpError::api(
                format!("HTTP {} from Bitget: {}", status.as_u16(), msg),
                status.as_u16().to_string(),
            )
            .with_suggestion("Retry later or verify endpoint parameters.")
            .with_endpoint(endpoint));
        }

        classify_vendor_code(&parsed, &endpoint)?;

        Ok(RequestResult {
            endpoint,
            request_time: now_iso(),
            data: parsed.get("data").cloned().unwrap_or(Value::Null),
            raw: parsed,
        })
    }
}
