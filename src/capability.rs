//! Runtime discovery of endpoints whose path varies by account tier or region.
//!
//! A [`CapabilityGroup`] declares, per operation, an ordered list of candidate
//! paths. [`CapabilityGroup::resolve`] walks the list until a candidate answers
//! with something other than HTTP 404, caches the winner, and tracks a
//! monotone [`CapabilityStatus`] for the whole group.
//!
//! Cached endpoints are only abandoned on a 404. A cached path that starts
//! failing for other reasons keeps surfacing that failure; nothing re-probes it.

use crate::config::Module;
use crate::error::McpError;
use crate::http::BitgetClient;
use crate::types::{QueryParams, RateLimitConfig, RequestResult};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    Unknown,
    Supported,
    Unsupported,
}

#[derive(Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub candidates: &'static [&'static str],
}

/// Request issued to decide whether a group is available at all.
#[derive(Debug)]
pub struct ProbeSpec {
    pub operation: &'static str,
    pub query: &'static [(&'static str, &'static str)],
    pub rate_limit_key: &'static str,
    pub rps: u32,
}

pub const EARN_OPERATIONS: &[OperationSpec] = &[
    OperationSpec {
        name: "products",
        candidates: &["/api/v2/earn/product/list", "/api/v2/earn/saving/product/list"],
    },
    OperationSpec {
        name: "holdings",
        candidates: &["/api/v2/earn/holding/list", "/api/v2/earn/saving/holding/list"],
    },
    OperationSpec {
        name: "subscribe",
        candidates: &["/api/v2/earn/subscribe"],
    },
    OperationSpec {
        name: "redeem",
        candidates: &["/api/v2/earn/redeem"],
    },
];

pub const EARN_PROBE: ProbeSpec = ProbeSpec {
    operation: "products",
    query: &[("coin", "USDT")],
    rate_limit_key: "earn_probe",
    rps: 10,
};

#[derive(Debug)]
struct GroupState {
    status: CapabilityStatus,
    endpoints: HashMap<&'static str, String>,
}

#[derive(Debug)]
pub struct CapabilityGroup {
    id: &'static str,
    operations: &'static [OperationSpec],
    probe: &'static ProbeSpec,
    state: Mutex<GroupState>,
    warmup: OnceCell<()>,
}

impl CapabilityGroup {
    pub fn new(
        id: &'static str,
        operations: &'static [OperationSpec],
        probe: &'static ProbeSpec,
    ) -> Self {
        Self {
            id,
            operations,
            probe,
            state: Mutex::new(GroupState {
                status: CapabilityStatus::Unknown,
                endpoints: HashMap::new(),
            }),
            warmup: OnceCell::new(),
        }
    }

    pub fn earn() -> Self {
        Self::new("earn", EARN_OPERATIONS, &EARN_PROBE)
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn status(&self) -> CapabilityStatus {
        self.state.lock().status
    }

    pub fn cached_endpoint(&self, operation: &str) -> Option<String> {
        self.state.lock().endpoints.get(operation).cloned()
    }

    /// Code carried by the error raised when no candidate exists, e.g. `EARN_UNAVAILABLE`.
    pub fn unavailable_code(&self) -> String {
        format!("{}_UNAVAILABLE", self.id.to_uppercase())
    }

    pub fn is_unavailable_error(&self, err: &McpError) -> bool {
        err.code() == Some(self.unavailable_code().as_str())
    }

    fn unavailable_error(&self, operation: &str) -> McpError {
        McpError::api(
            format!(
                "{} API operation \"{operation}\" is unavailable in current account/region or API environment.",
                capitalize(self.id)
            ),
            self.unavailable_code(),
        )
        .with_suggestion(format!(
            "Current Bitget environment does not expose {} endpoints for this account. Consider disabling the {} module for this deployment.",
            self.id, self.id
        ))
    }

    // Only unknown -> supported and unknown -> unsupported are allowed.
    fn mark(&self, next: CapabilityStatus) {
        let mut state = self.state.lock();
        if state.status == CapabilityStatus::Unknown && next != CapabilityStatus::Unknown {
            info!("capability group {} is now {:?}", self.id, next);
            state.status = next;
        }
    }

    /// Cached endpoint first, then the remaining declared candidates in order.
    pub fn candidates(&self, operation: &str) -> Result<Vec<String>, McpError> {
        let spec = self
            .operations
            .iter()
            .find(|op| op.name == operation)
            .ok_or_else(|| McpError::Internal {
                message: format!("Unknown {} operation \"{operation}\".", self.id),
            })?;
        let mut out = Vec::with_capacity(spec.candidates.len());
        if let Some(cached) = self.cached_endpoint(operation) {
            out.push(cached);
        }
        for path in spec.candidates {
            if !out.iter().any(|p| p == path) {
                out.push(path.to_string());
            }
        }
        Ok(out)
    }

    /// Tries candidates in order, advancing only past 404s.
    pub async fn resolve<F, Fut>(&self, operation: &str, mut call: F) -> Result<RequestResult, McpError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<RequestResult, McpError>>,
    {
        let candidates = self.candidates(operation)?;
        let key = self
            .operations
            .iter()
            .find(|op| op.name == operation)
            .map(|op| op.name)
            .unwrap_or_default();
        for path in candidates {
            match call(path.clone()).await {
                Ok(res) => {
                    debug!("{} operation {} resolved to {}", self.id, operation, path);
                    self.state.lock().endpoints.insert(key, path);
                    self.mark(CapabilityStatus::Supported);
                    return Ok(res);
                }
                Err(e) if e.is_not_found() => {
                    debug!("{} candidate {} returned 404, trying next", self.id, path);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        self.mark(CapabilityStatus::Unsupported);
        Err(self.unavailable_error(operation))
    }

    /// Succeeds when the group is known to be available, probing once if needed.
    /// An unsupported group fails without touching the network.
    pub async fn ensure_supported(&self, client: &BitgetClient) -> Result<(), McpError> {
        match self.status() {
            CapabilityStatus::Supported => return Ok(()),
            CapabilityStatus::Unsupported => return Err(self.unavailable_error(self.probe.operation)),
            CapabilityStatus::Unknown => {}
        }
        let query: QueryParams = self.probe.query.iter().copied().collect();
        let rate_limit = RateLimitConfig::private(self.probe.rate_limit_key, self.probe.rps);
        self.resolve(self.probe.operation, |path| {
            let query = query.clone();
            let rate_limit = rate_limit.clone();
            async move { client.private_get(&path, query, Some(rate_limit)).await }
        })
        .await
        .map(|_| ())
    }

    /// One-shot, best-effort probe. Concurrent callers share the same in-flight
    /// probe; later calls return the recorded status without network I/O.
    pub async fn warmup(&self, client: &BitgetClient) -> CapabilityStatus {
        self.warmup
            .get_or_init(|| async {
                if let Err(e) = self.ensure_supported(client).await {
                    debug!("{} warm-up probe failed: {}", self.id, e);
                }
            })
            .await;
        self.status()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Process-wide capability state. Built once by the server and passed by reference.
#[derive(Debug)]
pub struct CapabilityRegistry {
    earn: CapabilityGroup,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            earn: CapabilityGroup::earn(),
        }
    }

    pub fn earn(&self) -> &CapabilityGroup {
        &self.earn
    }

    /// Group gating a module, if the module has ambiguous endpoints.
    pub fn group_for(&self, module: Module) -> Option<&CapabilityGroup> {
        match module {
            Module::Earn => Some(&self.earn),
            Module::Spot | Module::Futures | Module::Account => None,
        }
    }
}
