use crate::capability::CapabilityRegistry;
use crate::config::{Config, Module};
use crate::error::McpError;
use crate::http::BitgetClient;
use crate::types::{QueryParams, RateLimitConfig, RequestResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PRODUCT_TYPES: &[&str] = &["USDT-FUTURES", "USDC-FUTURES", "COIN-FUTURES"];
const DEPTH_TYPES: &[&str] = &["step0", "step1", "step2", "step3", "step4", "step5"];
const ACCOUNT_TYPES: &[&str] = &["spot", "futures", "funding", "all"];
const EARN_ACTIONS: &[&str] = &["subscribe", "redeem"];
const MAX_BATCH_ORDERS: usize = 50;

pub type ToolArgs = Map<String, Value>;
pub type ToolFuture<'a> = BoxFuture<'a, anyhow::Result<Value>>;
pub type ToolHandler = for<'a> fn(&'a ToolArgs, ToolContext<'a>) -> ToolFuture<'a>;

/// Shared state a handler may touch.
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub client: &'a BitgetClient,
    pub capabilities: &'a CapabilityRegistry,
}

pub struct ToolSpec {
    pub name: &'static str,
    pub module: Module,
    pub description: &'static str,
    pub input_schema: Value,
    pub is_write: bool,
    pub handler: ToolHandler,
}

impl ToolSpec {
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.into(),
            description: self.description.into(),
            input_schema: self.input_schema.clone(),
            annotations: ToolAnnotations {
                read_only_hint: !self.is_write,
                destructive_hint: self.is_write,
                idempotent_hint: !self.is_write,
                open_world_hint: true,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub read_only_hint: bool,
    pub destructive_hint: bool,
    pub idempotent_hint: bool,
    pub open_world_hint: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

// Argument helpers. Absent and null are treated alike.

pub fn read_string(args: &ToolArgs, key: &str) -> Result<Option<String>, McpError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(McpError::validation(format!(
            "Parameter \"{key}\" must be a string."
        ))),
    }
}

pub fn require_string(args: &ToolArgs, key: &str) -> Result<String, McpError> {
    match read_string(args, key)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(McpError::validation(format!(
            "Missing required parameter \"{key}\"."
        ))),
    }
}

pub fn read_number(args: &ToolArgs, key: &str) -> Result<Option<serde_json::Number>, McpError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.clone())),
        Some(_) => Err(McpError::validation(format!(
            "Parameter \"{key}\" must be a number."
        ))),
    }
}

pub fn read_object_array(args: &ToolArgs, key: &str) -> Result<Option<Vec<ToolArgs>>, McpError> {
    let items = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(object_array_error(key)),
    };
    items
        .iter()
        .map(|item| item.as_object().cloned().ok_or_else(|| object_array_error(key)))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn object_array_error(key: &str) -> McpError {
    McpError::validation(format!("Parameter \"{key}\" must be an array of objects."))
}

pub fn require_object_array(args: &ToolArgs, key: &str) -> Result<Vec<ToolArgs>, McpError> {
    match read_object_array(args, key)? {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(McpError::validation(format!(
            "Missing required non-empty array \"{key}\"."
        ))),
    }
}

pub fn assert_enum(value: &str, key: &str, allowed: &[&str]) -> Result<(), McpError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(McpError::validation(format!(
        "Parameter \"{key}\" must be one of: {}.",
        allowed.join(", ")
    )))
}

fn normalize(res: RequestResult) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(res)?)
}

/// Drops nulls and defaults `force` to `gtc` for limit orders.
pub fn normalize_order(mut order: ToolArgs) -> Result<ToolArgs, McpError> {
    let force = read_string(&order, "force")?;
    let order_type = read_string(&order, "orderType")?;
    if force.is_none() && order_type.as_deref() == Some("limit") {
        order.insert("force".into(), Value::String("gtc".into()));
    }
    order.retain(|_, v| !v.is_null());
    Ok(order)
}

fn spot_get_ticker<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let query = QueryParams::new().push_opt("symbol", read_string(args, "symbol")?);
        let res = ctx
            .client
            .public_get(
                "/api/v2/spot/market/tickers",
                query,
                Some(RateLimitConfig::public("spot_get_ticker", 20)),
            )
            .await?;
        normalize(res)
    }
    .boxed()
}

fn spot_get_depth<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let symbol = require_string(args, "symbol")?;
        let depth_type = read_string(args, "type")?.unwrap_or_else(|| "step0".into());
        assert_enum(&depth_type, "type", DEPTH_TYPES)?;
        let limit = read_number(args, "limit")?;
        let path = if depth_type == "step0" {
            "/api/v2/spot/market/orderbook"
        } else {
            "/api/v2/spot/market/merge-depth"
        };
        let query = QueryParams::new()
            .push("symbol", symbol)
            .push("type", depth_type)
            .push_opt("limit", limit);
        let res = ctx
            .client
            .public_get(path, query, Some(RateLimitConfig::public("spot_get_depth", 20)))
            .await?;
        normalize(res)
    }
    .boxed()
}

fn spot_place_order<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let orders = require_object_array(args, "orders")?;
        if orders.len() > MAX_BATCH_ORDERS {
            return Err(McpError::validation(format!(
                "orders supports at most {MAX_BATCH_ORDERS} items."
            ))
            .into());
        }
        let mut orders = orders
            .into_iter()
            .map(normalize_order)
            .collect::<Result<Vec<_>, _>>()?;
        let (path, body) = if orders.len() == 1 {
            ("/api/v2/spot/trade/place-order", Value::Object(orders.remove(0)))
        } else {
            ("/api/v2/spot/trade/batch-orders", json!({ "orderList": orders }))
        };
        let res = ctx
            .client
            .private_post(path, body, Some(RateLimitConfig::private("spot_place_order", 10)))
            .await?;
        normalize(res)
    }
    .boxed()
}

fn futures_get_ticker<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let product_type = require_string(args, "productType")?;
        assert_enum(&product_type, "productType", PRODUCT_TYPES)?;
        let symbol = read_string(args, "symbol")?;
        let path = if symbol.is_some() {
            "/api/v2/mix/market/ticker"
        } else {
            "/api/v2/mix/market/tickers"
        };
        let query = QueryParams::new()
            .push("productType", product_type)
            .push_opt("symbol", symbol);
        let res = ctx
            .client
            .public_get(path, query, Some(RateLimitConfig::public("futures_get_ticker", 20)))
            .await?;
        normalize(res)
    }
    .boxed()
}

fn get_account_assets<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let account_type = read_string(args, "accountType")?.unwrap_or_else(|| "all".into());
        assert_enum(&account_type, "accountType", ACCOUNT_TYPES)?;
        let coin = read_string(args, "coin")?;
        let product_type = read_string(args, "productType")?;
        if let Some(pt) = &product_type {
            assert_enum(pt, "productType", PRODUCT_TYPES)?;
        } else if account_type == "futures" {
            return Err(McpError::validation(
                "Parameter \"productType\" is required when accountType=futures.",
            )
            .into());
        }
        let path = match account_type.as_str() {
            "spot" => "/api/v2/spot/account/assets",
            "futures" => "/api/v2/mix/account/accounts",
            "funding" => "/api/v2/account/funding-assets",
            _ => "/api/v2/account/all-account-balance",
        };
        let query = QueryParams::new()
            .push_opt("coin", coin)
            .push_opt("productType", product_type);
        let res = ctx
            .client
            .private_get(path, query, Some(RateLimitConfig::private("get_account_assets", 10)))
            .await?;
        normalize(res)
    }
    .boxed()
}

async fn earn_get(
    ctx: ToolContext<'_>,
    operation: &str,
    query: QueryParams,
    rate_key: &str,
) -> Result<RequestResult, McpError> {
    let rate_limit = RateLimitConfig::private(rate_key, 10);
    let client = ctx.client;
    ctx.capabilities
        .earn()
        .resolve(operation, |path| {
            let query = query.clone();
            let rate_limit = rate_limit.clone();
            async move { client.private_get(&path, query, Some(rate_limit)).await }
        })
        .await
}

fn earn_get_products<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let query = QueryParams::new()
            .push_opt("coin", read_string(args, "coin")?)
            .push_opt("productType", read_string(args, "productType")?);
        ctx.capabilities.earn().ensure_supported(ctx.client).await?;
        let res = earn_get(ctx, "products", query, "earn_get_products").await?;
        normalize(res)
    }
    .boxed()
}

fn earn_get_holdings<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let query = QueryParams::new()
            .push_opt("coin", read_string(args, "coin")?)
            .push_opt("productId", read_string(args, "productId")?);
        ctx.capabilities.earn().ensure_supported(ctx.client).await?;
        let res = earn_get(ctx, "holdings", query, "earn_get_holdings").await?;
        normalize(res)
    }
    .boxed()
}

fn earn_subscribe_redeem<'a>(args: &'a ToolArgs, ctx: ToolContext<'a>) -> ToolFuture<'a> {
    async move {
        let action = require_string(args, "action")?;
        assert_enum(&action, "action", EARN_ACTIONS)?;
        let body = json!({
            "productId": require_string(args, "productId")?,
            "amount": require_string(args, "amount")?,
            "coin": require_string(args, "coin")?,
        });
        let earn = ctx.capabilities.earn();
        earn.ensure_supported(ctx.client).await?;
        let rate_limit = RateLimitConfig::private("earn_subscribe_redeem", 5);
        let client = ctx.client;
        let res = earn
            .resolve(&action, |path| {
                let body = body.clone();
                let rate_limit = rate_limit.clone();
                async move { client.private_post(&path, body, Some(rate_limit)).await }
            })
            .await?;
        normalize(res)
    }
    .boxed()
}

fn all_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "spot_get_ticker",
            module: Module::Spot,
            description: "Get real-time ticker data for spot trading pair(s). Public endpoint. Rate limit: 20 req/s per IP.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "Trading pair symbol, e.g. BTCUSDT. Omit for all tickers."}
                }
            }),
            is_write: false,
            handler: spot_get_ticker,
        },
        ToolSpec {
            name: "spot_get_depth",
            module: Module::Spot,
            description: "Get orderbook depth for a spot trading pair. Public endpoint. Rate limit: 20 req/s per IP.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "description": "Trading pair symbol, e.g. BTCUSDT"},
                    "type": {"type": "string", "enum": DEPTH_TYPES, "description": "Depth merge level. step0 means raw orderbook."},
                    "limit": {"type": "number", "description": "Depth levels, default 150, max 150."}
                },
                "required": ["symbol"]
            }),
            is_write: false,
            handler: spot_get_depth,
        },
        ToolSpec {
            name: "spot_place_order",
            module: Module::Spot,
            description: "Place one or more spot orders. [CAUTION] Executes real trades. Private endpoint. Rate limit: 10 req/s per UID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "orders": {
                        "type": "array",
                        "description": "Array of order objects. Single order should still be passed as an array with one item.",
                        "items": {"type": "object"}
                    }
                },
                "required": ["orders"]
            }),
            is_write: true,
            handler: spot_place_order,
        },
        ToolSpec {
            name: "futures_get_ticker",
            module: Module::Futures,
            description: "Get futures ticker for one symbol or all symbols in product type. Public endpoint. Rate limit: 20 req/s per IP.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "productType": {"type": "string", "enum": PRODUCT_TYPES, "description": "Futures product type."},
                    "symbol": {"type": "string", "description": "Contract symbol, e.g. BTCUSDT."}
                },
                "required": ["productType"]
            }),
            is_write: false,
            handler: futures_get_ticker,
        },
        ToolSpec {
            name: "get_account_assets",
            module: Module::Account,
            description: "Get spot/futures/funding/all account balances. Private endpoint. Rate limit: 10 req/s per UID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "accountType": {"type": "string", "enum": ACCOUNT_TYPES, "description": "Target account type. Default all."},
                    "coin": {"type": "string", "description": "Optional coin filter."},
                    "productType": {"type": "string", "enum": PRODUCT_TYPES, "description": "Required when accountType=futures."}
                }
            }),
            is_write: false,
            handler: get_account_assets,
        },
        ToolSpec {
            name: "earn_get_products",
            module: Module::Earn,
            description: "Query available earn products such as savings and staking. Private endpoint. Rate limit: 10 req/s per UID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "coin": {"type": "string"},
                    "productType": {"type": "string"}
                }
            }),
            is_write: false,
            handler: earn_get_products,
        },
        ToolSpec {
            name: "earn_subscribe_redeem",
            module: Module::Earn,
            description: "Subscribe or redeem earn products. [CAUTION] Locks/releases funds. Private endpoint. Rate limit: 5 req/s per UID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": EARN_ACTIONS},
                    "productId": {"type": "string"},
                    "amount": {"type": "string"},
                    "coin": {"type": "string"}
                },
                "required": ["action", "productId", "amount", "coin"]
            }),
            is_write: true,
            handler: earn_subscribe_redeem,
        },
        ToolSpec {
            name: "earn_get_holdings",
            module: Module::Earn,
            description: "Get current earn holdings and earnings records. Private endpoint. Rate limit: 10 req/s per UID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "coin": {"type": "string"},
                    "productId": {"type": "string"}
                }
            }),
            is_write: false,
            handler: earn_get_holdings,
        },
    ]
}

/// Tools for the enabled modules; write tools are dropped in read-only mode.
pub fn build_tools(config: &Config) -> Vec<ToolSpec> {
    all_tool_specs()
        .into_iter()
        .filter(|t| config.module_enabled(t.module))
        .filter(|t| !(config.read_only && t.is_write))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn args(v: Value) -> ToolArgs {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn string_helpers() {
        let a = args(json!({"s": "x", "n": 1, "e": "", "z": null}));
        assert_eq!(read_string(&a, "s").unwrap().as_deref(), Some("x"));
        assert_eq!(read_string(&a, "z").unwrap(), None);
        assert_eq!(read_string(&a, "missing").unwrap(), None);
        let err = read_string(&a, "n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.to_string(), "Parameter \"n\" must be a string.");
        assert!(require_string(&a, "e").is_err());
        assert!(require_string(&a, "missing")
            .unwrap_err()
            .to_string()
            .contains("Missing required parameter \"missing\""));
    }

    #[test]
    fn number_and_array_helpers() {
        let a = args(json!({"n": 150, "s": "150", "orders": [{"a": 1}], "bad": [1], "empty": []}));
        assert_eq!(read_number(&a, "n").unwrap().map(|n| n.to_string()).as_deref(), Some("150"));
        assert!(read_number(&a, "s").is_err());
        assert_eq!(require_object_array(&a, "orders").unwrap().len(), 1);
        assert!(read_object_array(&a, "bad").is_err());
        assert!(require_object_array(&a, "empty").is_err());
    }

    #[test]
    fn enum_check_lists_choices() {
        assert!(assert_enum("USDT-FUTURES", "productType", PRODUCT_TYPES).is_ok());
        let err = assert_enum("SPOT", "productType", PRODUCT_TYPES).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameter \"productType\" must be one of: USDT-FUTURES, USDC-FUTURES, COIN-FUTURES."
        );
    }

    #[test]
    fn limit_orders_default_to_gtc() {
        let o = normalize_order(args(json!({"symbol": "BTCUSDT", "orderType": "limit", "price": null}))).unwrap();
        assert_eq!(o.get("force"), Some(&json!("gtc")));
        assert!(!o.contains_key("price"));

        let o = normalize_order(args(json!({"orderType": "limit", "force": "ioc"}))).unwrap();
        assert_eq!(o.get("force"), Some(&json!("ioc")));

        let o = normalize_order(args(json!({"orderType": "market"}))).unwrap();
        assert!(!o.contains_key("force"));
    }

    #[test]
    fn module_and_read_only_filtering() {
        let mut cfg = Config::new("http://localhost");
        let names: Vec<_> = build_tools(&cfg).iter().map(|t| t.name).collect();
        assert!(names.contains(&"spot_place_order"));
        assert!(!names.iter().any(|n| n.starts_with("earn_")));

        cfg.modules = Module::ALL.to_vec();
        cfg.read_only = true;
        let tools = build_tools(&cfg);
        assert!(tools.iter().all(|t| !t.is_write));
        assert!(tools.iter().any(|t| t.name == "earn_get_products"));
    }

    #[test]
    fn descriptor_annotations_follow_write_flag() {
        let tools = all_tool_specs();
        let write = tools.iter().find(|t| t.name == "spot_place_order").unwrap().descriptor();
        assert!(write.annotations.destructive_hint);
        assert!(!write.annotations.read_only_hint);
        let read = tools.iter().find(|t| t.name == "spot_get_ticker").unwrap().descriptor();
        let v = serde_json::to_value(&read).unwrap();
        assert_eq!(v["annotations"]["readOnlyHint"], json!(true));
        assert_eq!(v["annotations"]["openWorldHint"], json!(true));
        assert!(v.get("inputSchema").is_some());
    }
}
