use crate::capability::{CapabilityRegistry, CapabilityStatus};
use crate::config::{Config, Module};
use crate::error::{now_iso, to_payload, McpError};
use crate::http::BitgetClient;
use crate::mcp::mcp_wrap;
use crate::tools::{build_tools, ToolAnnotations, ToolContext, ToolDescriptor, ToolSpec, PROTOCOL_VERSION};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const SERVER_NAME: &str = "bitget-mcp";
pub const SYSTEM_CAPABILITIES_TOOL: &str = "system_get_capabilities";

// Minimal JSON-RPC 2.0 types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Str(String),
    Num(i64),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn rpc_error(id: Option<Id>, code: i64, message: &str) -> Response {
    Response {
        jsonrpc: "2.0".into(),
        result: None,
        error: Some(RpcError {
            code,
            message: message.into(),
            data: None,
        }),
        id,
    }
}

fn rpc_ok(id: Option<Id>, result: Value) -> Response {
    Response {
        jsonrpc: "2.0".into(),
        result: Some(result),
        error: None,
        id,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Enabled,
    Disabled,
    Unsupported,
    RequiresAuth,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleAvailability {
    pub status: ModuleStatus,
    #[serde(rename = "reasonCode", skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

impl ModuleAvailability {
    fn new(status: ModuleStatus, reason: Option<&str>) -> Self {
        Self {
            status,
            reason_code: reason.map(str::to_string),
        }
    }
}

/// Point-in-time view of what the session can do, attached to every tool result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySnapshot {
    pub read_only: bool,
    pub has_auth: bool,
    pub module_availability: BTreeMap<String, ModuleAvailability>,
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub struct Server {
    config: Config,
    client: BitgetClient,
    capabilities: CapabilityRegistry,
    tools: Vec<ToolSpec>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, McpError> {
        let client = BitgetClient::new(config.clone())?;
        let tools = build_tools(&config);
        Ok(Self {
            config,
            client,
            capabilities: CapabilityRegistry::new(),
            tools,
        })
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Handles one line of input. Notifications yield no response.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let req: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => return Some(rpc_error(None, -32700, &format!("Parse error: {}", e))),
        };
        debug!("Received method={}", req.method);
        let is_notification = req.id.is_none();
        let resp = self.dispatch(req).await;
        if is_notification {
            None
        } else {
            Some(resp)
        }
    }

    async fn dispatch(&self, req: Request) -> Response {
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id),
            "tools/list" => self.handle_tools_list(req.id).await,
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            "ping" => rpc_ok(req.id, json!({})),
            other => rpc_error(req.id, -32601, &format!("Method not found: {}", other)),
        }
    }

    fn handle_initialize(&self, id: Option<Id>) -> Response {
        rpc_ok(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        )
    }

    async fn handle_tools_list(&self, id: Option<Id>) -> Response {
        self.ensure_warmup().await;
        let mut tools: Vec<ToolDescriptor> = self.visible_tools().map(ToolSpec::descriptor).collect();
        tools.push(system_capabilities_descriptor());
        rpc_ok(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Option<Id>, params: Value) -> Response {
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => return rpc_error(id, -32602, &format!("Invalid params: {}", e)),
        };
        self.ensure_warmup().await;
        let name = call.name.as_str();

        if name == SYSTEM_CAPABILITIES_TOOL {
            let snapshot = self.snapshot();
            let data = json!({
                "server": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                "capabilities": snapshot,
            });
            return rpc_ok(id, self.success_result(name, data));
        }

        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            let err = McpError::api(
                format!("Tool \"{name}\" is not available in this server session."),
                "TOOL_NOT_AVAILABLE",
            )
            .with_suggestion("Call list_tools again and choose from currently available tools.");
            return rpc_ok(id, self.error_result(name, &anyhow::Error::from(err)));
        };

        let args = match call.arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let ctx = ToolContext {
            client: &self.client,
            capabilities: &self.capabilities,
        };
        match (tool.handler)(&args, ctx).await {
            Ok(data) => rpc_ok(id, self.success_result(name, data)),
            Err(e) => {
                warn!("tool {} failed: {}", name, e);
                rpc_ok(id, self.error_result(name, &e))
            }
        }
    }

    // Earn tools disappear once the group is known to be unsupported.
    fn visible_tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().filter(|t| {
            self.capabilities
                .group_for(t.module)
                .map_or(true, |g| g.status() != CapabilityStatus::Unsupported)
        })
    }

    async fn ensure_warmup(&self) {
        if !self.config.has_auth() {
            return;
        }
        for module in Module::ALL {
            let Some(group) = self.capabilities.group_for(module) else {
                continue;
            };
            if self.tools.iter().any(|t| t.module == module) {
                let status = group.warmup(&self.client).await;
                debug!("capability group {} warm-up status {:?}", group.id(), status);
            }
        }
    }

    pub fn snapshot(&self) -> CapabilitySnapshot {
        let mut module_availability = BTreeMap::new();
        for module in Module::ALL {
            let availability = if !self.config.module_enabled(module) {
                ModuleAvailability::new(ModuleStatus::Disabled, Some("MODULE_FILTERED"))
            } else {
                match self.capabilities.group_for(module) {
                    None => ModuleAvailability::new(ModuleStatus::Enabled, None),
                    Some(_) if !self.config.has_auth() => {
                        ModuleAvailability::new(ModuleStatus::RequiresAuth, Some("AUTH_MISSING"))
                    }
                    Some(group) => match group.status() {
                        CapabilityStatus::Supported => ModuleAvailability::new(ModuleStatus::Enabled, None),
                        CapabilityStatus::Unsupported => ModuleAvailability::new(
                            ModuleStatus::Unsupported,
                            Some(&group.unavailable_code()),
                        ),
                        CapabilityStatus::Unknown => {
                            ModuleAvailability::new(ModuleStatus::Unknown, Some("CAPABILITY_PROBING"))
                        }
                    },
                }
            };
            module_availability.insert(module.as_str().to_string(), availability);
        }
        CapabilitySnapshot {
            read_only: self.config.read_only,
            has_auth: self.config.has_auth(),
            module_availability,
        }
    }

    fn success_result(&self, tool: &str, data: Value) -> Value {
        let payload = json!({
            "tool": tool,
            "ok": true,
            "data": data,
            "capabilities": self.snapshot(),
            "timestamp": now_iso(),
        });
        mcp_wrap(payload, None, false)
    }

    fn error_result(&self, tool: &str, err: &anyhow::Error) -> Value {
        let mut structured = Map::new();
        structured.insert("tool".into(), Value::String(tool.into()));
        if let Ok(Value::Object(fields)) = serde_json::to_value(to_payload(err, None)) {
            structured.extend(fields);
        }
        structured.insert(
            "capabilities".into(),
            serde_json::to_value(self.snapshot()).unwrap_or(Value::Null),
        );
        mcp_wrap(Value::Object(structured), None, true)
    }
}

fn system_capabilities_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: SYSTEM_CAPABILITIES_TOOL.into(),
        description: "Return machine-readable server capabilities and module availability for agent planning.".into(),
        input_schema: json!({ "type": "object", "additionalProperties": false }),
        annotations: ToolAnnotations {
            read_only_hint: true,
            destructive_hint: false,
            idempotent_hint: true,
            open_world_hint: false,
        },
    }
}

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, resp: &Response) -> anyhow::Result<()> {
    let mut payload = serde_json::to_string(resp)?;
    payload.push('\n');
    out.write_all(payload.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Serves newline-delimited JSON-RPC on stdin/stdout until stdin closes.
pub async fn run_stdio_server(config: Config) -> anyhow::Result<()> {
    info!("Starting {} stdio server; protocol={}", SERVER_NAME, PROTOCOL_VERSION);
    let server = Server::new(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(resp) = server.handle_line(&line).await {
            write_response(&mut stdout, &resp).await?;
        }
    }
    info!("stdin closed; shutting down");
    Ok(())
}
