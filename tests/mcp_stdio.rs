use assert_cmd::Command;
use httpmock::{Method::GET, MockServer};
use predicates::prelude::*;
use serde_json::{json, Value};

const CRED_VARS: [&str; 3] = ["BITGET_API_KEY", "BITGET_SECRET_KEY", "BITGET_PASSPHRASE"];

fn run_lines(lines: &[Value], args: &[&str], envs: &[(&str, &str)]) -> anyhow::Result<Vec<Value>> {
    let mut cmd = Command::cargo_bin("bitget-mcp")?;
    for k in CRED_VARS {
        cmd.env_remove(k);
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut input = String::new();
    for line in lines {
        input.push_str(&serde_json::to_string(line)?);
        input.push('\n');
    }
    let assert = cmd
        .arg("--log-level")
        .arg("warn")
        .args(args)
        .write_stdin(input)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<Value>(l).map_err(anyhow::Error::from))
        .collect()
}

#[test]
fn session_handshake_list_and_call() -> anyhow::Result<()> {
    let server = MockServer::start();
    let ticker = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/spot/market/tickers")
            .query_param("symbol", "BTCUSDT");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(json!({"code": "00000", "data": [{"symbol": "BTCUSDT"}]}));
    });
    let out = run_lines(
        &[
            json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}),
            json!({"jsonrpc":"2.0","method":"notifications/initialized"}),
            json!({"jsonrpc":"2.0","id":2,"method":"tools/list"}),
            json!({"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"spot_get_ticker","arguments":{"symbol":"BTCUSDT"}}}),
            json!({"jsonrpc":"2.0","id":4,"method":"ping"}),
        ],
        &[],
        &[("BITGET_API_BASE_URL", server.base_url().as_str())],
    )?;
    assert_eq!(out.len(), 4, "notification must not be answered");
    assert_eq!(out[0]["id"], json!(1));
    assert_eq!(out[0]["result"]["serverInfo"]["name"], json!("bitget-mcp"));

    let tools = out[1]["result"]["tools"].as_array().cloned().unwrap_or_default();
    assert!(tools.iter().any(|t| t["name"] == json!("spot_get_ticker")));
    assert!(tools.iter().all(|t| t["annotations"].is_object()));

    let result = &out[2]["result"];
    assert!(result.get("isError").is_none());
    let text = result["content"][0]["text"].as_str().unwrap_or_default();
    let parsed: Value = serde_json::from_str(text)?;
    assert_eq!(parsed, result["structuredContent"]);
    assert_eq!(parsed["data"]["data"], json!([{"symbol": "BTCUSDT"}]));

    assert_eq!(out[3]["result"], json!({}));
    ticker.assert_hits(1);
    Ok(())
}

#[test]
fn malformed_json_and_unknown_method() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("bitget-mcp")?;
    for k in CRED_VARS {
        cmd.env_remove(k);
    }
    let assert = cmd
        .arg("--log-level")
        .arg("warn")
        .write_stdin("{oops\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"resources/list\"}\n")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let lines: Vec<Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines[0]["error"]["code"], json!(-32700));
    assert_eq!(lines[0]["id"], Value::Null);
    assert_eq!(lines[1]["error"]["code"], json!(-32601));
    assert_eq!(lines[1]["id"], json!(7));
    Ok(())
}

#[test]
fn invalid_configuration_exits_with_payload() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("bitget-mcp")?;
    for k in CRED_VARS {
        cmd.env_remove(k);
    }
    let assert = cmd
        .env("BITGET_API_KEY", "only-key")
        .write_stdin("")
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains("\"ConfigError\""));
    assert!(stderr.contains("Partial API credentials"));

    let mut cmd = Command::cargo_bin("bitget-mcp")?;
    cmd.arg("--modules").arg("spot,margin").write_stdin("").assert().failure();
    Ok(())
}

#[test]
fn version_flag() -> anyhow::Result<()> {
    let mut cmd = Command::cargo_bin("bitget-mcp")?;
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("bitget-mcp "));
    Ok(())
}
