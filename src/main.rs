use bitget_mcp::config::Config;
use bitget_mcp::error::ToolErrorPayload;
use bitget_mcp::{cli, server};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    let modules = matches.get_one::<String>("modules").cloned();
    let read_only = matches.get_flag("read-only");

    if matches.get_flag("version") {
        println!("bitget-mcp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    cli::init_logging(log_level.as_deref());

    let config = match Config::from_env(modules.as_deref(), read_only) {
        Ok(c) => c,
        Err(e) => {
            let payload = ToolErrorPayload::from_error(&e, None);
            eprintln!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    };

    server::run_stdio_server(config).await
}
