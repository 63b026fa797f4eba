use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("bitget-mcp")
        .about("Bitget MCP server (stdio JSON-RPC)")
        .arg(
            Arg::new("modules")
                .long("modules")
                .num_args(1)
                .help("Comma-separated modules to load (spot, futures, account, earn) or \"all\". Default: spot,futures,account"),
        )
        .arg(
            Arg::new("read-only")
                .long("read-only")
                .help("Expose only read/query tools")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn init_logging(level: Option<&str>) {
    // Explicit level wins, then RUST_LOG, then info. env_logger writes to stderr.
    if let Some(lvl) = level {
        std::env::set_var("RUST_LOG", lvl);
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
