//! Ghost MCP Server
//!
//! A Model Context Protocol server that exposes wallet-analysis tools,
//! resources and prompts to AI agents.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ghost_mcp::{McpServer, ServerConfig};

/// Ghost MCP Server - wallet analysis for AI agents
#[derive(Parser, Debug)]
#[command(name = "ghost-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport mechanism to use
    #[arg(short, long, value_enum, default_value = "stdio")]
    transport: Transport,

    /// Listen address for the TCP transport (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource cache TTL in seconds (overrides the config file)
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    /// Standard input/output (for desktop agents)
    Stdio,
    /// Newline-delimited JSON over TCP
    Tcp,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is reserved for the protocol
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.tcp_bind = bind;
    }
    if let Some(ttl) = args.cache_ttl {
        config.cache_ttl_secs = ttl;
    }
    config.check()?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Ghost MCP Server v{} starting", env!("CARGO_PKG_VERSION"));
    let server = McpServer::from_config(&config)?;

    match args.transport {
        Transport::Stdio => {
            server.run_stdio().await?;
        }
        Transport::Tcp => {
            let handle = server
                .bind_tcp(config.tcp_bind.as_str())
                .await
                .with_context(|| format!("Failed to bind {}", config.tcp_bind))?;
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, shutting down");
            handle.shutdown().await;
        }
    }

    Ok(())
}
