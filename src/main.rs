use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tool_gateway::config::default_config_dir;
use tool_gateway::{Database, GatewayConfig, GatewayServer, SqliteSettingsStore};

/// 将运维工具的 Web 界面统一代理到同一源下
#[derive(Debug, Parser)]
#[command(name = "tool-gateway", version, about)]
struct Cli {
    /// 配置目录（包含 settings.yaml 和数据库文件）
    #[arg(long, env = "TOOL_GATEWAY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// 监听端口，覆盖配置文件
    #[arg(long)]
    port: Option<u16>,

    /// 监听地址，覆盖配置文件
    #[arg(long)]
    bind: Option<IpAddr>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(default_config_dir);

    let mut config = GatewayConfig::load(&config_dir)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    config.validate()?;

    init_tracing(config.log_json);

    let db_path = config.database_path(&config_dir);
    tracing::info!(config_dir = %config_dir.display(), database = %db_path.display(), "Starting tool gateway");
    let store = SqliteSettingsStore::new(Database::new(&db_path)?);

    let server = GatewayServer::new(config, Arc::new(store));
    let handle = server.start(None).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    handle.shutdown_and_wait().await;

    Ok(())
}
