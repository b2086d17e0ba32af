use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use demeter::config::{self, DEFAULT_CONFIG_PATHS, DemeterConfig, load_config};
use demeter::monitoring;
use demeter::session::{SessionTransport, WsTransport};

#[derive(Parser, Debug)]
#[command(name = "demeter", version, about = "链下农场会话与多协议结算引擎")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 demeter.yaml 或 config/demeter.yaml）"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 初始化配置模版文件
    Init(InitCmd),
    /// 打印生效配置
    #[command(name = "dump-config")]
    DumpConfig,
    /// 探测链下会话端点连通性
    Probe,
}

#[derive(Args, Debug)]
struct InitCmd {
    #[arg(long, help = "目标文件已存在时覆盖")]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    init_tracing(&config.global.logging)?;
    monitoring::init_metrics(&config.global.prometheus)?;

    match cli.command {
        Command::Init(args) => init_config(args)?,
        Command::DumpConfig => {
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Command::Probe => probe(&config).await?,
    }

    Ok(())
}

fn init_tracing(config: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// 打开到会话端点的 WebSocket 并请求一次身份挑战，验证链路可用。
async fn probe(config: &DemeterConfig) -> Result<()> {
    let endpoint = url::Url::parse(config.session.ws_url.trim())
        .map_err(|err| anyhow!("会话端点 URL 非法 {}: {err}", config.session.ws_url))?;
    let timeout = Duration::from_millis(config.session.request_timeout_ms);

    info!(target: "probe", endpoint = %endpoint, "开始探测会话端点");
    let transport = WsTransport::connect(&endpoint, timeout).await?;

    let address = config.global.wallet.address.trim();
    let address = if address.is_empty() {
        "0x0000000000000000000000000000000000000000"
    } else {
        address
    };
    let challenge = transport
        .request("auth.request", json!({ "address": address }))
        .await?;
    transport.shutdown().await;

    println!("会话端点可达，挑战响应: {challenge}");
    Ok(())
}

fn init_config(args: InitCmd) -> Result<()> {
    let path = PathBuf::from(DEFAULT_CONFIG_PATHS[0]);
    if path.exists() && !args.force {
        return Err(anyhow!("{} 已存在，使用 --force 覆盖", path.display()));
    }
    fs::write(&path, CONFIG_TEMPLATE)
        .with_context(|| format!("写入 {} 失败", path.display()))?;
    info!(target: "init", path = %path.display(), "配置模版已生成");
    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"global:
  wallet:
    # 玩家地址（0x…），签名由外部钱包完成
    address: ""
  logging:
    level: info
    json: false
  prometheus:
    enable: false
    listen: 0.0.0.0:9898

session:
  ws_url: wss://clearnet.demeter.farm/ws
  application: demeter-farm-v1
  request_timeout_ms: 5000
  fallback_savings_per_action_usd: "0.25"

relay:
  endpoint: https://settle.demeter.farm/api/settle
  timeout_ms: 8000

chains:
  - chain_id: 8453
    rpc_url: https://mainnet.base.org
  - chain_id: 42161
    rpc_url: https://arb1.arbitrum.io/rpc
  - chain_id: 1
    rpc_url: https://eth.llamarpc.com

game:
  upgrade_apy_step_bps: 50
  entities:
    - id: plot-aave
      name: Lending Meadow
      protocol: aave
      apy_bps: 420
      position: [1, 1]
    - id: plot-spark
      name: Spark Orchard
      protocol: spark
      apy_bps: 460
      position: [2, 1]
    - id: plot-compound
      name: Compound Grove
      protocol: compound
      apy_bps: 380
      position: [1, 2]
    - id: plot-treasury
      name: Treasury Vault
      protocol: treasury
      apy_bps: 520
      position: [2, 2]
    - id: plot-sim
      name: Greenhouse (simulated)
      protocol: simulated
      apy_bps: 900
      position: [3, 1]
"#;
