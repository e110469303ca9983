/// Longhorn Restore - Restorer
///
/// 从 Longhorn 备份恢复卷，并重建对应的 PV/PVC 绑定。运行一次即退出。

use anyhow::Context;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod config;
mod longhorn;
mod restore;

use longhorn::{LonghornApi, LonghornClient};
use restore::wait::WaitPolicy;
use restore::RestoreRun;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载 .env，这样 RUST_LOG 也可以写在里面
    dotenvy::dotenv().ok();

    // 初始化日志
    // 可以通过环境变量 RUST_LOG 设置日志级别，例如：
    // RUST_LOG=restorer=debug
    tracing_subscriber::fmt()
        .with_target(false)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    info!("🚀 Starting Longhorn volume restore...");

    let cfg = config::Config::from_env()?;
    info!("✅ Configuration loaded (Longhorn: {})", cfg.longhorn_url);

    let targets = config::load_targets(&cfg.config_path)?;
    info!(
        "📋 Loaded {} restore target(s) from {}",
        targets.len(),
        cfg.config_path.display()
    );

    let client = LonghornClient::builder()
        .danger_accept_invalid_certs(cfg.tls_insecure)
        .build(&cfg.longhorn_url)?;

    if cfg.startup_delay_secs > 0 {
        info!("⏳ Waiting {}s before first request...", cfg.startup_delay_secs);
        tokio::time::sleep(Duration::from_secs(cfg.startup_delay_secs)).await;
    }

    // 地址完全不可达时没有继续的意义
    client
        .list_volumes()
        .await
        .with_context(|| format!("Longhorn API at {} is unreachable", client.base_url()))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current request");
            ctrl_c.cancel();
        }
    });

    let policy = WaitPolicy::new(Duration::from_secs(cfg.retry_interval_secs), cfg.retry_count)
        .with_cancellation(cancel);

    let report = RestoreRun::new(&client, cfg.match_mode, policy)
        .run(&targets)
        .await?;
    report.log_summary();

    if report.has_failures() {
        anyhow::bail!("{} restore target(s) failed", report.failures());
    }

    info!("✅ Restore completed");
    Ok(())
}
