//! Glow content monitor: binary entrypoint.
//! Initializes every configured feed (fatal on an unusable baseline), then
//! polls them sequentially on a fixed interval and posts new items to Discord.

use anyhow::{Context, Result};
use std::sync::Arc;

use glow_content_monitor::config::{dry_run_from_env, MonitorConfig, Secrets};
use glow_content_monitor::metrics::Metrics;
use glow_content_monitor::notify::{DiscordNotifier, LogNotifier, Notifier};
use glow_content_monitor::scheduler::{self, SchedulerCfg};
use glow_content_monitor::{clock, init_tracing};

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "monitor cannot start");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = MonitorConfig::load_default()?;
    let secrets = Secrets::from_env();

    let notifier: Arc<dyn Notifier> = if dry_run_from_env() {
        tracing::warn!("dry run: notifications are logged, not posted");
        Arc::new(LogNotifier)
    } else {
        let token = secrets
            .discord_token
            .clone()
            .context("DISCORD_BOT_TOKEN is not set")?;
        Arc::new(
            DiscordNotifier::new(token)
                .with_timeout(cfg.discord.timeout_secs)
                .with_retries(cfg.discord.max_retries),
        )
    };

    if let Some(addr) = cfg.metrics_addr.clone() {
        let metrics = Metrics::install()?;
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(&addr).await {
                tracing::warn!(error = ?e, "metrics endpoint stopped");
            }
        });
    }

    let monitors = scheduler::init_monitors(&cfg, &secrets, clock::system(), None).await?;
    if monitors.is_empty() {
        tracing::warn!("no feeds enabled; nothing to poll");
        return Ok(());
    }

    scheduler::run(SchedulerCfg::from(&cfg), monitors, notifier.as_ref()).await;
    Ok(())
}
