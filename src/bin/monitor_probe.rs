//! One-shot dry run of a single feed: init (seeding a separate probe state
//! dir on first use), then one check with notifications logged, not posted.
//!
//! Usage: `monitor_probe <feed-id>` (e.g. `blog`, `audit`, `youtube-main`).

use glow_content_monitor::config::{MonitorConfig, Secrets};
use glow_content_monitor::notify::LogNotifier;
use glow_content_monitor::{clock, init_tracing, scheduler};

const ENV_PROBE_STATE_DIR: &str = "MONITOR_PROBE_STATE_DIR";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let Some(feed) = std::env::args().nth(1) else {
        eprintln!("usage: monitor_probe <feed-id>");
        std::process::exit(2);
    };

    let mut cfg = match MonitorConfig::load_default() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config: {e:#}");
            std::process::exit(1);
        }
    };
    // Never touch the live state records.
    cfg.state_dir = std::env::var(ENV_PROBE_STATE_DIR)
        .map(Into::into)
        .unwrap_or_else(|_| cfg.state_dir.join("probe"));
    if cfg.discord.channel_id.is_none() {
        cfg.discord.channel_id = Some("dry-run".to_string());
    }

    let secrets = Secrets::from_env();
    let mut monitors =
        match scheduler::init_monitors(&cfg, &secrets, clock::system(), Some(&feed)).await {
            Ok(m) => m,
            Err(e) => {
                eprintln!("init {feed}: {e:#}");
                std::process::exit(1);
            }
        };

    for report in scheduler::tick(&mut monitors, &LogNotifier).await {
        println!("{report:?}");
    }
}
