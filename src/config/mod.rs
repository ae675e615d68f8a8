pub mod monitor;

pub use monitor::{
    dry_run_from_env, AuditConfig, DiscordConfig, FeedConfig, ImpactConfig, MonitorConfig,
    Secrets, YouTubeChannelConfig,
};
