use clap::Parser;

pub const DEFAULT_LIVE_API: &str = "https://api.live.bilibili.com";

#[derive(Parser, Debug, Clone)]
#[command(name = "danmu-relay", about = "Live-room danmaku relay over WebSocket")]
pub struct Config {
    /// Port to bind on 0.0.0.0.
    #[arg(long, env = "DANMU_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level (debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, env = "DANMU_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seed for the default credential.
    #[arg(long, env = "DANMU_DEFAULT_COOKIE")]
    pub default_cookie: Option<String>,

    #[arg(long, env = "DANMU_LIVE_API", default_value = DEFAULT_LIVE_API)]
    pub live_api: String,
}
