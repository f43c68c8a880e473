mod config;
mod danmaku;
mod error;
mod platform;
mod room;
mod routes;
mod state;
mod upstream;
mod utils {
    pub mod cookie;
}
#[cfg(test)]
mod testing;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    platform::BiliApi,
    room::RoomRegistry,
    state::CookieStore,
    upstream::BiliClientFactory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let rooms    = Arc::new(RoomRegistry::new(Arc::new(BiliClientFactory::new(&cfg.live_api))));
    let cookies  = Arc::new(CookieStore::with_default(cfg.default_cookie.clone()));
    let platform = Arc::new(BiliApi::new(&cfg.live_api));

    let app = routes::app(rooms, cookies, platform);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port)).await?;
    info!(addr = %listener.local_addr()?, "danmu relay listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
