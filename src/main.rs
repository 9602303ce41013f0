#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use nodecall::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    simple_logger::init_with_level(config.log.level.as_level())?;

    if config.server.node_name.is_empty() {
        log::warn!("server.node-name is empty; peers will not be able to identify this node");
    }

    nodecall::startup(config).await
}
