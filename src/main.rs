use anyhow::Result;
use chord::{Config, Node};
use clap::Parser;
use tracing::{info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("chord")
        .enable_all()
        .build()?;

    rt.block_on(run())
}

async fn run() -> Result<()> {
    let config = Config::parse();
    if config.port.is_none() {
        info!("no port given, using {}", chord::DEFAULT_PORT);
    }

    let settings = config.settings();
    let (node, listener) = Node::bind(config.listen_addr(), settings).await?;
    info!(
        "I am {} ({} bit identifiers, stabilizing every {:?})",
        node.me(),
        settings.space.bits(),
        settings.stabilize_interval
    );

    if let Some(bootstrap) = config.join {
        if let Err(e) = node.join(bootstrap).await {
            warn!("could not join through {}: {}; running standalone", bootstrap, e);
        }
    }

    tokio::select! {
        _ = node.clone().run(listener) => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            info!("[{}] interrupted, shutting down", node.me());
            node.leave();
            std::process::exit(1);
        }
    }
}
