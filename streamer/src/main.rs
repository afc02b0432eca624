//! TradingView streamer binary.
//!
//! Entry point for the service that streams configured symbols to stdout.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tvfeed_sdk::client::SymbolSearchClient;
use tvfeed_streamer::{StreamerConfig, StreamerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays a clean JSON line stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tvfeed_streamer=debug,tvfeed_sdk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = StreamerConfig::from_env().context("loading streamer configuration")?;

    tracing::info!("Starting TradingView streamer");
    tracing::info!("Quotes: {:?}", config.quotes);
    tracing::info!("Charts: {}", config.charts.len());

    let service = StreamerService::new(config).context("creating streamer service")?;

    if service.config().search.is_some() {
        let search = SymbolSearchClient::with_defaults().context("creating search client")?;
        for found in service.search(&search).await? {
            println!("{}", serde_json::to_string(&found)?);
        }
    }

    if !service.config().has_streams() {
        return Ok(());
    }

    let run = service.run();
    tokio::pin!(run);

    let written = tokio::select! {
        result = &mut run => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            tracing::info!("Shutting down streamer");
            service.stop();
            run.await?
        }
    };

    tracing::info!(written, "Streamer exited");
    Ok(())
}
