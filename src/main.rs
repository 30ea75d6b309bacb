use std::sync::Arc;
use std::time::Duration;

use kv_broker::Broker;
use kv_broker::BrokerConfig;
use kv_broker::BytesBroker;
use kv_broker::MemKvBackend;
use kv_broker::PluginBroker;
use kv_broker::Result;
use kv_broker::WatchSubscription;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const PLUGIN_PREFIX: &str = "/my/prefix/";
const WATCHED_PREFIX: &str = "vals/";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = BrokerConfig::new()?;

    // Initializing Logs
    init_observability();

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let broker = Broker::new(Arc::new(MemKvBackend::new()), settings)?;
    let plugin = broker.new_plugin_broker(PLUGIN_PREFIX);
    let subscription = plugin.subscribe(WATCHED_PREFIX).await?;

    info!("Agent started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    let producer = tokio::spawn(produce(plugin.clone(), graceful_rx.clone()));
    if let Err(e) = consume(subscription, graceful_rx).await {
        error!("watch loop stopped: {:?}", e);
    }
    if let Err(e) = producer.await {
        error!("producer task failed: {:?}", e);
    }

    // Guaranteed release of the store connection
    broker.close().await?;
    info!("Exiting program.");
    Ok(())
}

/// Writes a value under the watched prefix every second
async fn produce(
    plugin: PluginBroker,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut counter: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        counter += 1;
        let key = format!("{}val{}", WATCHED_PREFIX, counter % 3 + 1);
        if let Err(e) = plugin.put(&key, counter.to_string()).await {
            warn!(key = %key, error = %e, "put failed");
        }
    }
}

/// Prints every change on the watched prefix until shutdown
async fn consume(
    mut subscription: WatchSubscription,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    loop {
        let item = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            item = subscription.recv() => item,
        };

        let Some(item) = item else {
            info!("watch subscription ended");
            return Ok(());
        };
        let event = item?;
        info!(
            event_type = event.event_type.as_str(),
            key = %event.key,
            value = %String::from_utf8_lossy(&event.value),
            revision = event.revision,
            "watch event"
        );
    }
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    if graceful_tx.send(()).is_err() {
        warn!("shutdown signal had no receivers");
    }
    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(base_subscriber).init();
}
