use std::sync::Arc;
use std::time::Duration;

use kv_broker::Broker;
use kv_broker::BrokerConfig;
use kv_broker::KvBackend;
use kv_broker::MemKvBackend;
use kv_broker::PluginBroker;
use kv_broker::WatchResult;
use tokio::sync::mpsc;

pub const PREFIX: &str = "/my/prefix/";
pub const KEY: &str = "key";
pub const WATCH_KEY: &str = "vals/";

pub const WATCH_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Brokers {
    pub broker: Broker,
    pub plugin: PluginBroker,
    pub backend: Arc<MemKvBackend>,
}

pub fn setup_brokers() -> Brokers {
    setup_brokers_with_config(BrokerConfig::default())
}

pub fn setup_brokers_with_config(config: BrokerConfig) -> Brokers {
    let backend = Arc::new(MemKvBackend::new());
    let broker = Broker::new(Arc::clone(&backend) as Arc<dyn KvBackend>, config).unwrap();
    let plugin = broker.new_plugin_broker(PREFIX);
    Brokers {
        broker,
        plugin,
        backend,
    }
}

pub async fn expect_watch_event(
    receiver: &mut mpsc::Receiver<WatchResult>,
    expected_key: &str,
) {
    let item = tokio::time::timeout(WATCH_TIMEOUT, receiver.recv())
        .await
        .expect("Watch resp not received")
        .expect("watch channel closed");
    let event = item.expect("watch error");
    assert_eq!(event.key(), expected_key);
}
