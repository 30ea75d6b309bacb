use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::Broker;
use crate::BrokerConfig;
use crate::KvBackend;
use crate::MemKvBackend;
use crate::WatchResult;

pub(crate) const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Broker over a fresh in-memory backend; the backend is returned for fault
/// injection
pub(crate) fn mem_broker() -> (Broker, Arc<MemKvBackend>) {
    mem_broker_with_config(BrokerConfig::default())
}

pub(crate) fn mem_broker_with_config(config: BrokerConfig) -> (Broker, Arc<MemKvBackend>) {
    let backend = Arc::new(MemKvBackend::new());
    let broker = Broker::new(Arc::clone(&backend) as Arc<dyn KvBackend>, config).unwrap();
    (broker, backend)
}

/// Next item within [`RECV_TIMEOUT`]; `None` if the channel closed
pub(crate) async fn recv_within(receiver: &mut mpsc::Receiver<WatchResult>) -> Option<WatchResult> {
    timeout(RECV_TIMEOUT, receiver.recv())
        .await
        .expect("no watch event within timeout")
}

/// Asserts nothing arrives for a short while
pub(crate) async fn assert_no_event(receiver: &mut mpsc::Receiver<WatchResult>) {
    let outcome = timeout(Duration::from_millis(50), receiver.recv()).await;
    assert!(outcome.is_err(), "unexpected watch item: {:?}", outcome);
}
