//! Behaviour when the store connection fails or the broker is closed

use std::time::Duration;

use kv_broker::BytesBroker;
use kv_broker::Error;
use kv_broker::StorageError;
use tokio::sync::mpsc;

use crate::commons::setup_brokers;
use crate::commons::PREFIX;
use crate::commons::WATCH_TIMEOUT;

#[tokio::test]
async fn test_failed_commit_leaves_store_untouched() {
    let brokers = setup_brokers();
    brokers.plugin.put("b/existing", b"old").await.unwrap();
    let before = brokers.backend.current_revision();

    let mut txn = brokers.plugin.new_txn();
    txn.put("b/val1", b"1").delete("b/existing").put("b/val2", b"2");

    brokers.backend.set_available(false);
    let err = txn.commit().await.unwrap_err();
    assert!(err.is_retryable());
    brokers.backend.set_available(true);

    assert_eq!(brokers.backend.current_revision(), before);
    let keys = brokers.plugin.list_keys("b/").await.unwrap().collect_all().await.unwrap();
    assert_eq!(keys, vec!["b/existing".to_string()]);

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_connection_loss_breaks_watch_and_recovers_on_resubscribe() {
    let brokers = setup_brokers();
    let (tx, mut rx) = mpsc::channel(4);
    brokers.plugin.watch(tx, "vals/").await.unwrap();

    brokers.backend.set_available(false);

    let item = tokio::time::timeout(WATCH_TIMEOUT, rx.recv()).await.unwrap();
    assert!(matches!(item, Some(Err(Error::WatchStreamBroken { .. }))));
    let closed = tokio::time::timeout(WATCH_TIMEOUT, rx.recv()).await.unwrap();
    assert!(closed.is_none());

    let err = brokers.plugin.get("vals/val1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::StoreUnavailable {
            source: StorageError::Unavailable(_),
            ..
        }
    ));

    brokers.backend.set_available(true);
    let mut subscription = brokers.plugin.subscribe("vals/").await.unwrap();
    brokers.plugin.put("vals/val1", b"1").await.unwrap();
    let event = subscription.recv().await.unwrap().unwrap();
    assert_eq!(event.key(), "vals/val1");

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_close_terminates_every_subscription() {
    let brokers = setup_brokers();
    let mut scoped = brokers.plugin.subscribe("vals/").await.unwrap();
    let mut root = brokers.broker.subscribe(PREFIX).await.unwrap();

    brokers.broker.close().await.unwrap();

    for subscription in [&mut scoped, &mut root] {
        let outcome = tokio::time::timeout(WATCH_TIMEOUT, subscription.recv())
            .await
            .expect("subscription not closed");
        assert!(outcome.is_none());
    }
    assert!(matches!(
        brokers.plugin.put("vals/val1", b"1").await,
        Err(Error::Closed)
    ));
    assert!(matches!(brokers.broker.close().await, Ok(())));
}

#[tokio::test]
async fn test_snapshot_listing_survives_concurrent_writes() {
    let mut config = kv_broker::BrokerConfig::default();
    config.list_page_size = 1;
    let brokers = crate::commons::setup_brokers_with_config(config);
    for i in 0..3 {
        brokers.plugin.put(&format!("s/{i}"), b"v").await.unwrap();
    }

    let mut iter = brokers.plugin.list_keys("s/").await.unwrap();
    let writer = {
        let plugin = brokers.plugin.clone();
        tokio::spawn(async move {
            for i in 3..10 {
                plugin.put(&format!("s/{i}"), b"v").await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let mut keys = Vec::new();
    while let Some(key) = iter.next().await.unwrap() {
        keys.push(key);
    }
    writer.await.unwrap();

    assert_eq!(keys, vec!["s/0", "s/1", "s/2"]);

    brokers.broker.close().await.unwrap();
}
