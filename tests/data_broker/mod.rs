//! End-to-end scenarios of a broker and a plugin view sharing one store

use bytes::Bytes;
use kv_broker::BytesBroker;
use tokio::sync::mpsc;

use crate::commons::expect_watch_event;
use crate::commons::setup_brokers;
use crate::commons::KEY;
use crate::commons::PREFIX;
use crate::commons::WATCH_KEY;

#[tokio::test]
async fn test_put_get_value_prefixed() {
    let brokers = setup_brokers();
    let data = [1u8, 2, 3];

    brokers.broker.put(&format!("{PREFIX}{KEY}"), data).await.unwrap();

    let found = brokers.plugin.get(KEY).await.unwrap().unwrap();
    assert_eq!(found.value(), &Bytes::copy_from_slice(&data));
    assert_eq!(found.key(), KEY);

    assert!(brokers.plugin.get("unknown").await.unwrap().is_none());

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_prefixed_watcher() {
    let brokers = setup_brokers();
    let (tx, mut rx) = mpsc::channel(4);
    brokers.plugin.watch(tx, WATCH_KEY).await.unwrap();

    let watcher = tokio::spawn(async move {
        expect_watch_event(&mut rx, "vals/val1").await;
        rx
    });

    // Does not match the subscription
    brokers
        .broker
        .put(&format!("{PREFIX}/something/else/val1"), [0u8, 0, 7])
        .await
        .unwrap();
    brokers
        .broker
        .put(&format!("{PREFIX}{WATCH_KEY}val1"), [0u8, 0, 7])
        .await
        .unwrap();

    let mut rx = watcher.await.unwrap();
    assert!(rx.try_recv().is_err());

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_prefixed_list_values() {
    let brokers = setup_brokers();
    for val in ["a/val1", "a/val2", "a/val3"] {
        brokers
            .broker
            .put(&format!("{PREFIX}{val}"), [0u8, 0, 7])
            .await
            .unwrap();
    }

    let mut iter = brokers.plugin.list_values("a").await.unwrap();
    for expected in ["a/val1", "a/val2", "a/val3"] {
        let kv = iter.next().await.unwrap().expect("listing ended early");
        assert_eq!(kv.key(), expected);
    }
    assert!(iter.next().await.unwrap().is_none());

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_prefixed_txn() {
    let brokers = setup_brokers();

    let mut txn = brokers.plugin.new_txn();
    txn.put("b/val1", [0u8, 1])
        .put("b/val2", [0u8, 1])
        .put("b/val3", [0u8, 1]);
    txn.commit().await.unwrap();

    let mut iter = brokers
        .broker
        .list_values(&format!("{PREFIX}b"))
        .await
        .unwrap();
    for expected in ["b/val1", "b/val2", "b/val3"] {
        let kv = iter.next().await.unwrap().expect("listing ended early");
        assert_eq!(kv.key(), format!("{PREFIX}{expected}"));
    }
    assert!(iter.next().await.unwrap().is_none());

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_txn_is_seen_atomically_by_watchers() {
    let brokers = setup_brokers();
    let mut subscription = brokers.plugin.subscribe("b/").await.unwrap();

    let mut txn = brokers.plugin.new_txn();
    txn.put("b/val1", b"1").put("b/val2", b"2");
    txn.commit().await.unwrap();

    let first = subscription.recv().await.unwrap().unwrap();
    let second = subscription.recv().await.unwrap().unwrap();
    assert_eq!(first.key(), "b/val1");
    assert_eq!(second.key(), "b/val2");
    assert_eq!(first.revision, second.revision);

    brokers.broker.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_through_views() {
    let brokers = setup_brokers();

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let view = brokers.broker.new_plugin_broker(&format!("{PREFIX}w{worker}/"));
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                view.put(&format!("{i:02}"), b"v").await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let keys = brokers.plugin.list_keys("w").await.unwrap().collect_all().await.unwrap();
    assert_eq!(keys.len(), 100);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));

    brokers.broker.close().await.unwrap();
}
