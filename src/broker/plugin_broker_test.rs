use bytes::Bytes;
use tokio::sync::mpsc;

use super::*;
use crate::test_utils::assert_no_event;
use crate::test_utils::mem_broker;
use crate::test_utils::recv_within;
use crate::Error;

const PREFIX: &str = "/my/prefix/";

#[tokio::test]
async fn test_writes_land_under_bound_prefix() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);

    plugin.put("key", b"value").await.unwrap();

    let raw = broker.get("/my/prefix/key").await.unwrap().unwrap();
    assert_eq!(raw.key(), "/my/prefix/key");
    assert_eq!(raw.value(), &Bytes::from("value"));

    let scoped = plugin.get("key").await.unwrap().unwrap();
    assert_eq!(scoped.key(), "key");
    assert_eq!(scoped.revision(), raw.revision());
}

#[tokio::test]
async fn test_root_writes_are_visible_through_view() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);

    broker.put("/my/prefix/from-root", b"1").await.unwrap();
    broker.put("/elsewhere/key", b"2").await.unwrap();

    assert!(plugin.get("from-root").await.unwrap().is_some());
    assert!(plugin.get("/elsewhere/key").await.unwrap().is_none());
    assert!(broker.get("from-root").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_local_key_is_invalid() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);

    assert!(matches!(plugin.put("", b"v").await, Err(Error::InvalidKey(_))));
    assert!(matches!(plugin.delete("").await, Err(Error::InvalidKey(_))));
    assert!(broker.get(PREFIX).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_values_trims_prefix_and_keeps_order() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    for key in ["a/val2", "a/val1", "a/val3", "b/val1"] {
        plugin.put(key, key).await.unwrap();
    }

    let scoped = plugin.list_values("a").await.unwrap().collect_all().await.unwrap();
    let keys: Vec<_> = scoped.iter().map(|kv| kv.key()).collect();
    assert_eq!(keys, vec!["a/val1", "a/val2", "a/val3"]);

    let raw = broker
        .list_values("/my/prefix/a/")
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    let raw_keys: Vec<_> = raw.iter().map(|kv| kv.key()).collect();
    assert_eq!(
        raw_keys,
        vec!["/my/prefix/a/val1", "/my/prefix/a/val2", "/my/prefix/a/val3"]
    );
}

#[tokio::test]
async fn test_list_keys_trims_prefix() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    plugin.put("x", b"1").await.unwrap();

    let keys = plugin.list_keys("").await.unwrap().collect_all().await.unwrap();
    assert_eq!(keys, vec!["x".to_string()]);
}

#[tokio::test]
async fn test_delete_prefix_stays_inside_scope() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    plugin.put("a", b"1").await.unwrap();
    plugin.put("b", b"2").await.unwrap();
    broker.put("/outside", b"3").await.unwrap();

    assert_eq!(plugin.delete_prefix("").await.unwrap(), 2);
    assert!(broker.get("/outside").await.unwrap().is_some());
}

#[tokio::test]
async fn test_views_with_different_prefixes_are_isolated() {
    let (broker, _) = mem_broker();
    let first = broker.new_plugin_broker("plugin-1/");
    let second = broker.new_plugin_broker("plugin-2/");

    first.put("shared-name", b"one").await.unwrap();
    second.put("shared-name", b"two").await.unwrap();

    assert_eq!(first.get("shared-name").await.unwrap().unwrap().value(), &Bytes::from("one"));
    assert_eq!(second.get("shared-name").await.unwrap().unwrap().value(), &Bytes::from("two"));
}

#[tokio::test]
async fn test_nested_view_concatenates_prefixes() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    let nested = plugin.new_plugin_broker("inner/");
    assert_eq!(nested.prefix(), "/my/prefix/inner/");

    nested.put("k", b"v").await.unwrap();

    assert!(plugin.get("inner/k").await.unwrap().is_some());
    assert!(broker.get("/my/prefix/inner/k").await.unwrap().is_some());
}

#[tokio::test]
async fn test_watch_events_carry_local_keys() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    let (tx, mut rx) = mpsc::channel(8);
    plugin.watch(tx, "vals/").await.unwrap();

    broker.put("/my/prefix/other/x", b"x").await.unwrap();
    plugin.put("vals/val1", b"1").await.unwrap();
    broker.put("/my/prefix/vals/val2", b"2").await.unwrap();

    let first = recv_within(&mut rx).await.unwrap().unwrap();
    let second = recv_within(&mut rx).await.unwrap().unwrap();
    assert_eq!(first.key(), "vals/val1");
    assert_eq!(second.key(), "vals/val2");
    assert_no_event(&mut rx).await;
}

#[tokio::test]
async fn test_overlapping_subscriptions_each_get_a_copy() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    let mut scoped = plugin.subscribe("vals/").await.unwrap();
    let mut raw = broker.subscribe("/my/prefix/").await.unwrap();

    plugin.put("vals/val1", b"1").await.unwrap();

    let scoped_event = scoped.recv().await.unwrap().unwrap();
    let raw_event = raw.recv().await.unwrap().unwrap();
    assert_eq!(scoped_event.key(), "vals/val1");
    assert_eq!(raw_event.key(), "/my/prefix/vals/val1");
    assert_eq!(scoped_event.revision, raw_event.revision);
}

#[tokio::test]
async fn test_txn_scopes_every_key() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);

    let mut txn = plugin.new_txn();
    txn.put("b/val1", b"1").put("b/val2", b"2").put("b/val3", b"3");
    txn.commit().await.unwrap();

    let keys = broker
        .list_keys("/my/prefix/b/")
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().all(|k| k.starts_with(PREFIX)));
}

#[tokio::test]
async fn test_view_outlived_by_clone_shares_state() {
    let (broker, _) = mem_broker();
    let plugin = broker.new_plugin_broker(PREFIX);
    let clone = plugin.clone();

    plugin.put("k", b"v").await.unwrap();
    assert!(clone.get("k").await.unwrap().is_some());
}
