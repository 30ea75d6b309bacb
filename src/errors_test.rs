use std::error::Error as _;
use std::time::Duration;

use crate::Error;
use crate::StorageError;

#[test]
fn test_storage_error_is_wrapped_not_replaced() {
    let err = Error::from_storage("put", StorageError::Unavailable("connection refused".into()));

    match &err {
        Error::StoreUnavailable { op, source } => {
            assert_eq!(*op, "put");
            assert_eq!(*source, StorageError::Unavailable("connection refused".into()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.source().is_some());
    assert!(err.to_string().contains("put"));
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn test_invalid_argument_maps_to_invalid_key() {
    let err = Error::from_storage("txn", StorageError::InvalidArgument("empty key".into()));
    assert!(matches!(err, Error::InvalidKey(msg) if msg == "empty key"));
}

#[test]
fn test_compacted_maps_to_snapshot_compacted() {
    let err = Error::from_storage(
        "list_values",
        StorageError::Compacted {
            requested: 3,
            compacted: 7,
        },
    );
    assert!(matches!(
        err,
        Error::SnapshotCompacted {
            requested: 3,
            compacted: 7
        }
    ));
}

#[test]
fn test_retryable_classification() {
    assert!(Error::from_storage("get", StorageError::Timeout(Duration::from_millis(5))).is_retryable());
    assert!(Error::WatchStreamBroken {
        prefix: "vals/".into(),
        reason: "reset".into(),
    }
    .is_retryable());
    assert!(!Error::Closed.is_retryable());
    assert!(!Error::AlreadyCommitted.is_retryable());
    assert!(!Error::InvalidKey(String::new()).is_retryable());
}
