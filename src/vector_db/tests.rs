use super::*;
use crate::types::VectorMetadata;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn vector(id: &str, value: f32) -> EmbeddingVector {
    EmbeddingVector {
        id: id.to_string(),
        values: vec![value; 4],
        metadata: VectorMetadata {
            text: format!("payload {}", id),
            commit_id: id.to_string(),
            repository_url: "https://example.com/repo.git".to_string(),
            author: "Test Author".to_string(),
            chunk_index: 0,
        },
    }
}

fn fast_policy(batch_size: usize, max_retries: u32) -> UpsertPolicy {
    UpsertPolicy {
        batch_size,
        max_retries,
        retry_base: Duration::from_millis(1),
    }
}

/// Fails the first `failures` calls with the error built by `make_error`
struct FlakyStore {
    failures: usize,
    make_error: fn() -> VectorStoreError,
    calls: AtomicUsize,
    batches: Mutex<Vec<usize>>,
}

impl FlakyStore {
    fn new(failures: usize, make_error: fn() -> VectorStoreError) -> Self {
        Self {
            failures,
            make_error,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, vectors: Vec<EmbeddingVector>) -> Result<usize, VectorStoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err((self.make_error)());
        }
        self.batches.lock().unwrap().push(vectors.len());
        Ok(vectors.len())
    }

    fn namespace(&self) -> &str {
        "test"
    }

    fn backend_name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn test_memory_upsert_overwrites_by_id() {
    let store = MemoryVectorStore::new("commits");

    store.upsert(vec![vector("abc", 1.0), vector("abc-1", 1.0)]).await.unwrap();
    store.upsert(vec![vector("abc", 2.0)]).await.unwrap();

    assert_eq!(store.len().await, 2);
    assert_eq!(store.get("abc").await.unwrap().values, vec![2.0; 4]);
    assert_eq!(store.ids().await, vec!["abc", "abc-1"]);
    assert_eq!(store.upsert_calls(), 2);
}

#[tokio::test]
async fn test_upsert_is_batched() {
    let store = FlakyStore::new(0, || VectorStoreError::UpsertFailed("unused".to_string()));
    let vectors: Vec<_> = (0..5).map(|i| vector(&format!("c{}", i), 0.0)).collect();

    let written = upsert_with_retry(&store, vectors, &fast_policy(2, 0))
        .await
        .unwrap();

    assert_eq!(written, 5);
    assert_eq!(*store.batches.lock().unwrap(), vec![2, 2, 1]);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = FlakyStore::new(2, || VectorStoreError::UpsertRejected {
        status: 503,
        body: "unavailable".to_string(),
    });

    let written = upsert_with_retry(&store, vec![vector("abc", 0.0)], &fast_policy(10, 2))
        .await
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let store = FlakyStore::new(10, || VectorStoreError::UpsertFailed("reset".to_string()));

    let err = upsert_with_retry(&store, vec![vector("abc", 0.0)], &fast_policy(10, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, VectorStoreError::UpsertFailed(_)));
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rejections_are_not_retried() {
    let store = FlakyStore::new(1, || VectorStoreError::UpsertRejected {
        status: 400,
        body: "dimension mismatch".to_string(),
    });

    let result = upsert_with_retry(&store, vec![vector("abc", 0.0)], &fast_policy(10, 5)).await;

    assert!(result.is_err());
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_create_store_backends() {
    let config = VectorStoreConfig {
        backend: "memory".to_string(),
        ..Default::default()
    };
    let store = create_store(&config).unwrap();
    assert_eq!(store.backend_name(), "memory");
    assert_eq!(store.namespace(), "commits");

    let config = VectorStoreConfig {
        backend: "chroma".to_string(),
        ..Default::default()
    };
    assert!(create_store(&config).is_err());
}

#[test]
fn test_policy_from_config() {
    let config = VectorStoreConfig {
        upsert_batch_size: 0,
        max_retries: 7,
        ..Default::default()
    };
    let policy = UpsertPolicy::from_config(&config);
    assert_eq!(policy.batch_size, 1);
    assert_eq!(policy.max_retries, 7);
}
