use super::*;

#[test]
fn test_vector_id_first_chunk_is_commit_hash() {
    assert_eq!(vector_id("abc123", 0), "abc123");
}

#[test]
fn test_vector_id_later_chunks_are_suffixed() {
    assert_eq!(vector_id("abc123", 1), "abc123-1");
    assert_eq!(vector_id("abc123", 12), "abc123-12");
}

#[test]
fn test_vector_id_is_deterministic() {
    let chunk = Chunk {
        commit_hash: "e531c61632f0d4382c7d53213b7a8dfc36351cf9".to_string(),
        index: 1,
        text: "diff".to_string(),
    };
    assert_eq!(chunk.vector_id(), chunk.clone().vector_id());
    assert_eq!(
        chunk.vector_id(),
        "e531c61632f0d4382c7d53213b7a8dfc36351cf9-1"
    );
}

#[test]
fn test_status_serializes_lowercase() {
    let json = serde_json::to_string(&IndexingStatus::Indexed).unwrap();
    assert_eq!(json, "\"indexed\"");

    let status: IndexingStatus = serde_json::from_str("\"pending\"").unwrap();
    assert_eq!(status, IndexingStatus::Pending);
    assert_eq!(IndexingStatus::Failed.to_string(), "failed");
}

#[test]
fn test_repository_accepts_status_alias() {
    let json = r#"{"id": "r1", "name": "docs", "url": "https://example.com/docs.git", "status": "indexing"}"#;
    let repo: Repository = serde_json::from_str(json).unwrap();
    assert_eq!(repo.indexing_status, IndexingStatus::Indexing);
}

#[test]
fn test_repository_status_defaults_to_pending() {
    let json = r#"{"id": "r1", "name": "docs", "url": "https://example.com/docs.git"}"#;
    let repo: Repository = serde_json::from_str(json).unwrap();
    assert_eq!(repo.indexing_status, IndexingStatus::Pending);
}

#[test]
fn test_failure_ratio() {
    let report = IndexReport {
        commits_dispatched: 4,
        commits_failed: 1,
        ..Default::default()
    };
    assert!((report.failure_ratio() - 0.25).abs() < f64::EPSILON);
    assert_eq!(IndexReport::default().failure_ratio(), 0.0);
}
