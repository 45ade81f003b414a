// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// ingest/query/remove_source/stats through RetrievalService

use docqa_retrieval::config::{EmbedderBackend, EmbedderConfig, RetrievalConfig};
use docqa_retrieval::embeddings::{load_embedder, HashingEmbedder};
use docqa_retrieval::rag::{LoadOutcome, RawPassage, RetrievalError, RetrievalService, TextChunker};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &Path) -> RetrievalConfig {
    RetrievalConfig {
        embedder: EmbedderConfig {
            backend: EmbedderBackend::Hashing,
            ..EmbedderConfig::default()
        },
        index_dir: dir.to_path_buf(),
        ..RetrievalConfig::default()
    }
}

fn service(dir: &Path) -> RetrievalService {
    let config = config(dir);
    let embedder = load_embedder(&config.embedder).unwrap();
    RetrievalService::new(&config, embedder).unwrap()
}

fn raw(content: &str, metadata: Value) -> RawPassage {
    let metadata: Map<String, Value> = match metadata {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    RawPassage {
        content: content.to_string(),
        metadata,
    }
}

fn bio() -> Vec<RawPassage> {
    vec![
        raw(
            "Photosynthesis converts light to energy",
            json!({"source": "bio101.pdf"}),
        ),
        raw("Mitosis is cell division", json!({"source": "bio101.pdf"})),
    ]
}

#[test]
fn test_ingest_reports_accepted_count() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());

    let mut passages = bio();
    passages.push(raw("", json!({})));
    let report = service.ingest("bio101.pdf", passages).unwrap();
    assert_eq!(report.accepted_count, 2);
    assert_eq!(service.stats(None).unwrap().total_passages, 2);
}

#[test]
fn test_query_ranks_and_removes() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    service.ingest("bio101.pdf", bio()).unwrap();

    let results = service
        .query(None, "How do plants make energy?", 1, 0.0)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].content.starts_with("Photosynthesis"));
    assert_eq!(results[0].metadata.source(), "bio101.pdf");

    assert_eq!(service.remove_source(None, "bio101.pdf").unwrap(), 2);
    assert_eq!(service.stats(None).unwrap().total_passages, 0);
}

#[test]
fn test_source_id_overrides_caller_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    service
        .ingest(
            "lecture-3.pdf",
            vec![raw(
                "Enzymes lower activation energy",
                json!({"source": "other.pdf", "page": 7, "chunk_id": 41}),
            )],
        )
        .unwrap();

    let stats = service.stats(None).unwrap();
    assert_eq!(stats.sources.len(), 1);
    assert_eq!(stats.sources["lecture-3.pdf"], 1);

    let hit = &service.query(None, "enzymes", 1, -1.0).unwrap()[0];
    assert_eq!(hit.metadata.field("page"), Some(&json!(7)));
    assert_eq!(hit.metadata.chunk_id(), Some(41));
}

#[test]
fn test_single_tenant_index_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        let service = service(temp_dir.path());
        assert_eq!(service.load_outcome(), &LoadOutcome::Fresh);
        service.ingest("bio101.pdf", bio()).unwrap();
    }

    let restarted = service(temp_dir.path());
    assert_eq!(restarted.load_outcome(), &LoadOutcome::Loaded(2));
    let top = restarted
        .query(None, "How do plants make energy?", 1, 0.0)
        .unwrap();
    assert!(top[0].content.starts_with("Photosynthesis"));
}

#[test]
fn test_persistence_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("index");
    let config = RetrievalConfig {
        persist: false,
        ..config(&dir)
    };
    let service = RetrievalService::new(&config, Arc::new(HashingEmbedder::default())).unwrap();
    service.ingest("bio101.pdf", bio()).unwrap();
    assert!(!dir.exists());
}

#[test]
fn test_sessions_do_not_touch_single_tenant_index() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    service.ingest("bio101.pdf", bio()).unwrap();

    let token = service.create_session();
    let report = service
        .ingest_session(
            &token,
            "notes.txt",
            vec![raw("Plants make sugar from sunlight", json!({}))],
        )
        .unwrap();
    assert_eq!(report.accepted_count, 1);

    let session_hits = service
        .query(Some(&token), "How do plants make energy?", 10, -1.0)
        .unwrap();
    assert_eq!(session_hits.len(), 1);
    assert_eq!(session_hits[0].metadata.source(), "notes.txt");

    assert_eq!(service.stats(None).unwrap().total_passages, 2);
    assert_eq!(service.stats(Some(&token)).unwrap().total_passages, 1);

    // removing from the session leaves the shared index alone
    service.remove_source(Some(&token), "notes.txt").unwrap();
    assert_eq!(service.stats(Some(&token)).unwrap().total_passages, 0);
    assert_eq!(service.stats(None).unwrap().total_passages, 2);
}

#[test]
fn test_unknown_session_token() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());

    let err = service.query(Some("stale-token"), "energy", 5, 0.0).unwrap_err();
    assert!(matches!(err, RetrievalError::SessionNotFound(_)));
    assert!(service
        .ingest_session("stale-token", "a.pdf", bio())
        .is_err());
    assert!(service.remove_source(Some("stale-token"), "a.pdf").is_err());
    assert!(service.stats(Some("stale-token")).is_err());
}

#[test]
fn test_end_session() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    let token = service.create_session();
    assert_eq!(service.list_sessions().len(), 1);

    assert!(service.end_session(&token));
    assert!(!service.end_session(&token));
    assert!(service.list_sessions().is_empty());
    assert!(service.stats(Some(&token)).is_err());
}

#[test]
fn test_clear_single_tenant_and_session() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    service.ingest("bio101.pdf", bio()).unwrap();
    let token = service.create_session();
    service.ingest_session(&token, "bio101.pdf", bio()).unwrap();

    service.clear(None).unwrap();
    service.clear(None).unwrap();
    assert_eq!(service.stats(None).unwrap().total_passages, 0);

    service.clear(Some(&token)).unwrap();
    assert_eq!(service.stats(Some(&token)).unwrap().total_passages, 0);
}

#[test]
fn test_relevant_context_format() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    service.ingest("bio101.pdf", bio()).unwrap();

    let context = service
        .relevant_context(None, "How do plants make energy?", 3000)
        .unwrap();
    assert!(context.starts_with("Source: bio101.pdf\nPhotosynthesis"));
    assert!(context.contains("\n\n---\n\nSource: bio101.pdf\nMitosis"));
}

#[test]
fn test_chunked_document_ingest() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(temp_dir.path());
    let text = "Photosynthesis converts light to energy. ".repeat(60);

    let passages = TextChunker::new(200, 40).chunk_passages(&text, "long.txt");
    let expected = passages.len();
    assert!(expected > 1);

    let report = service.ingest_passages(None, passages).unwrap();
    assert_eq!(report.accepted_count, expected);

    let stored = service.passages(None).unwrap();
    assert_eq!(stored.len(), expected);
    assert_eq!(
        stored[0].metadata.field("total_chunks"),
        Some(&json!(expected))
    );
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = RetrievalConfig {
        session_ttl_secs: 0,
        ..config(temp_dir.path())
    };
    let result = RetrievalService::new(&config, Arc::new(HashingEmbedder::default()));
    assert!(matches!(result, Err(RetrievalError::InvalidConfig(_))));
}
