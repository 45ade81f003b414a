// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Session isolation, lifecycle and concurrent use

use docqa_retrieval::embeddings::HashingEmbedder;
use docqa_retrieval::rag::{
    IndexOptions, Passage, RetrievalError, SessionManager, SessionState, DEFAULT_SESSION_TTL,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn manager_with_ttl(ttl: Duration) -> SessionManager {
    SessionManager::new(
        Arc::new(HashingEmbedder::default()),
        IndexOptions::default(),
        ttl,
    )
}

#[test]
fn test_default_ttl_is_two_hours() {
    assert_eq!(DEFAULT_SESSION_TTL, Duration::from_secs(7200));
    assert_eq!(manager_with_ttl(DEFAULT_SESSION_TTL).ttl(), DEFAULT_SESSION_TTL);
}

#[test]
fn test_sessions_are_isolated() {
    let manager = manager_with_ttl(DEFAULT_SESSION_TTL);
    let s1 = manager.create_session();
    let s2 = manager.create_session();

    manager
        .get_session(&s1)
        .unwrap()
        .add(vec![
            Passage::new("Photosynthesis converts light to energy", "bio101.pdf"),
            Passage::new("Mitosis is cell division", "bio101.pdf"),
        ])
        .unwrap();
    manager
        .get_session(&s2)
        .unwrap()
        .add(vec![Passage::new("Bonds pay a fixed coupon", "finance.pdf")])
        .unwrap();

    for query in ["How do plants make energy?", "Photosynthesis converts light to energy", ""] {
        let results = manager.get_session(&s2).unwrap().search(query, 10, -1.0).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|r| r.metadata.source() == "finance.pdf"));
    }

    let results = manager
        .get_session(&s1)
        .unwrap()
        .search("How do plants make energy?", 10, -1.0)
        .unwrap();
    assert!(results.iter().all(|r| r.metadata.source() == "bio101.pdf"));
}

#[test]
fn test_unknown_token_is_recoverable() {
    let manager = manager_with_ttl(DEFAULT_SESSION_TTL);
    let err = manager.get_session("not-a-session").unwrap_err();
    assert!(matches!(err, RetrievalError::SessionNotFound(_)));
    assert!(err.is_recoverable());
    assert!(manager.session_stats("not-a-session").is_err());
}

#[test]
fn test_session_delete_and_stats() {
    let manager = manager_with_ttl(DEFAULT_SESSION_TTL);
    let token = manager.create_session();
    let session = manager.get_session(&token).unwrap();
    session
        .add(vec![
            Passage::new("Photosynthesis converts light to energy", "bio101.pdf"),
            Passage::new("Mitosis is cell division", "bio101.pdf"),
            Passage::new("", "bio101.pdf"),
        ])
        .unwrap();
    assert_eq!(manager.session_stats(&token).unwrap().total_passages, 2);

    assert_eq!(session.delete_by_source("bio101.pdf").unwrap(), 2);
    assert_eq!(manager.session_stats(&token).unwrap().total_passages, 0);
}

#[test]
fn test_clear_session_ends_it() {
    let manager = manager_with_ttl(DEFAULT_SESSION_TTL);
    let token = manager.create_session();
    let handle = manager.get_session(&token).unwrap();

    assert!(manager.clear_session(&token));
    assert_eq!(handle.state(), SessionState::Cleared);
    assert!(handle.stats().is_err());
    assert!(manager.get_session(&token).is_err());
    assert_eq!(manager.session_count(), 0);
}

#[test]
fn test_activity_keeps_session_alive() {
    let manager = manager_with_ttl(Duration::from_millis(150));
    let token = manager.create_session();

    for _ in 0..4 {
        thread::sleep(Duration::from_millis(50));
        manager.get_session(&token).unwrap();
    }
    assert_eq!(manager.sweep_expired(), 0);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(manager.sweep_expired(), 1);
    assert!(manager.get_session(&token).is_err());
}

#[test]
fn test_list_sessions_skips_expired() {
    let manager = manager_with_ttl(Duration::from_millis(50));
    manager.create_session();
    thread::sleep(Duration::from_millis(120));
    let live = manager.create_session();

    let listed = manager.list_sessions();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].token, live);
}

#[test]
fn test_concurrent_sessions() {
    let manager = Arc::new(manager_with_ttl(DEFAULT_SESSION_TTL));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let token = manager.create_session();
                let source = format!("doc-{}.txt", i);
                let session = manager.get_session(&token).unwrap();
                session
                    .add(vec![
                        Passage::new(format!("passage one of document {}", i), source.clone()),
                        Passage::new(format!("passage two of document {}", i), source.clone()),
                    ])
                    .unwrap();
                let results = session.search("passage document", 10, -1.0).unwrap();
                assert_eq!(results.len(), 2);
                assert!(results.iter().all(|r| r.metadata.source() == source));
                token
            })
        })
        .collect();

    let tokens: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(manager.session_count(), 8);
    for token in &tokens {
        assert_eq!(manager.session_stats(token).unwrap().total_passages, 2);
    }
}

#[test]
fn test_shared_session_concurrent_readers_and_writer() {
    let manager = Arc::new(manager_with_ttl(DEFAULT_SESSION_TTL));
    let token = manager.create_session();

    thread::scope(|scope| {
        scope.spawn(|| {
            let session = manager.get_session(&token).unwrap();
            for i in 0..10 {
                session
                    .add(vec![Passage::new(format!("note number {}", i), "notes.txt")])
                    .unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                let session = manager.get_session(&token).unwrap();
                for _ in 0..10 {
                    let results = session.search("note", 5, -1.0).unwrap();
                    assert!(results.len() <= 5);
                    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
                }
            });
        }
    });

    assert_eq!(manager.session_stats(&token).unwrap().total_passages, 10);
}
