// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// VectorIndex behaviour on the hashing embedder

use docqa_retrieval::embeddings::HashingEmbedder;
use docqa_retrieval::rag::{IndexOptions, Passage, VectorIndex};
use std::sync::Arc;

const QUERY: &str = "How do plants make energy?";

fn new_index() -> VectorIndex {
    VectorIndex::in_memory(Arc::new(HashingEmbedder::default()), IndexOptions::default())
}

fn bio_passages() -> Vec<Passage> {
    vec![
        Passage::new("Photosynthesis converts light to energy", "bio101.pdf"),
        Passage::new("Mitosis is cell division", "bio101.pdf"),
    ]
}

fn mixed_passages() -> Vec<Passage> {
    vec![
        Passage::new("Photosynthesis converts light to energy", "bio101.pdf"),
        Passage::new("Mitosis is cell division", "bio101.pdf"),
        Passage::new("Newton's second law relates force and acceleration", "physics.pdf"),
        Passage::new("Energy is conserved in a closed system", "physics.pdf"),
        Passage::new("Plants store energy as starch", "botany.pdf"),
    ]
}

#[test]
fn test_empty_index_search_returns_nothing() {
    let index = new_index();
    assert!(index.is_empty());
    assert!(index.search(QUERY, 5, 0.0).unwrap().is_empty());
}

#[test]
fn test_size_counts_only_non_empty_passages() {
    let mut index = new_index();
    let mut passages = mixed_passages();
    passages.insert(1, Passage::new("", "bio101.pdf"));
    passages.push(Passage::new("", "physics.pdf"));

    let added = index.add(passages).unwrap();
    assert_eq!(added, 5);
    assert_eq!(index.size(), 5);

    // all-empty batch is accepted and stores nothing
    assert_eq!(index.add(vec![Passage::new("", "x")]).unwrap(), 0);
    assert_eq!(index.size(), 5);
}

#[test]
fn test_stored_vectors_are_unit_length() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    for ordinal in 0..index.size() {
        let v = index.vector(ordinal).unwrap();
        assert_eq!(v.len(), 384);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "vector {} has norm {}", ordinal, norm);
    }
    assert!(index.vector(index.size()).is_none());
}

#[test]
fn test_photosynthesis_ranks_above_mitosis() {
    let mut index = new_index();
    index.add(bio_passages()).unwrap();

    let top = index.search(QUERY, 1, 0.0).unwrap();
    assert_eq!(top.len(), 1);
    assert!(top[0].content.starts_with("Photosynthesis"));
    assert!(top[0].score > 0.0);

    let both = index.search(QUERY, 2, -1.0).unwrap();
    assert_eq!(both.len(), 2);
    assert!(both[0].content.starts_with("Photosynthesis"));
    assert!(both[1].content.starts_with("Mitosis"));
    assert!(both[0].score > both[1].score);
}

#[test]
fn test_delete_source_empties_index() {
    let mut index = new_index();
    index.add(bio_passages()).unwrap();

    assert_eq!(index.delete_by_source("bio101.pdf").unwrap(), 2);
    assert_eq!(index.stats().total_passages, 0);
    assert!(index.search(QUERY, 5, -1.0).unwrap().is_empty());
}

#[test]
fn test_delete_removes_exactly_one_source() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();
    let before = index.size();
    let physics = index.stats().sources["physics.pdf"];

    let removed = index.delete_by_source("physics.pdf").unwrap();
    assert_eq!(removed, physics);
    assert_eq!(index.size(), before - physics);

    let results = index.search("force energy system", 10, -1.0).unwrap();
    assert_eq!(results.len(), before - physics);
    assert!(results.iter().all(|r| r.metadata.source() != "physics.pdf"));

    // unknown source is a no-op
    assert_eq!(index.delete_by_source("missing.pdf").unwrap(), 0);
    assert_eq!(index.size(), before - physics);
}

#[test]
fn test_delete_keeps_remaining_rankings() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();
    let before: Vec<String> = index
        .search(QUERY, 10, -1.0)
        .unwrap()
        .into_iter()
        .filter(|r| r.metadata.source() != "physics.pdf")
        .map(|r| r.content)
        .collect();

    index.delete_by_source("physics.pdf").unwrap();
    let after: Vec<String> = index
        .search(QUERY, 10, -1.0)
        .unwrap()
        .into_iter()
        .map(|r| r.content)
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_clear_is_idempotent() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    index.clear().unwrap();
    assert_eq!(index.stats().total_passages, 0);
    index.clear().unwrap();
    assert_eq!(index.stats().total_passages, 0);
    assert_eq!(index.stats().total_sources, 0);
}

#[test]
fn test_k_is_clamped_to_index_size() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();
    assert_eq!(index.search(QUERY, 100, -1.0).unwrap().len(), 5);
    assert!(index.search(QUERY, 0, -1.0).unwrap().is_empty());
}

#[test]
fn test_raising_threshold_never_adds_results() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    let thresholds = [-1.0, -0.5, -0.1, 0.0, 0.05, 0.1, 0.2, 0.5, 0.9, 1.0];
    let counts: Vec<usize> = thresholds
        .iter()
        .map(|t| index.search(QUERY, 5, *t).unwrap().len())
        .collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]), "counts {:?}", counts);
}

#[test]
fn test_results_sorted_and_in_range() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    let results = index.search(QUERY, 5, -1.0).unwrap();
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
}

#[test]
fn test_empty_query_is_valid() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();
    assert_eq!(index.search("", 3, -1.0).unwrap().len(), 3);
}

#[test]
fn test_stats_group_by_source() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    let stats = index.stats();
    assert_eq!(stats.total_passages, 5);
    assert_eq!(stats.total_sources, 3);
    assert_eq!(stats.sources["bio101.pdf"], 2);
    assert_eq!(stats.sources["botany.pdf"], 1);
    assert_eq!(stats.embedding_dimension, 384);
    assert_eq!(stats.model_name, "feature-hashing-384");
    assert_eq!(stats.content_types.values().sum::<usize>(), 5);
}

#[test]
fn test_passages_listed_in_insertion_order() {
    let mut index = new_index();
    index.add(mixed_passages()).unwrap();

    let stored = index.passages();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[0].ordinal, 0);
    assert!(stored[2].content.starts_with("Newton"));
    assert_eq!(stored[4].metadata.source(), "botany.pdf");
    assert_eq!(stored[4].metadata.word_count(), 5);
}

#[test]
fn test_annotation_can_be_disabled() {
    let mut index = VectorIndex::in_memory(
        Arc::new(HashingEmbedder::default()),
        IndexOptions {
            annotate_content: false,
            ..IndexOptions::default()
        },
    );
    index.add(bio_passages()).unwrap();

    let stored = index.passages();
    assert_eq!(stored[0].content, "Photosynthesis converts light to energy");
    // metadata is still enriched
    assert_eq!(stored[0].metadata.word_count(), 5);
}
