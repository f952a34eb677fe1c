use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use super::detector::outlier_threshold;
use super::*;
use crate::config::DuplicateConfig;
use crate::errors::QuorumError;
use crate::vector::{Artifact, ArtifactId, EmbeddingStore, SimilarityProvider, Vector};

fn detector(embeddings: Vec<(&str, Vector)>) -> DuplicateDetector {
    let provider: Arc<dyn SimilarityProvider> =
        Arc::new(EmbeddingStore::from_embeddings(embeddings).unwrap());
    DuplicateDetector::new(DuplicateConfig::default(), provider)
}

fn artifacts(ids: &[&str]) -> Vec<Artifact> {
    ids.iter()
        .map(|id| Artifact::new(*id, format!("content {}", id)))
        .collect()
}

fn ids(values: &[&str]) -> BTreeSet<ArtifactId> {
    values.iter().map(|s| s.to_string()).collect()
}

fn edge(a: &str, b: &str) -> (ArtifactId, ArtifactId) {
    (a.to_string(), b.to_string())
}

fn symmetric_map(edges: &[(&str, &str)]) -> DuplicateMap {
    let mut map = DuplicateMap::new();
    for (a, b) in edges {
        map.entry(a.to_string()).or_default().insert(b.to_string());
        map.entry(b.to_string()).or_default().insert(a.to_string());
    }
    map
}

/// Two tight pairs on disjoint dimensions, every cross pair orthogonal
fn two_pairs() -> DuplicateDetector {
    let s = (1.0f32 - 0.95 * 0.95).sqrt();
    detector(vec![
        ("a", vec![1.0, 0.0, 0.0, 0.0]),
        ("b", vec![0.95, s, 0.0, 0.0]),
        ("c", vec![0.0, 0.0, 1.0, 0.0]),
        ("d", vec![0.0, 0.0, 0.95, s]),
    ])
}

/// `a` and `b` share cluster 1, `c` and `d` come from clusters 2 and 3
fn origins() -> OriginatingClusterMap {
    let mut map = OriginatingClusterMap::new();
    map.insert(
        "1".to_string(),
        HashSet::from(["content a".to_string(), "content b".to_string()]),
    );
    map.insert("2".to_string(), HashSet::from(["content c".to_string()]));
    map.insert("3".to_string(), HashSet::from(["content d".to_string()]));
    map
}

#[test]
fn test_duplicate_type_values() {
    assert_eq!(DuplicateType::All.value(), "all");
    assert_eq!(DuplicateType::IntraCluster.to_string(), "intra");
    assert_eq!(DuplicateType::InterCluster.value(), "inter");
    for t in [DuplicateType::All, DuplicateType::IntraCluster, DuplicateType::InterCluster] {
        assert_eq!(DuplicateType::from_value(t.value()), Some(t));
    }
    assert_eq!(DuplicateType::from_value("mixed"), None);
}

#[test]
fn test_finds_tight_pairs() {
    let detector = two_pairs();
    let report = detector
        .get_duplicates(&artifacts(&["a", "b", "c", "d"]), DuplicateType::All, None)
        .unwrap();

    assert_eq!(report.duplicate_ids, ids(&["a", "b", "c", "d"]));
    assert_eq!(
        report.edges(),
        BTreeSet::from([edge("a", "b"), edge("c", "d")])
    );
    assert_eq!(report.duplicate_map["a"], ids(&["b"]));
    assert_eq!(report.duplicate_map["b"], ids(&["a"]));

    let threshold = report.threshold.unwrap();
    assert!((threshold - 0.95).abs() < 1e-3);

    // one link plus a third of the single non-zero similarity
    let count = report.counts["a"];
    assert!((count - (1.0 + threshold / 3.0)).abs() < 1e-9);
    assert_eq!(report.counts.len(), 4);
}

#[test]
fn test_greedy_removal_keeps_one_per_pair() {
    let report = two_pairs()
        .get_duplicates(&artifacts(&["a", "b", "c", "d"]), DuplicateType::All, None)
        .unwrap();
    let removed = find_most_duplicated(&report.counts, &report.duplicate_map);
    assert_eq!(removed, ids(&["a", "c"]));
}

#[test]
fn test_intra_and_inter_split_edges() {
    let detector = two_pairs();
    let batch = artifacts(&["a", "b", "c", "d"]);
    let origins = origins();

    let intra = detector
        .get_duplicates(&batch, DuplicateType::IntraCluster, Some(&origins))
        .unwrap();
    assert_eq!(intra.duplicate_ids, ids(&["a", "b"]));
    assert_eq!(intra.edges(), BTreeSet::from([edge("a", "b")]));
    assert!(!intra.counts.contains_key("c"));

    let inter = detector
        .get_duplicates(&batch, DuplicateType::InterCluster, Some(&origins))
        .unwrap();
    assert_eq!(inter.duplicate_ids, ids(&["c", "d"]));
    assert_eq!(inter.edges(), BTreeSet::from([edge("c", "d")]));

    // the origin map is ignored for All
    let all = detector
        .get_duplicates(&batch, DuplicateType::All, Some(&origins))
        .unwrap();
    assert_eq!(all.edges().len(), 2);
}

#[test]
fn test_counts_keep_exceedances_dropped_by_refinement() {
    // b and c both sit close to a but not to each other
    let s = (1.0f32 - 0.99 * 0.99).sqrt();
    let detector = detector(vec![
        ("a", vec![1.0, 0.0, 0.0, 0.0]),
        ("b", vec![0.99, s, 0.0, 0.0]),
        ("c", vec![0.99, -s, 0.0, 0.0]),
        ("d", vec![0.0, 0.0, 1.0, 0.0]),
        ("e", vec![0.0, 0.0, 0.0, 1.0]),
    ]);
    let batch = artifacts(&["a", "b", "c", "d", "e"]);
    let mut origins = OriginatingClusterMap::new();
    origins.insert(
        "x".to_string(),
        HashSet::from(["content a".to_string(), "content b".to_string()]),
    );
    origins.insert("y".to_string(), HashSet::from(["content c".to_string()]));

    let all = detector
        .get_duplicates(&batch, DuplicateType::All, None)
        .unwrap();
    assert_eq!(all.edges(), BTreeSet::from([edge("a", "b"), edge("a", "c")]));

    let intra = detector
        .get_duplicates(&batch, DuplicateType::IntraCluster, Some(&origins))
        .unwrap();
    assert_eq!(intra.edges(), BTreeSet::from([edge("a", "b")]));
    assert_eq!(intra.counts.keys().collect::<Vec<_>>(), vec!["a", "b"]);

    // a exceeded the threshold twice even though one link was pruned
    let threshold = intra.threshold.unwrap();
    assert!((intra.counts["a"] - (2.0 + threshold / 2.0)).abs() < 1e-9);
    assert_eq!(intra.counts["a"], all.counts["a"]);
    assert_eq!(intra.counts["b"], all.counts["b"]);
    assert!(intra.counts["a"] > intra.counts["b"]);

    let inter = detector
        .get_duplicates(&batch, DuplicateType::InterCluster, Some(&origins))
        .unwrap();
    assert_eq!(inter.edges(), BTreeSet::from([edge("a", "c")]));
    assert_eq!(inter.counts["a"], all.counts["a"]);

    let removed = find_most_duplicated(&intra.counts, &intra.duplicate_map);
    assert_eq!(removed, ids(&["a"]));
}

#[test]
fn test_classification_requires_origin_map() {
    let detector = two_pairs();
    for t in [DuplicateType::IntraCluster, DuplicateType::InterCluster] {
        let err = detector.get_duplicates(&[], t, None).unwrap_err();
        assert!(matches!(err, QuorumError::MissingOriginMap(_)));
    }
    assert!(detector
        .get_duplicates(&[], DuplicateType::All, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_single_artifact_has_no_duplicates() {
    let detector = two_pairs();
    let report = detector
        .get_duplicates(&artifacts(&["a", "a"]), DuplicateType::All, None)
        .unwrap();
    assert!(report.is_empty());
    assert!(report.threshold.is_none());
    assert!(report.counts.is_empty());
}

#[test]
fn test_two_artifacts_use_base_threshold() {
    let close = (1.0f32 - 0.95 * 0.95).sqrt();
    let far = (1.0f32 - 0.85 * 0.85).sqrt();
    let detector = detector(vec![
        ("a", vec![1.0, 0.0]),
        ("b", vec![0.95, close]),
        ("c", vec![0.85, far]),
    ]);

    let report = detector
        .get_duplicates(&artifacts(&["a", "b"]), DuplicateType::All, None)
        .unwrap();
    assert_eq!(report.threshold, Some(DUPLICATE_BASE_THRESHOLD));
    assert_eq!(report.duplicate_ids, ids(&["a", "b"]));

    let report = detector
        .get_duplicates(&artifacts(&["a", "c"]), DuplicateType::All, None)
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(report.threshold, Some(DUPLICATE_BASE_THRESHOLD));
}

#[test]
fn test_unknown_artifact_is_an_error() {
    let err = two_pairs()
        .get_duplicates(&artifacts(&["a", "zz"]), DuplicateType::All, None)
        .unwrap_err();
    assert!(matches!(err, QuorumError::UnknownArtifact(_)));
}

#[test]
fn test_outlier_threshold() {
    assert_eq!(outlier_threshold(&[], DUPLICATE_SIGMA, SIMILARITY_EPSILON), 0.0);
    assert!((outlier_threshold(&[0.5, 0.5], DUPLICATE_SIGMA, SIMILARITY_EPSILON) - 0.5).abs() < 1e-12);

    // a zero score is floored at epsilon in the harmonic mean
    let threshold = outlier_threshold(&[0.0, 1.0], DUPLICATE_SIGMA, SIMILARITY_EPSILON);
    assert!((threshold - 0.75).abs() < 1e-5);
    assert!(threshold > 0.75);
}

#[test]
fn test_can_be_removed() {
    let map = symmetric_map(&[("a", "b"), ("b", "c")]);
    let removed = ids(&["a"]);
    // b is all a has left
    assert!(!can_be_removed(&"b".to_string(), &map, &removed));
    assert!(can_be_removed(&"c".to_string(), &map, &removed));
    assert!(can_be_removed(&"x".to_string(), &map, &removed));
}

#[test]
fn test_greedy_removal_on_star_and_triangle() {
    let star = symmetric_map(&[("hub", "x"), ("hub", "y"), ("hub", "z")]);
    let counts: BTreeMap<ArtifactId, f64> = [("hub", 3.5), ("x", 1.2), ("y", 1.1), ("z", 1.0)]
        .iter()
        .map(|(id, c)| (id.to_string(), *c))
        .collect();
    assert_eq!(find_most_duplicated(&counts, &star), ids(&["hub"]));

    let triangle = symmetric_map(&[("a", "b"), ("b", "c"), ("a", "c")]);
    let removed = find_most_duplicated(&BTreeMap::new(), &triangle);
    assert_eq!(removed, ids(&["a", "b"]));
}

#[test]
fn test_rename_and_identify() {
    assert_eq!(rename_cluster(12, DuplicateType::IntraCluster), "r-12-intra");
    assert_eq!(rename_cluster("x", DuplicateType::InterCluster), "r-x-inter");
    assert_eq!(rename_cluster(3, DuplicateType::All), "r-3-all");

    assert_eq!(identify_original_cluster("r-12-intra").unwrap(), "12");
    for name in ["r-12-inter", "r-12-all", "12-intra", "r-12"] {
        assert!(matches!(
            identify_original_cluster(name),
            Err(QuorumError::InvalidName(_))
        ));
    }
}

#[test]
fn test_duplicate_families() {
    let map = symmetric_map(&[("d", "e"), ("a", "b"), ("b", "c")]);
    let families = duplicate_families(&map);
    assert_eq!(families, vec![ids(&["a", "b", "c"]), ids(&["d", "e"])]);
    assert!(duplicate_families(&DuplicateMap::new()).is_empty());
}

#[test]
fn test_long_chain_is_one_family() {
    let names: Vec<String> = (0..5000).map(|i| format!("n{:05}", i)).collect();
    let mut map = DuplicateMap::new();
    for pair in names.windows(2) {
        map.entry(pair[0].clone()).or_default().insert(pair[1].clone());
        map.entry(pair[1].clone()).or_default().insert(pair[0].clone());
    }
    let families = duplicate_families(&map);
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].len(), 5000);
}

#[test]
fn test_classify_families() {
    let detector = two_pairs();
    let batch = artifacts(&["a", "b", "c", "d"]);
    let report = detector
        .get_duplicates(&batch, DuplicateType::All, None)
        .unwrap();

    let families = classify_families(&report.duplicate_map, &batch, &origins());
    assert_eq!(families.len(), 2);

    assert_eq!(families[0].members, ids(&["a", "b"]));
    assert_eq!(families[0].category, DuplicateCategory::Intra);
    assert_eq!(families[0].name, "r-1-intra");
    assert_eq!(identify_original_cluster(&families[0].name).unwrap(), "1");

    assert_eq!(families[1].members, ids(&["c", "d"]));
    assert_eq!(families[1].category, DuplicateCategory::Inter);
    assert_eq!(families[1].name, "r-1-inter");
}

#[test]
fn test_mixed_family() {
    let map = symmetric_map(&[("a", "b"), ("b", "c")]);
    let batch = artifacts(&["a", "b", "c"]);
    let mut origins = OriginatingClusterMap::new();
    origins.insert(
        "7".to_string(),
        HashSet::from(["content a".to_string(), "content b".to_string()]),
    );
    origins.insert("8".to_string(), HashSet::from(["content c".to_string()]));

    let families = classify_families(&map, &batch, &origins);
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].category, DuplicateCategory::Mixed);
    assert_eq!(families[0].name, "r-0-all");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn batch_strategy() -> impl Strategy<Value = Vec<Vec<f32>>> {
        proptest::collection::vec(
            proptest::collection::vec(0.05f32..1.0, 3),
            2..9,
        )
    }

    fn batch(vectors: &[Vec<f32>]) -> (DuplicateDetector, Vec<Artifact>) {
        let names: Vec<String> = (0..vectors.len()).map(|i| format!("x{}", i)).collect();
        let provider: Arc<dyn SimilarityProvider> = Arc::new(
            EmbeddingStore::from_embeddings(names.iter().cloned().zip(vectors.iter().cloned()))
                .unwrap(),
        );
        let batch = names
            .iter()
            .map(|n| Artifact::new(n.clone(), format!("content {}", n)))
            .collect();
        (DuplicateDetector::new(DuplicateConfig::default(), provider), batch)
    }

    proptest! {
        #[test]
        fn duplicate_map_is_symmetric_without_self_links(vectors in batch_strategy()) {
            let (detector, batch) = batch(&vectors);
            let report = detector.get_duplicates(&batch, DuplicateType::All, None).unwrap();

            for (id, duplicates) in &report.duplicate_map {
                prop_assert!(!duplicates.is_empty());
                prop_assert!(!duplicates.contains(id));
                for other in duplicates {
                    prop_assert!(report.duplicate_map[other].contains(id));
                }
            }
            let keys: BTreeSet<ArtifactId> = report.duplicate_map.keys().cloned().collect();
            prop_assert_eq!(keys, report.duplicate_ids.clone());
        }

        #[test]
        fn intra_and_inter_partition_all_edges(
            vectors in batch_strategy(),
            clusters in 1usize..4
        ) {
            let (detector, batch) = batch(&vectors);
            let mut origins = OriginatingClusterMap::new();
            for (i, artifact) in batch.iter().enumerate() {
                origins
                    .entry((i % clusters).to_string())
                    .or_default()
                    .insert(artifact.content.clone());
            }

            let all = detector.get_duplicates(&batch, DuplicateType::All, None).unwrap().edges();
            let intra = detector
                .get_duplicates(&batch, DuplicateType::IntraCluster, Some(&origins))
                .unwrap()
                .edges();
            let inter = detector
                .get_duplicates(&batch, DuplicateType::InterCluster, Some(&origins))
                .unwrap()
                .edges();

            prop_assert!(intra.is_disjoint(&inter));
            let union: BTreeSet<_> = intra.union(&inter).cloned().collect();
            prop_assert_eq!(union, all);
        }

        #[test]
        fn greedy_removal_never_empties_a_family(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..20),
            weights in proptest::collection::vec(0.0f64..5.0, 8)
        ) {
            let mut map = DuplicateMap::new();
            for (a, b) in edges.into_iter().filter(|(a, b)| a != b) {
                map.entry(format!("n{}", a)).or_default().insert(format!("n{}", b));
                map.entry(format!("n{}", b)).or_default().insert(format!("n{}", a));
            }
            let counts: BTreeMap<ArtifactId, f64> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("n{}", i), *w))
                .collect();

            let removed = find_most_duplicated(&counts, &map);
            for family in duplicate_families(&map) {
                prop_assert!(family.iter().any(|id| !removed.contains(id)));
            }
            prop_assert!(removed.iter().all(|id| map.contains_key(id)));
        }

        #[test]
        fn intra_names_round_trip(cluster in "[a-z0-9-]{0,12}") {
            let name = rename_cluster(&cluster, DuplicateType::IntraCluster);
            prop_assert_eq!(identify_original_cluster(&name).unwrap(), cluster.clone());
            prop_assert!(identify_original_cluster(&rename_cluster(&cluster, DuplicateType::InterCluster)).is_err());
        }
    }
}
