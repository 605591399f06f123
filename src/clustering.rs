//! Minimizer-based clustering of candidate proteins and the two
//! alignment-free pruning passes that run before BLAST.
//!
//! Cluster assignment depends on previously created clusters, so the
//! cluster table is owned by a single serial consumer; only sketch
//! computation is farmed out to the worker pool, in `group_size` batches.
//! This makes the final clustering identical for any worker count.

use crate::minimizers::{self, sketch};
use crate::registry::id_cmp;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct ClusterMember {
    pub id: String,
    pub length: usize,
    /// Shared-minimizer proportion against the representative, fixed at
    /// join time; 1.0 for the representative itself.
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Seed first; the representative is always a member of its own cluster.
    pub members: Vec<ClusterMember>,
}

impl Cluster {
    pub fn representative(&self) -> &str {
        &self.members[0].id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Deterministic processing order: longest first so the most specific
/// sequences seed clusters, ties broken by the identifier total order.
fn processing_order<'a>(proteins: &'a FxHashMap<String, String>) -> Vec<(&'a str, &'a str)> {
    let mut ordered: Vec<(&str, &str)> = proteins
        .iter()
        .map(|(id, seq)| (id.as_str(), seq.as_str()))
        .collect();
    ordered.sort_by(|a, b| match b.1.len().cmp(&a.1.len()) {
        Ordering::Equal => id_cmp(a.0, b.0),
        other => other,
    });
    ordered
}

/// Group proteins into candidate-locus clusters by shared-minimizer
/// proportion against existing cluster representatives.
pub fn cluster(
    proteins: &FxHashMap<String, String>,
    k: usize,
    window: usize,
    threshold: f64,
    group_size: usize,
) -> Vec<Cluster> {
    let ordered = processing_order(proteins);
    let group_size = group_size.max(1);

    let mut clusters: Vec<Cluster> = Vec::new();
    // Inverted index over representative sketches only.
    let mut index: FxHashMap<u64, Vec<u32>> = FxHashMap::default();

    for batch in ordered.chunks(group_size) {
        let sketches: Vec<FxHashSet<u64>> = batch
            .par_iter()
            .map(|(_, seq)| sketch(seq, k, window))
            .collect();

        for ((id, seq), query) in batch.iter().zip(sketches) {
            let mut shared: FxHashMap<u32, usize> = FxHashMap::default();
            for minimizer in &query {
                if let Some(owners) = index.get(minimizer) {
                    for &owner in owners {
                        *shared.entry(owner).or_insert(0) += 1;
                    }
                }
            }

            // Best score wins; equal scores go to the earliest cluster.
            let mut best: Option<(u32, f64)> = None;
            for (&owner, &count) in &shared {
                let score = count as f64 / query.len() as f64;
                best = match best {
                    Some((bo, bs)) if score < bs || (score == bs && owner > bo) => Some((bo, bs)),
                    _ => Some((owner, score)),
                };
            }

            match best {
                Some((owner, score)) if score >= threshold => {
                    clusters[owner as usize].members.push(ClusterMember {
                        id: id.to_string(),
                        length: seq.len(),
                        similarity: score,
                    });
                }
                _ => {
                    let owner = clusters.len() as u32;
                    clusters.push(Cluster {
                        members: vec![ClusterMember {
                            id: id.to_string(),
                            length: seq.len(),
                            similarity: 1.0,
                        }],
                    });
                    for minimizer in query {
                        index.entry(minimizer).or_default().push(owner);
                    }
                }
            }
        }
    }

    clusters
}

pub struct RepresentativePruning {
    /// Clusters that still hold more than one member.
    pub clusters: Vec<Cluster>,
    /// Members dropped as redundant alleles of their representative.
    pub excluded: Vec<String>,
    /// Representatives whose cluster collapsed to the seed alone; still
    /// valid locus candidates.
    pub singletons: Vec<String>,
    /// Candidate sequences still in play (multi-member cluster members
    /// plus singletons).
    pub remaining: usize,
}

/// Drop every non-seed member whose join-time similarity against the
/// representative meets the threshold.
pub fn prune_by_representative(clusters: Vec<Cluster>, threshold: f64) -> RepresentativePruning {
    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    let mut singletons = Vec::new();
    for mut cluster in clusters {
        let mut members = Vec::with_capacity(cluster.members.len());
        for (i, member) in cluster.members.drain(..).enumerate() {
            if i > 0 && member.similarity >= threshold {
                excluded.push(member.id);
            } else {
                members.push(member);
            }
        }
        if members.len() == 1 {
            singletons.push(members.remove(0).id);
        } else {
            kept.push(Cluster { members });
        }
    }
    let remaining = singletons.len() + kept.iter().map(Cluster::len).sum::<usize>();
    RepresentativePruning {
        clusters: kept,
        excluded,
        singletons,
        remaining,
    }
}

/// Drop near-duplicate non-seed members that the representative check
/// missed: within each cluster, a member sharing at least `threshold` of
/// its own minimizers with a longer-or-equal member is excluded. Sketches
/// are recomputed with window = k for a denser comparison. Idempotent on
/// its own output.
pub fn prune_intra_cluster(
    clusters: Vec<Cluster>,
    proteins: &FxHashMap<String, String>,
    k: usize,
    threshold: f64,
) -> (Vec<Cluster>, Vec<String>) {
    let mut excluded_all = Vec::new();
    let mut pruned = Vec::new();
    for mut cluster in clusters {
        let representative = cluster.representative().to_string();
        let mut others: Vec<&ClusterMember> = cluster
            .members
            .iter()
            .filter(|m| m.id != representative)
            .collect();
        others.sort_by(|a, b| match b.length.cmp(&a.length) {
            Ordering::Equal => id_cmp(&a.id, &b.id),
            other => other,
        });

        let sketches: Vec<FxHashSet<u64>> = others
            .par_iter()
            .map(|m| sketch(&proteins[&m.id], k, k))
            .collect();

        let mut dropped: Vec<bool> = vec![false; others.len()];
        for i in 1..others.len() {
            for j in 0..i {
                if dropped[j] {
                    continue;
                }
                let shared = minimizers::shared_proportion(&sketches[i], &sketches[j]);
                if shared >= threshold {
                    dropped[i] = true;
                    excluded_all.push(others[i].id.clone());
                    break;
                }
            }
        }

        let dropped_ids: FxHashSet<String> = others
            .iter()
            .zip(&dropped)
            .filter(|(_, &d)| d)
            .map(|(m, _)| m.id.clone())
            .collect();
        drop(others);
        cluster
            .members
            .retain(|m| !dropped_ids.contains(m.id.as_str()));
        pruned.push(cluster);
    }
    (pruned, excluded_all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protein_map(entries: &[(&str, &str)]) -> FxHashMap<String, String> {
        entries
            .iter()
            .map(|(id, seq)| (id.to_string(), seq.to_string()))
            .collect()
    }

    const SEQ_A: &str = "MKWLTAEQRRDFGHIKNNPQRSTVWYACDEFG";
    const SEQ_B: &str = "MKWLTAEQRRDFGHIKNNPQRSTVWYACDEF"; // one residue shorter
    const SEQ_C: &str = "PPPPGGGGSSSSLLLLTTTTVVVVAAAAKKKK";

    #[test]
    fn near_identical_sequences_share_a_cluster() {
        let proteins = protein_map(&[("g1-protein_1", SEQ_A), ("g2-protein_1", SEQ_B)]);
        let clusters = cluster(&proteins, 5, 5, 0.2, 10);
        assert_eq!(clusters.len(), 1);
        // Longest sequence seeds the cluster.
        assert_eq!(clusters[0].representative(), "g1-protein_1");
        assert_eq!(clusters[0].len(), 2);
        assert!(clusters[0].members[1].similarity > 0.8);
    }

    #[test]
    fn unrelated_sequences_found_their_own_clusters() {
        let proteins = protein_map(&[("g1-protein_1", SEQ_A), ("g3-protein_1", SEQ_C)]);
        let clusters = cluster(&proteins, 5, 5, 0.2, 10);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn batch_size_does_not_change_the_result() {
        let proteins = protein_map(&[
            ("g1-protein_1", SEQ_A),
            ("g2-protein_1", SEQ_B),
            ("g3-protein_1", SEQ_C),
            ("g4-protein_1", "MKWLTAEQRRDFGHIKNNPQRSTVWYACDXFG"),
        ]);
        let reference: Vec<Vec<String>> = cluster(&proteins, 5, 5, 0.2, 1)
            .into_iter()
            .map(|c| c.members.into_iter().map(|m| m.id).collect())
            .collect();
        for group_size in [2, 3, 100] {
            let got: Vec<Vec<String>> = cluster(&proteins, 5, 5, 0.2, group_size)
                .into_iter()
                .map(|c| c.members.into_iter().map(|m| m.id).collect())
                .collect();
            assert_eq!(got, reference);
        }
    }

    #[test]
    fn representative_pruning_drops_redundant_members() {
        let proteins = protein_map(&[
            ("g1-protein_1", SEQ_A),
            ("g2-protein_1", SEQ_B),
            ("g3-protein_1", SEQ_C),
        ]);
        let clusters = cluster(&proteins, 5, 5, 0.2, 10);
        let pruning = prune_by_representative(clusters, 0.8);
        assert_eq!(pruning.excluded, vec!["g2-protein_1".to_string()]);
        assert_eq!(pruning.singletons.len(), 2);
        assert!(pruning.clusters.is_empty());
        assert_eq!(pruning.remaining, 2);
    }

    #[test]
    fn intra_cluster_pruning_is_idempotent() {
        // Three members below the representative threshold but with two
        // of them nearly identical to each other.
        let proteins = protein_map(&[
            ("rep", "MKWLTAEQRRDFGHIKNNPQRSTVWYACDEFGHHHHHHHH"),
            ("memA", "AEQRRDFGHIKNNPQRSTVWYACDEFG"),
            ("memB", "AEQRRDFGHIKNNPQRSTVWYACDEF"),
        ]);
        let clusters = vec![Cluster {
            members: vec![
                ClusterMember {
                    id: "rep".into(),
                    length: proteins["rep"].len(),
                    similarity: 1.0,
                },
                ClusterMember {
                    id: "memA".into(),
                    length: proteins["memA"].len(),
                    similarity: 0.5,
                },
                ClusterMember {
                    id: "memB".into(),
                    length: proteins["memB"].len(),
                    similarity: 0.5,
                },
            ],
        }];
        let (pruned, excluded) = prune_intra_cluster(clusters, &proteins, 5, 0.8);
        assert_eq!(excluded, vec!["memB".to_string()]);
        assert_eq!(pruned[0].len(), 2);

        let (pruned_again, excluded_again) = prune_intra_cluster(pruned, &proteins, 5, 0.8);
        assert!(excluded_again.is_empty());
        assert_eq!(pruned_again[0].len(), 2);
    }
}
