//! Blast-Score-Ratio exclusion logic.
//!
//! BSR is an alignment's raw score divided by a reference self-alignment
//! score. Two passes share these helpers: the cluster-local pass scores
//! members against their cluster representative, and the global pass
//! scores the pooled survivors all-vs-all.

use crate::blast::AlignmentHit;
use crate::registry::id_cmp;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::io;

/// Self-alignment score per identifier, taken from the `query == subject`
/// rows of an alignment table.
pub fn self_scores(hits: &[AlignmentHit]) -> FxHashMap<String, f64> {
    let mut scores = FxHashMap::default();
    for hit in hits {
        if hit.query == hit.subject {
            scores.insert(hit.query.clone(), hit.score);
        }
    }
    scores
}

/// Cluster-local pass: members whose score against the representative,
/// relative to the representative's self-score, meets the threshold are
/// alleles of the representative's locus and leave the candidate pool.
pub fn exclude_by_representative(
    hits: &[AlignmentHit],
    representative: &str,
    threshold: f64,
) -> io::Result<Vec<String>> {
    let self_score = hits
        .iter()
        .find(|h| h.query == representative && h.subject == representative)
        .map(|h| h.score)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Missing self-alignment score for representative {}",
                    representative
                ),
            )
        })?;

    let mut excluded = Vec::new();
    for hit in hits {
        if hit.query == representative || hit.subject != representative {
            continue;
        }
        if hit.score / self_score >= threshold {
            excluded.push(hit.query.clone());
        }
    }
    excluded.sort_by(|a, b| id_cmp(a, b));
    excluded.dedup();
    Ok(excluded)
}

/// Global pass: walk every non-self pair in identifier-sorted order and,
/// when the pair's BSR meets the threshold and both members are still
/// present, drop the case-insensitively greater identifier. The fixed
/// walk order and tie-break make the surviving set independent of how
/// the alignment rows arrived.
pub fn exclude_global(
    hits: &[AlignmentHit],
    self_scores: &FxHashMap<String, f64>,
    threshold: f64,
) -> io::Result<Vec<String>> {
    let mut pairs: Vec<&AlignmentHit> = hits.iter().filter(|h| h.query != h.subject).collect();
    pairs.sort_by(|a, b| match id_cmp(&a.query, &b.query) {
        Ordering::Equal => id_cmp(&a.subject, &b.subject),
        other => other,
    });

    let mut excluded: FxHashSet<String> = FxHashSet::default();
    let mut order = Vec::new();
    for hit in pairs {
        if excluded.contains(&hit.query) || excluded.contains(&hit.subject) {
            continue;
        }
        let self_score = self_scores.get(&hit.query).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Missing self-alignment score for {}", hit.query),
            )
        })?;
        if hit.score / self_score >= threshold {
            let dropped = if id_cmp(&hit.query, &hit.subject) == Ordering::Greater {
                hit.query.clone()
            } else {
                hit.subject.clone()
            };
            if excluded.insert(dropped.clone()) {
                order.push(dropped);
            }
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(query: &str, subject: &str, score: f64) -> AlignmentHit {
        AlignmentHit {
            query: query.to_string(),
            subject: subject.to_string(),
            score,
        }
    }

    #[test]
    fn representative_pass_drops_alleles_only() {
        let hits = vec![
            hit("rep", "rep", 100.0),
            hit("memA", "rep", 80.0),
            hit("memB", "rep", 20.0),
        ];
        let excluded = exclude_by_representative(&hits, "rep", 0.6).unwrap();
        assert_eq!(excluded, vec!["memA".to_string()]);
    }

    #[test]
    fn representative_pass_requires_self_score() {
        let hits = vec![hit("memA", "rep", 80.0)];
        assert!(exclude_by_representative(&hits, "rep", 0.6).is_err());
    }

    #[test]
    fn global_pass_drops_greater_identifier() {
        let hits = vec![
            hit("locusA", "locusA", 100.0),
            hit("locusB", "locusB", 90.0),
            hit("locusA", "locusB", 70.0),
            hit("locusB", "locusA", 70.0),
        ];
        let scores = self_scores(&hits);
        let excluded = exclude_global(&hits, &scores, 0.6).unwrap();
        assert_eq!(excluded, vec!["locusB".to_string()]);
    }

    #[test]
    fn global_pass_skips_pairs_with_an_excluded_member() {
        // B is homologous to both A and C; once B is gone, the A-C link
        // through B must not cascade.
        let hits = vec![
            hit("A", "A", 100.0),
            hit("B", "B", 100.0),
            hit("C", "C", 100.0),
            hit("A", "B", 90.0),
            hit("B", "C", 90.0),
            hit("A", "C", 10.0),
        ];
        let scores = self_scores(&hits);
        let excluded = exclude_global(&hits, &scores, 0.6).unwrap();
        assert_eq!(excluded, vec!["B".to_string()]);
    }

    #[test]
    fn global_pass_below_threshold_keeps_everything() {
        let hits = vec![
            hit("A", "A", 100.0),
            hit("B", "B", 100.0),
            hit("A", "B", 30.0),
        ];
        let scores = self_scores(&hits);
        assert!(exclude_global(&hits, &scores, 0.6).unwrap().is_empty());
    }
}
