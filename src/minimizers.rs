//! Minimizer sketches for protein sequences.
//!
//! A sketch is the set of distinct minimizers of a sequence, where the
//! minimizer of a window is the numerically smallest packed k-mer among
//! `window` consecutive k-mers. Residues are packed 5 bits each in an
//! order-preserving way, so numeric comparison of packed k-mers matches
//! lexicographic comparison of the substrings; k <= 12 keeps a packed
//! k-mer inside a u64.

use rustc_hash::FxHashSet;

pub const MAX_K: usize = 12;

#[inline]
fn pack_residue(byte: u8) -> u64 {
    // A..Z and a..z collapse to 0..25; anything else saturates above.
    let upper = byte.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        (upper - b'A') as u64
    } else {
        31
    }
}

fn pack_kmers(seq: &str, k: usize) -> Vec<u64> {
    let bytes = seq.as_bytes();
    if bytes.len() < k {
        return Vec::new();
    }
    let mask: u64 = (1u64 << (5 * k)) - 1;
    let mut kmers = Vec::with_capacity(bytes.len() - k + 1);
    let mut packed: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        packed = ((packed << 5) | pack_residue(byte)) & mask;
        if i + 1 >= k {
            kmers.push(packed);
        }
    }
    kmers
}

/// Distinct minimizers of `seq` for k-mer size `k` and window size
/// `window` (in k-mers). Sequences shorter than `k` yield an empty
/// sketch; sequences with fewer than `window` k-mers yield the single
/// minimum over all their k-mers.
pub fn sketch(seq: &str, k: usize, window: usize) -> FxHashSet<u64> {
    debug_assert!(k >= 1 && k <= MAX_K && window >= 1);
    let kmers = pack_kmers(seq, k);
    let mut minimizers = FxHashSet::default();
    if kmers.is_empty() {
        return minimizers;
    }
    if kmers.len() <= window {
        minimizers.insert(*kmers.iter().min().unwrap());
        return minimizers;
    }

    // Slide the window reusing the previous minimum: a full rescan is only
    // needed when the old minimum falls out of the window.
    let mut min_pos = 0;
    for i in 0..window {
        if kmers[i] < kmers[min_pos] {
            min_pos = i;
        }
    }
    minimizers.insert(kmers[min_pos]);
    for start in 1..=kmers.len() - window {
        let end = start + window - 1;
        if min_pos < start {
            min_pos = start;
            for i in start..=end {
                if kmers[i] < kmers[min_pos] {
                    min_pos = i;
                }
            }
        } else if kmers[end] < kmers[min_pos] {
            min_pos = end;
        }
        minimizers.insert(kmers[min_pos]);
    }
    minimizers
}

/// Proportion of the query's minimizers found in the other sketch.
/// An empty query sketch shares nothing by definition.
pub fn shared_proportion(query: &FxHashSet<u64>, other: &FxHashSet<u64>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.iter().filter(|m| other.contains(m)).count();
    shared as f64 / query.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_preserves_order() {
        let kmers = pack_kmers("ACD", 2);
        assert_eq!(kmers.len(), 2);
        // "AC" < "CD" lexicographically, so packed values must agree.
        assert!(kmers[0] < kmers[1]);
    }

    #[test]
    fn short_sequence_has_empty_sketch() {
        assert!(sketch("MK", 5, 5).is_empty());
        assert!(sketch("", 5, 5).is_empty());
    }

    #[test]
    fn single_window_takes_global_minimum() {
        let s = sketch("MKWLT", 5, 5);
        assert_eq!(s.len(), 1);
        assert_eq!(s, sketch("MKWLT", 5, 1));
    }

    #[test]
    fn identical_sequences_share_everything() {
        let a = sketch("MKWLTAEQRRDFG", 5, 5);
        let b = sketch("MKWLTAEQRRDFG", 5, 5);
        assert!(!a.is_empty());
        assert_eq!(shared_proportion(&a, &b), 1.0);
    }

    #[test]
    fn unrelated_sequences_share_nothing() {
        let a = sketch("MKWLTAEQRRDFGHIK", 5, 5);
        let b = sketch("PPPPPPPPPPPPPPPP", 5, 5);
        assert_eq!(shared_proportion(&a, &b), 0.0);
        assert_eq!(shared_proportion(&b, &a), 0.0);
    }

    #[test]
    fn sliding_reuse_matches_naive_rescan() {
        let seq = "MKWLTAEQRRDFGHIKNNPQRSTVWYACDEFG";
        let k = 4;
        let window = 3;
        let kmers = pack_kmers(seq, k);
        let mut naive = FxHashSet::default();
        for w in kmers.windows(window) {
            naive.insert(*w.iter().min().unwrap());
        }
        assert_eq!(sketch(seq, k, window), naive);
    }
}
