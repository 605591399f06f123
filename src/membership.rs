//! Compact genome-membership sets.
//!
//! Each distinct sequence tracks the genomes that contain it. With many
//! thousands of genomes the raw id lists dominate memory, so the set is
//! kept sorted and persisted as a delta-encoded string: consecutive
//! differences packed into 5-bit groups with a continuation bit, offset
//! into the printable ASCII range. The first character carries the scale
//! exponent (always 0 for integer ids, kept for format compatibility).

use std::fmt;

const CHAR_OFFSET: u32 = 63;
const CONTINUATION_BIT: u32 = 0x20;

#[derive(Debug)]
pub enum DecodeErr {
    Empty,
    TruncatedGroup,
    InvalidSymbol(char),
    NegativeDelta(i64),
}

impl fmt::Display for DecodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErr::Empty => write!(f, "Empty membership encoding"),
            DecodeErr::TruncatedGroup => write!(f, "Membership encoding ends mid-value"),
            DecodeErr::InvalidSymbol(c) => {
                write!(f, "Invalid symbol in membership encoding: {:?}", c)
            }
            DecodeErr::NegativeDelta(d) => {
                write!(f, "Membership deltas must be non-negative, got {}", d)
            }
        }
    }
}

impl std::error::Error for DecodeErr {}

/// Sorted set of genome integer ids with a compact string codec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeMembership {
    ids: Vec<u32>,
}

impl GenomeMembership {
    pub fn new() -> Self {
        GenomeMembership { ids: Vec::new() }
    }

    pub fn from_id(id: u32) -> Self {
        GenomeMembership { ids: vec![id] }
    }

    /// Insert keeping the ids sorted and distinct.
    pub fn insert(&mut self, id: u32) {
        if let Err(pos) = self.ids.binary_search(&id) {
            self.ids.insert(pos, id);
        }
    }

    pub fn merge(&mut self, other: &GenomeMembership) {
        for &id in &other.ids {
            self.insert(id);
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Encode as the scale symbol followed by one variable-length group per
    /// sorted delta. Each group holds the delta's bits five at a time, least
    /// significant first, with bit 0x20 marking continuation; every symbol
    /// is shifted by 63 into printable ASCII.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(1 + self.ids.len() * 2);
        out.push(char::from_u32(CHAR_OFFSET).unwrap());
        let mut previous = 0i64;
        for &id in &self.ids {
            let delta = id as i64 - previous;
            previous = id as i64;
            // Left shift leaves bit 0 free for the sign; sorted input keeps
            // deltas non-negative so the invert branch never fires here,
            // but the codec stays sign-complete.
            let mut value = delta << 1;
            if delta < 0 {
                value = !value;
            }
            let mut value = value as u64;
            while value >= CONTINUATION_BIT as u64 {
                let group = (CONTINUATION_BIT | (value as u32 & 0x1f)) + CHAR_OFFSET;
                out.push(char::from_u32(group).unwrap());
                value >>= 5;
            }
            out.push(char::from_u32(value as u32 + CHAR_OFFSET).unwrap());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, DecodeErr> {
        let mut chars = text.chars();
        match chars.next() {
            None => return Err(DecodeErr::Empty),
            Some(c) if c as u32 >= CHAR_OFFSET => (),
            Some(c) => return Err(DecodeErr::InvalidSymbol(c)),
        }

        let mut ids = Vec::new();
        let mut previous = 0i64;
        let mut value: u64 = 0;
        let mut shift = 0u32;
        let mut mid_value = false;
        for c in chars {
            let symbol = (c as u32)
                .checked_sub(CHAR_OFFSET)
                .ok_or(DecodeErr::InvalidSymbol(c))?;
            value |= ((symbol & 0x1f) as u64) << shift;
            shift += 5;
            mid_value = true;
            if symbol & CONTINUATION_BIT == 0 {
                let delta = if value & 1 != 0 {
                    !(value as i64) >> 1
                } else {
                    (value as i64) >> 1
                };
                if delta < 0 {
                    return Err(DecodeErr::NegativeDelta(delta));
                }
                previous += delta;
                ids.push(previous as u32);
                value = 0;
                shift = 0;
                mid_value = false;
            }
        }
        if mid_value {
            return Err(DecodeErr::TruncatedGroup);
        }
        Ok(GenomeMembership { ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_small_set() {
        let mut membership = GenomeMembership::new();
        for id in [3, 0, 7, 3, 1] {
            membership.insert(id);
        }
        assert_eq!(membership.ids(), &[0, 1, 3, 7]);
        let encoded = membership.encode();
        assert_eq!(GenomeMembership::decode(&encoded).unwrap(), membership);
    }

    #[test]
    fn round_trip_large_deltas() {
        let mut membership = GenomeMembership::new();
        for id in [0, 31, 32, 1000, 100_000, 4_000_000] {
            membership.insert(id);
        }
        let encoded = membership.encode();
        assert!(encoded.chars().all(|c| (63..127).contains(&(c as u32))));
        assert_eq!(GenomeMembership::decode(&encoded).unwrap(), membership);
    }

    #[test]
    fn single_id_encoding_is_stable() {
        // id 1 -> delta 1 -> shifted 2 -> symbol 2 + 63 = 'A'; scale '?'.
        assert_eq!(GenomeMembership::from_id(1).encode(), "?A");
        assert_eq!(GenomeMembership::new().encode(), "?");
    }

    #[test]
    fn merge_is_union() {
        let mut a = GenomeMembership::from_id(2);
        let mut b = GenomeMembership::from_id(5);
        b.insert(2);
        a.merge(&b);
        assert_eq!(a.ids(), &[2, 5]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            GenomeMembership::decode(""),
            Err(DecodeErr::Empty)
        ));
        assert!(matches!(
            GenomeMembership::decode("?\x1f"),
            Err(DecodeErr::InvalidSymbol(_))
        ));
        // A lone continuation symbol never terminates its group.
        let truncated = format!("?{}", char::from_u32(63 + 0x20).unwrap());
        assert!(matches!(
            GenomeMembership::decode(&truncated),
            Err(DecodeErr::TruncatedGroup)
        ));
    }
}
