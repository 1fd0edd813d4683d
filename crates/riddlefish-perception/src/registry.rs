//! [`IdentityRegistry`] – in-memory list of known visitors.
//!
//! Matching is deliberately first-match: identities are scanned in insertion
//! order and the first one within `threshold` (Euclidean distance, inclusive)
//! wins, even if a later identity would be closer.

use riddlefish_types::Identity;

/// Euclidean distance between two encodings.  Encodings of different length
/// never match and report `f32::INFINITY`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Known identities in insertion order.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    identities: Vec<Identity>,
    threshold: f32,
}

impl IdentityRegistry {
    pub fn new(threshold: f32) -> Self {
        Self {
            identities: Vec::new(),
            threshold,
        }
    }

    /// Registry pre-filled with `identities`, keeping their order.
    /// Identities without an encoding are skipped.
    pub fn with_identities(threshold: f32, identities: Vec<Identity>) -> Self {
        Self {
            identities: identities.into_iter().filter(Identity::is_matchable).collect(),
            threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// First identity whose distance to `encoding` is `<= threshold`.
    pub fn find_match(&self, encoding: &[f32]) -> Option<&Identity> {
        self.identities
            .iter()
            .find(|known| euclidean_distance(&known.encoding, encoding) <= self.threshold)
    }

    /// Append a new identity.  Identities without an encoding are ignored and
    /// `false` is returned.
    pub fn insert(&mut self, identity: Identity) -> bool {
        if !identity.is_matchable() {
            return false;
        }
        self.identities.push(identity);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riddlefish_types::Attributes;

    fn identity(encoding: Vec<f32>) -> Identity {
        Identity::new(
            Attributes {
                age_bucket: "(25-32)".into(),
                confidence: 0.9,
            },
            encoding,
        )
    }

    #[test]
    fn distance_basics() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0], &[1.0, 2.0]), f32::INFINITY);
    }

    #[test]
    fn empty_registry_matches_nothing() {
        let reg = IdentityRegistry::new(0.6);
        assert!(reg.is_empty());
        assert!(reg.find_match(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn first_match_wins_over_closer_later_match() {
        let far_but_first = identity(vec![0.5, 0.0]);
        let exact_but_second = identity(vec![0.0, 0.0]);
        let reg = IdentityRegistry::with_identities(
            0.6,
            vec![far_but_first.clone(), exact_but_second],
        );
        assert_eq!(reg.find_match(&[0.0, 0.0]).unwrap().id, far_but_first.id);
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut reg = IdentityRegistry::new(0.5);
        let known = identity(vec![0.0, 0.0]);
        reg.insert(known.clone());
        assert_eq!(reg.find_match(&[0.5, 0.0]).unwrap().id, known.id);
        assert!(reg.find_match(&[0.75, 0.0]).is_none());
    }

    #[test]
    fn unencoded_identities_never_match() {
        let mut reg = IdentityRegistry::with_identities(0.6, vec![identity(vec![])]);
        assert!(reg.is_empty());
        assert!(!reg.insert(identity(vec![])));
        assert!(reg.insert(identity(vec![1.0])));
        assert_eq!(reg.len(), 1);
    }
}
