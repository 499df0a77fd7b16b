//! Shard assignment and the identity partition function.

use crate::{Error, ObjectKey};

/// Which partition of the object space this instance owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardAssignment {
    shard: u32,
    total: u32,
}

impl ShardAssignment {
    pub fn new(shard: u32, total: u32) -> Result<Self, Error> {
        if total == 0 || shard >= total {
            return Err(Error::InvalidShard { shard, total });
        }
        Ok(Self { shard, total })
    }

    pub fn unsharded() -> Self {
        Self { shard: 0, total: 1 }
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_sharded(&self) -> bool {
        self.total > 1
    }

    /// True iff `key` hashes into this shard.
    pub fn owns(&self, key: &ObjectKey) -> bool {
        !self.is_sharded() || shard_of(key, self.total) == self.shard
    }
}

impl Default for ShardAssignment {
    fn default() -> Self {
        Self::unsharded()
    }
}

/// Map an identity onto `[0, total)` using 64-bit FNV-1a over `namespace/name`.
pub fn shard_of(key: &ObjectKey, total: u32) -> u32 {
    if total <= 1 {
        return 0;
    }
    let mut h: u64 = 0xcbf29ce484222325; // 64-bit FNV-1a offset
    let ns = key.namespace.as_deref().unwrap_or("");
    for b in ns.as_bytes().iter().chain(b"/").chain(key.name.as_bytes()) {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % total as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn identities() -> Vec<ObjectKey> {
        let mut out = Vec::new();
        for ns in ["default", "kube-system", "prod", "staging"] {
            for i in 0..64 {
                out.push(ObjectKey::new(Some(ns), &format!("web-{}", i)));
            }
        }
        for i in 0..16 {
            out.push(ObjectKey::new(None, &format!("cluster-{}", i)));
        }
        out
    }

    #[test]
    fn partition_has_no_gaps_or_overlap() {
        let all = identities();
        for total in [1u32, 2, 3, 7] {
            let mut union = BTreeSet::new();
            let mut owned_total = 0usize;
            for shard in 0..total {
                let assignment = ShardAssignment::new(shard, total).unwrap();
                for key in all.iter().filter(|k| assignment.owns(k)) {
                    owned_total += 1;
                    union.insert(key.clone());
                }
            }
            assert_eq!(owned_total, all.len(), "overlap for total={}", total);
            assert_eq!(union.len(), all.len(), "gap for total={}", total);
        }
    }

    #[test]
    fn every_identity_maps_into_range() {
        for key in identities() {
            for total in [1u32, 2, 3, 7] {
                assert!(shard_of(&key, total) < total);
            }
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(ShardAssignment::new(0, 0).is_err());
        assert!(ShardAssignment::new(3, 3).is_err());
        assert!(ShardAssignment::new(2, 3).is_ok());
    }
}
