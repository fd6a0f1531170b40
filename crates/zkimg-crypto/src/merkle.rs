//! # Binary Merkle Fold
//!
//! Folds an ordered list of leaves (tile result commitments) into a single
//! root with [`node_hash`](crate::poseidon::node_hash).
//!
//! ## Odd levels
//!
//! When a level has an odd number of nodes the last one is promoted to the
//! next level unchanged. It is never paired with a padding zero, so the
//! tree over `[a, b, c]` is `H(H(a, b), c)`. A single leaf is its own root.
//!
//! Order matters: callers must supply leaves sorted by tile index.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::field::FieldElement;
use crate::poseidon::NodeHasher;

/// Every level of a folded tree, leaves first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<FieldElement>>,
}

/// One step of an inclusion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", content = "hash", rename_all = "snake_case")]
pub enum PathStep {
    /// Sibling sits to the left of the running hash.
    Left(FieldElement),
    /// Sibling sits to the right of the running hash.
    Right(FieldElement),
    /// Node had no sibling at this level and was promoted.
    Promoted,
}

impl MerkleTree {
    /// Build the tree. Fails on an empty leaf list.
    pub fn build(leaves: &[FieldElement]) -> Result<Self, CryptoError> {
        if leaves.is_empty() {
            return Err(CryptoError::Merkle("cannot fold an empty leaf set".into()));
        }
        let mut hasher = NodeHasher::new()?;
        let mut levels = vec![leaves.to_vec()];
        while levels.last().map_or(0, Vec::len) > 1 {
            let current = &levels[levels.len() - 1];
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut pairs = current.chunks_exact(2);
            for pair in pairs.by_ref() {
                next.push(hasher.hash(&pair[0], &pair[1])?);
            }
            if let [single] = pairs.remainder() {
                next.push(*single);
            }
            levels.push(next);
        }
        Ok(Self { levels })
    }

    pub fn root(&self) -> FieldElement {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(FieldElement::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Inclusion path for leaf `index`, bottom-up.
    pub fn path(&self, index: usize) -> Result<Vec<PathStep>, CryptoError> {
        if index >= self.leaf_count() {
            return Err(CryptoError::Merkle(format!(
                "leaf index {index} out of range for {} leaves",
                self.leaf_count()
            )));
        }
        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if i % 2 == 1 {
                PathStep::Left(level[i - 1])
            } else if i + 1 < level.len() {
                PathStep::Right(level[i + 1])
            } else {
                PathStep::Promoted
            };
            steps.push(step);
            i /= 2;
        }
        Ok(steps)
    }
}

/// Root over `leaves`.
pub fn merkle_root(leaves: &[FieldElement]) -> Result<FieldElement, CryptoError> {
    MerkleTree::build(leaves).map(|t| t.root())
}

/// Recompute a root from a leaf and its inclusion path.
pub fn root_from_path(leaf: &FieldElement, path: &[PathStep]) -> Result<FieldElement, CryptoError> {
    let mut hasher = NodeHasher::new()?;
    let mut acc = *leaf;
    for step in path {
        acc = match step {
            PathStep::Left(sibling) => hasher.hash(sibling, &acc)?,
            PathStep::Right(sibling) => hasher.hash(&acc, sibling)?,
            PathStep::Promoted => acc,
        };
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poseidon::node_hash;

    fn leaves(n: u64) -> Vec<FieldElement> {
        (1..=n).map(FieldElement::from_u64).collect()
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l).unwrap(), l[0]);
    }

    #[test]
    fn empty_is_an_error() {
        assert!(matches!(merkle_root(&[]), Err(CryptoError::Merkle(_))));
    }

    #[test]
    fn odd_node_is_promoted_not_padded() {
        let l = leaves(3);
        let expected = node_hash(&node_hash(&l[0], &l[1]).unwrap(), &l[2]).unwrap();
        assert_eq!(merkle_root(&l).unwrap(), expected);
        let padded = node_hash(
            &node_hash(&l[0], &l[1]).unwrap(),
            &node_hash(&l[2], &FieldElement::ZERO).unwrap(),
        )
        .unwrap();
        assert_ne!(merkle_root(&l).unwrap(), padded);
    }

    #[test]
    fn five_leaves_fold_as_documented() {
        let l = leaves(5);
        let ab = node_hash(&l[0], &l[1]).unwrap();
        let cd = node_hash(&l[2], &l[3]).unwrap();
        let expected = node_hash(&node_hash(&ab, &cd).unwrap(), &l[4]).unwrap();
        assert_eq!(merkle_root(&l).unwrap(), expected);
    }

    #[test]
    fn order_matters() {
        let mut l = leaves(4);
        let root = merkle_root(&l).unwrap();
        l.swap(0, 3);
        assert_ne!(merkle_root(&l).unwrap(), root);
    }

    #[test]
    fn every_path_reproduces_the_root() {
        for n in 1..=9 {
            let l = leaves(n);
            let tree = MerkleTree::build(&l).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let path = tree.path(i).unwrap();
                assert_eq!(root_from_path(leaf, &path).unwrap(), tree.root(), "n={n} i={i}");
            }
            assert!(tree.path(l.len()).is_err());
        }
    }
}
