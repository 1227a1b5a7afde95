//! Chunk-bucketed spatial index
//!
//! A claim registers its id in every 16x16 chunk column its footprint
//! touches. Point lookups read one bucket; overlap checks read only the
//! buckets of the queried bounds. Claims spanning more than
//! [`LARGE_CLAIM_CHUNKS`] columns live in a separate list that every lookup
//! scans, so bucket count stays bounded by the size of ordinary claims. The
//! wilderness is never indexed.

use crate::model::{BlockPos, Bounds, ChunkKey, Claim, ClaimId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Claims touching more chunk columns than this skip the bucket tier
pub const LARGE_CLAIM_CHUNKS: u64 = 4096;

/// Immutable-by-convention index. Owners clone it, edit the clone and
/// publish the clone; buckets are shared between versions until touched.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    buckets: HashMap<ChunkKey, Arc<Vec<ClaimId>>>,
    large: Arc<Vec<(ClaimId, Bounds)>>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, claim: &Claim) {
        if claim.is_wilderness() {
            return;
        }
        let bounds = *claim.bounds();
        if bounds.chunk_count() > LARGE_CLAIM_CHUNKS {
            let large = Arc::make_mut(&mut self.large);
            large.retain(|(id, _)| *id != claim.id());
            large.push((claim.id(), bounds));
            return;
        }
        for chunk in bounds.chunks() {
            let bucket = self.buckets.entry(chunk).or_default();
            let ids = Arc::make_mut(bucket);
            if !ids.contains(&claim.id()) {
                ids.push(claim.id());
            }
        }
    }

    pub fn remove(&mut self, claim: &Claim) {
        if claim.is_wilderness() {
            return;
        }
        if self.large.iter().any(|(id, _)| *id == claim.id()) {
            Arc::make_mut(&mut self.large).retain(|(id, _)| *id != claim.id());
        }
        let bounds = claim.bounds();
        if bounds.chunk_count() > LARGE_CLAIM_CHUNKS {
            return;
        }
        for chunk in bounds.chunks() {
            let Some(bucket) = self.buckets.get_mut(&chunk) else {
                continue;
            };
            Arc::make_mut(bucket).retain(|id| *id != claim.id());
            if bucket.is_empty() {
                self.buckets.remove(&chunk);
            }
        }
    }

    /// Ids that may contain `pos`: the bucket holding it plus every large
    /// claim over its column
    pub fn at(&self, pos: BlockPos) -> impl Iterator<Item = ClaimId> + '_ {
        let chunk = pos.chunk();
        self.buckets
            .get(&chunk)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
            .chain(
                self.large
                    .iter()
                    .filter(move |(_, bounds)| bounds.touches_chunk(chunk))
                    .map(|(id, _)| *id),
            )
    }

    /// Ids registered in any bucket touched by `bounds`, plus large claims
    /// sharing a column with it
    pub fn candidates(&self, bounds: &Bounds) -> HashSet<ClaimId> {
        let mut ids: HashSet<ClaimId> = if bounds.chunk_count() > self.buckets.len() as u64 {
            self.buckets
                .iter()
                .filter(|(chunk, _)| bounds.touches_chunk(**chunk))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect()
        } else {
            bounds
                .chunks()
                .filter_map(|chunk| self.buckets.get(&chunk))
                .flat_map(|ids| ids.iter().copied())
                .collect()
        };
        let (low, high) = bounds.chunk_span();
        ids.extend(
            self.large
                .iter()
                .filter(|(_, other)| {
                    let (other_low, other_high) = other.chunk_span();
                    other_low.x <= high.x
                        && low.x <= other_high.x
                        && other_low.z <= high.z
                        && low.z <= other_high.z
                })
                .map(|(id, _)| *id),
        );
        ids
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Claims held outside the bucket tier
    pub fn large_count(&self) -> usize {
        self.large.len()
    }
}
