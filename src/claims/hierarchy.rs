//! World snapshot: claims, parent/child edges and the spatial index
//!
//! A snapshot is never mutated after publication. Writers derive a new one
//! with [`WorldSnapshot::with_claim`] / [`WorldSnapshot::without_claim`] and
//! swap it in whole, so the index and the hierarchy always agree.

use crate::error::IntegrityError;
use crate::model::{BlockPos, Bounds, Claim, ClaimId, ClaimType, SpatialEntity, UserId, WorldId};
use crate::spatial::SpatialIndex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    world: WorldId,
    wilderness: Arc<Claim>,
    claims: HashMap<ClaimId, Arc<Claim>>,
    /// Direct children per parent; top-level claims sit under the wilderness id
    children: HashMap<ClaimId, Vec<ClaimId>>,
    index: SpatialIndex,
}

impl WorldSnapshot {
    /// A world holding only its wilderness
    pub fn new(wilderness: Claim) -> Self {
        let wilderness = Arc::new(wilderness);
        let mut claims = HashMap::new();
        claims.insert(wilderness.id(), Arc::clone(&wilderness));
        Self {
            world: wilderness.world(),
            wilderness,
            claims,
            children: HashMap::new(),
            index: SpatialIndex::new(),
        }
    }

    /// Build from stored claims. Exactly one wilderness must be present and
    /// every parent reference must resolve without cycles.
    pub fn from_claims(world: WorldId, claims: Vec<Claim>) -> Result<Self, IntegrityError> {
        let (wild, rest): (Vec<_>, Vec<_>) = claims.into_iter().partition(Claim::is_wilderness);
        let mut wild = wild.into_iter();
        let wilderness = wild.next().ok_or(IntegrityError::MissingWilderness(world))?;
        if wild.next().is_some() {
            return Err(IntegrityError::DuplicateWilderness(world));
        }

        let mut snapshot = Self::new(wilderness);
        for claim in &rest {
            snapshot.claims.insert(claim.id(), Arc::new(claim.clone()));
        }
        for claim in &rest {
            if let Some(parent) = claim.parent()
                && !snapshot.claims.contains_key(&parent)
            {
                return Err(IntegrityError::DanglingParent {
                    claim: claim.id(),
                    parent,
                });
            }
            snapshot.parents_of(claim.id())?;
            snapshot.link(claim);
            snapshot.index.insert(claim);
        }
        Ok(snapshot)
    }

    fn parent_key(&self, claim: &Claim) -> ClaimId {
        claim.parent().unwrap_or(self.wilderness.id())
    }

    fn link(&mut self, claim: &Claim) {
        let key = self.parent_key(claim);
        let siblings = self.children.entry(key).or_default();
        if !siblings.contains(&claim.id()) {
            siblings.push(claim.id());
        }
    }

    fn unlink(&mut self, claim: &Claim) {
        let key = self.parent_key(claim);
        if let Some(siblings) = self.children.get_mut(&key) {
            siblings.retain(|id| *id != claim.id());
            if siblings.is_empty() {
                self.children.remove(&key);
            }
        }
    }

    /// New snapshot with `claim` inserted or replaced
    pub fn with_claim(&self, claim: impl Into<Arc<Claim>>) -> Result<Self, IntegrityError> {
        let claim: Arc<Claim> = claim.into();
        let mut next = self.clone();
        if let Some(parent) = claim.parent()
            && !next.claims.contains_key(&parent)
        {
            return Err(IntegrityError::DanglingParent {
                claim: claim.id(),
                parent,
            });
        }
        if let Some(old) = next.claims.get(&claim.id()).cloned() {
            next.unlink(&old);
            next.index.remove(&old);
        }
        next.claims.insert(claim.id(), Arc::clone(&claim));
        next.parents_of(claim.id())?;
        next.link(&claim);
        next.index.insert(&claim);
        Ok(next)
    }

    /// New snapshot without `id`. Children must already be gone.
    pub fn without_claim(&self, id: ClaimId) -> Self {
        let mut next = self.clone();
        if let Some(old) = next.claims.remove(&id) {
            next.unlink(&old);
            next.index.remove(&old);
            next.children.remove(&id);
        }
        next
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn wilderness(&self) -> &Arc<Claim> {
        &self.wilderness
    }

    pub fn get(&self, id: ClaimId) -> Option<&Arc<Claim>> {
        self.claims.get(&id)
    }

    /// Every claim except the wilderness
    pub fn claims(&self) -> impl Iterator<Item = &Arc<Claim>> {
        self.claims.values().filter(|c| !c.is_wilderness())
    }

    pub fn len(&self) -> usize {
        self.claims.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owned_by(&self, owner: UserId) -> impl Iterator<Item = &Arc<Claim>> {
        self.claims().filter(move |c| c.is_owner(owner))
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// The innermost claim containing `pos`, or the wilderness
    pub fn claim_at(&self, pos: BlockPos) -> &Arc<Claim> {
        self.index
            .at(pos)
            .filter_map(|id| self.claims.get(&id))
            .filter(|claim| claim.contains(pos))
            .max_by_key(|claim| self.depth(claim.id()))
            .unwrap_or(&self.wilderness)
    }

    /// Claims whose bounds intersect `bounds`. The y axis is compared only
    /// when both sides are cuboids.
    pub fn candidates_overlapping(&self, bounds: &Bounds, cuboid: bool) -> Vec<&Arc<Claim>> {
        self.index
            .candidates(bounds)
            .into_iter()
            .filter_map(|id| self.claims.get(&id))
            .filter(|claim| claim.region().intersects(bounds, cuboid && claim.is_cuboid()))
            .collect()
    }

    /// Parent claim, the wilderness for top-level claims, `None` for the wilderness
    pub fn parent(&self, id: ClaimId) -> Option<&Arc<Claim>> {
        let claim = self.claims.get(&id)?;
        if claim.is_wilderness() {
            return None;
        }
        match claim.parent() {
            Some(parent) => self.claims.get(&parent),
            None => Some(&self.wilderness),
        }
    }

    fn parents_of(&self, id: ClaimId) -> Result<Vec<&Arc<Claim>>, IntegrityError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut current = self.claims.get(&id).and_then(|c| c.parent());
        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                error!(world = %self.world, claim = %id, "Parent chain contains a cycle");
                return Err(IntegrityError::ParentCycle(id));
            }
            let Some(parent) = self.claims.get(&parent_id) else {
                return Err(IntegrityError::DanglingParent {
                    claim: id,
                    parent: parent_id,
                });
            };
            chain.push(parent);
            current = parent.parent();
        }
        Ok(chain)
    }

    /// Ancestors nearest first, excluding the wilderness. With `recursive`
    /// false only the direct parent is returned.
    pub fn get_parents(&self, id: ClaimId, recursive: bool) -> Result<Vec<Arc<Claim>>, IntegrityError> {
        let chain = self.parents_of(id)?;
        let take = if recursive { chain.len() } else { chain.len().min(1) };
        Ok(chain.into_iter().take(take).cloned().collect())
    }

    /// Children of `id` (top-level claims for the wilderness). Recursive
    /// results are in depth-first pre-order.
    pub fn get_children(&self, id: ClaimId, recursive: bool) -> Result<Vec<Arc<Claim>>, IntegrityError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_children(id, recursive, &mut seen, &mut out)?;
        Ok(out)
    }

    fn collect_children(
        &self,
        id: ClaimId,
        recursive: bool,
        seen: &mut HashSet<ClaimId>,
        out: &mut Vec<Arc<Claim>>,
    ) -> Result<(), IntegrityError> {
        let Some(children) = self.children.get(&id) else {
            return Ok(());
        };
        for child_id in children {
            if !seen.insert(*child_id) {
                error!(world = %self.world, claim = %child_id, "Child reachable twice");
                return Err(IntegrityError::ParentCycle(*child_id));
            }
            if let Some(child) = self.claims.get(child_id) {
                out.push(Arc::clone(child));
                if recursive {
                    self.collect_children(*child_id, true, seen, out)?;
                }
            }
        }
        Ok(())
    }

    pub fn has_children(&self, id: ClaimId) -> bool {
        self.children.get(&id).is_some_and(|c| !c.is_empty())
    }

    /// Depth below the wilderness (top-level claims are 1)
    pub fn depth(&self, id: ClaimId) -> usize {
        match self.claims.get(&id) {
            Some(claim) if claim.is_wilderness() => 0,
            Some(_) => self.parents_of(id).map_or(usize::MAX, |chain| chain.len() + 1),
            None => 0,
        }
    }

    /// Whether `ancestor` is a (transitive) parent of `id`
    pub fn is_parent(&self, ancestor: ClaimId, id: ClaimId) -> bool {
        if ancestor == self.wilderness.id() {
            return id != ancestor && self.claims.contains_key(&id);
        }
        self.parents_of(id)
            .map(|chain| chain.iter().any(|c| c.id() == ancestor))
            .unwrap_or(false)
    }

    /// Whether `inner` lies within `outer`'s bounds (y checked when `outer` is a cuboid)
    pub fn is_inside(&self, inner: ClaimId, outer: ClaimId) -> bool {
        match (self.claims.get(&inner), self.claims.get(&outer)) {
            (Some(_), Some(outer)) if outer.is_wilderness() => true,
            (Some(inner), Some(outer)) => outer
                .bounds()
                .contains_bounds(inner.bounds(), outer.is_cuboid()),
            _ => false,
        }
    }

    /// The claim itself if it is a town, else its nearest town ancestor
    pub fn get_town(&self, id: ClaimId) -> Option<Arc<Claim>> {
        let claim = self.claims.get(&id)?;
        if claim.is_town() {
            return Some(Arc::clone(claim));
        }
        self.parents_of(id)
            .ok()?
            .into_iter()
            .find(|c| c.is_town())
            .cloned()
    }

    pub fn is_in_town(&self, id: ClaimId) -> bool {
        self.get_town(id).is_some()
    }

    /// The claim whose expiration settings govern `id`: the nearest
    /// non-subdivision claim walking upwards
    pub fn expiration_root(&self, id: ClaimId) -> Option<Arc<Claim>> {
        let claim = self.claims.get(&id)?;
        if claim.claim_type() != ClaimType::Subdivision {
            return Some(Arc::clone(claim));
        }
        self.parents_of(id)
            .ok()?
            .into_iter()
            .find(|c| c.claim_type() != ClaimType::Subdivision)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> WorldSnapshot {
        WorldSnapshot::new(Claim::wilderness(WorldId::new()))
    }

    fn child(world: WorldId, claim_type: ClaimType, parent: Option<ClaimId>, bounds: Bounds) -> Claim {
        let mut claim = Claim::wilderness(world);
        claim.claim_type = claim_type;
        claim.parent = parent;
        claim.bounds = bounds;
        claim.owner = Some(UserId::new());
        claim
    }

    #[test]
    fn test_claim_at_prefers_deepest() {
        let snap = world();
        let town = child(snap.world(), ClaimType::Town, None, Bounds::from_coords(0, 100, 0, 10, 0, 100));
        let basic = child(snap.world(), ClaimType::Basic, Some(town.id()), Bounds::from_coords(10, 20, 0, 10, 10, 20));
        let snap = snap.with_claim(town.clone()).unwrap();
        let snap = snap.with_claim(basic.clone()).unwrap();

        assert_eq!(snap.claim_at(BlockPos::new(15, 0, 15)).id(), basic.id());
        assert_eq!(snap.claim_at(BlockPos::new(50, 0, 50)).id(), town.id());
        assert!(snap.claim_at(BlockPos::new(500, 0, 500)).is_wilderness());
        assert_eq!(snap.get_town(basic.id()).map(|t| t.id()), Some(town.id()));
        assert!(snap.is_parent(town.id(), basic.id()));
        assert!(snap.is_inside(basic.id(), town.id()));
    }

    #[test]
    fn test_children_and_parents() {
        let snap = world();
        let a = child(snap.world(), ClaimType::Basic, None, Bounds::from_coords(0, 50, 0, 10, 0, 50));
        let b = child(snap.world(), ClaimType::Subdivision, Some(a.id()), Bounds::from_coords(0, 10, 0, 10, 0, 10));
        let c = child(snap.world(), ClaimType::Subdivision, Some(b.id()), Bounds::from_coords(0, 5, 0, 10, 0, 5));
        let snap = snap.with_claim(a.clone()).unwrap();
        let snap = snap.with_claim(b.clone()).unwrap();
        let snap = snap.with_claim(c.clone()).unwrap();

        assert_eq!(snap.get_children(a.id(), false).unwrap().len(), 1);
        assert_eq!(snap.get_children(a.id(), true).unwrap().len(), 2);
        let parents = snap.get_parents(c.id(), true).unwrap();
        assert_eq!(parents.iter().map(|p| p.id()).collect::<Vec<_>>(), vec![b.id(), a.id()]);
        assert_eq!(snap.get_parents(c.id(), false).unwrap().len(), 1);
        assert_eq!(snap.expiration_root(c.id()).map(|r| r.id()), Some(a.id()));
        assert_eq!(snap.get_children(snap.wilderness().id(), false).unwrap().len(), 1);
    }

    #[test]
    fn test_without_claim_unindexes() {
        let snap = world();
        let a = child(snap.world(), ClaimType::Basic, None, Bounds::from_coords(0, 10, 0, 10, 0, 10));
        let snap = snap.with_claim(a.clone()).unwrap();
        let after = snap.without_claim(a.id());
        assert!(after.claim_at(BlockPos::new(5, 0, 5)).is_wilderness());
        assert_eq!(snap.claim_at(BlockPos::new(5, 0, 5)).id(), a.id());
        assert!(after.is_empty());
    }

    #[test]
    fn test_cycle_is_an_integrity_error() {
        let world_id = WorldId::new();
        let wild = Claim::wilderness(world_id);
        let mut a = child(world_id, ClaimType::Basic, None, Bounds::from_coords(0, 10, 0, 10, 0, 10));
        let b = child(world_id, ClaimType::Subdivision, Some(a.id()), Bounds::from_coords(0, 5, 0, 10, 0, 5));
        a.parent = Some(b.id());
        let result = WorldSnapshot::from_claims(world_id, vec![wild, a, b]);
        assert!(matches!(result, Err(IntegrityError::ParentCycle(_))));
    }

    #[test]
    fn test_dangling_parent_and_wilderness_checks() {
        let world_id = WorldId::new();
        let orphan = child(world_id, ClaimType::Subdivision, Some(ClaimId::new()), Bounds::from_coords(0, 5, 0, 5, 0, 5));
        let result = WorldSnapshot::from_claims(world_id, vec![Claim::wilderness(world_id), orphan]);
        assert!(matches!(result, Err(IntegrityError::DanglingParent { .. })));

        let result = WorldSnapshot::from_claims(world_id, vec![]);
        assert_eq!(result.unwrap_err(), IntegrityError::MissingWilderness(world_id));

        let result = WorldSnapshot::from_claims(
            world_id,
            vec![Claim::wilderness(world_id), Claim::wilderness(world_id)],
        );
        assert_eq!(result.unwrap_err(), IntegrityError::DuplicateWilderness(world_id));
    }
}
