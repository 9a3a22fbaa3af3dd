// Copyright (c) 2026, DoNet Edge Contributors.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3.
// You should have received a copy of this license along
// with this source code in a file named "LICENSE."
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

//! Per-client interest manager: tracks what zones a
//! client has asked to see, expands street zones into their
//! DNA-derived visibility groups, and works out exactly which zones
//! newly need a generate and which can be torn down when an interest
//! changes or goes away.

use crate::globals::{branch_zone, is_perma_zone, is_street_zone, DoId, Zone};
use std::collections::{HashMap, HashSet};

/// An external collaborator that expands a street's branch zone into
/// every zone visible from it (parsed from the district's DNA file).
/// DNA parsing itself is out of scope; callers supply a directory.
pub trait VisibilityDirectory: Send + Sync {
    fn visible_zones(&self, branch: Zone) -> Vec<Zone>;
}

#[derive(Debug, Clone)]
pub struct Interest {
    pub id: u16,
    pub parent: DoId,
    pub requested_zones: Vec<Zone>,
    effective_zones: HashSet<Zone>,
    branches: HashSet<Zone>,
}

/// The zones a client must generate objects for (`added`) and the
/// zones it must tear down (`removed`), as a result of one
/// add/update/remove-interest call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InterestDelta {
    pub added_zones: Vec<Zone>,
    pub removed_zones: Vec<Zone>,
}

#[derive(Default)]
pub struct InterestManager {
    interests: HashMap<u16, Interest>,
    zone_refcount: HashMap<Zone, u32>,
    branch_refcount: HashMap<Zone, u32>,
    branch_cache: HashMap<Zone, Vec<Zone>>,
    pub seen_objects: HashMap<Zone, HashSet<DoId>>,
    pub owned_objects: HashSet<DoId>,
    pub pending_objects: HashSet<DoId>,
}

impl InterestManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn expand(
        &mut self,
        zones: &[Zone],
        visibility: &dyn VisibilityDirectory,
    ) -> (HashSet<Zone>, HashSet<Zone>) {
        let mut effective = HashSet::new();
        let mut branches = HashSet::new();
        for &zone in zones {
            if is_perma_zone(zone) {
                continue;
            }
            effective.insert(zone);
            if is_street_zone(zone) {
                let branch = branch_zone(zone);
                branches.insert(branch);
                let visible = self
                    .branch_cache
                    .entry(branch)
                    .or_insert_with(|| visibility.visible_zones(branch))
                    .clone();
                effective.extend(visible);
            }
        }
        (effective, branches)
    }

    /// Adds a new interest, or updates an existing one if `id` was
    /// already registered for this client (the client is always free to
    /// replace an interest's zone set under the same id). A re-add of
    /// the identical single zone is a short-circuit no-op: it must not
    /// perturb refcounts or emit a delta, since nothing actually
    /// changed.
    pub fn add_interest(
        &mut self,
        id: u16,
        parent: DoId,
        zones: Vec<Zone>,
        visibility: &dyn VisibilityDirectory,
    ) -> InterestDelta {
        if let Some(existing) = self.interests.get(&id) {
            if zones.len() == 1 && existing.requested_zones.contains(&zones[0]) {
                return InterestDelta::default();
            }
        }

        let (new_effective, new_branches) = self.expand(&zones, visibility);
        let (old_effective, old_branches) = match self.interests.get(&id) {
            Some(existing) => (existing.effective_zones.clone(), existing.branches.clone()),
            None => (HashSet::new(), HashSet::new()),
        };

        for branch in new_branches.difference(&old_branches) {
            *self.branch_refcount.entry(*branch).or_insert(0) += 1;
        }
        for branch in old_branches.difference(&new_branches) {
            self.release_branch(*branch);
        }

        let entering: Vec<Zone> = new_effective.difference(&old_effective).copied().collect();
        let leaving: Vec<Zone> = old_effective.difference(&new_effective).copied().collect();

        let mut added_zones = Vec::new();
        for zone in entering {
            let count = self.zone_refcount.entry(zone).or_insert(0);
            *count += 1;
            if *count == 1 {
                added_zones.push(zone);
            }
        }

        let mut removed_zones = Vec::new();
        for zone in leaving {
            if self.release_zone(zone) {
                removed_zones.push(zone);
            }
        }

        self.interests.insert(
            id,
            Interest {
                id,
                parent,
                requested_zones: zones,
                effective_zones: new_effective,
                branches: new_branches,
            },
        );

        InterestDelta {
            added_zones,
            removed_zones,
        }
    }

    /// Removes an interest entirely, returning the zones that are now
    /// uncovered by any of this client's remaining interests.
    pub fn remove_interest(&mut self, id: u16) -> Vec<Zone> {
        let Some(existing) = self.interests.remove(&id) else {
            return Vec::new();
        };
        for branch in &existing.branches {
            self.release_branch(*branch);
        }
        let mut removed = Vec::new();
        for zone in existing.effective_zones {
            if self.release_zone(zone) {
                removed.push(zone);
            }
        }
        removed
    }

    fn release_branch(&mut self, branch: Zone) {
        if let Some(count) = self.branch_refcount.get_mut(&branch) {
            *count -= 1;
            if *count == 0 {
                self.branch_refcount.remove(&branch);
                self.branch_cache.remove(&branch);
            }
        }
    }

    /// Decrements a zone's refcount, returning `true` (and clearing its
    /// seen-objects bookkeeping) if no interest covers it anymore.
    fn release_zone(&mut self, zone: Zone) -> bool {
        if let Some(count) = self.zone_refcount.get_mut(&zone) {
            *count -= 1;
            if *count == 0 {
                self.zone_refcount.remove(&zone);
                self.seen_objects.remove(&zone);
                return true;
            }
        }
        false
    }

    pub fn lookup(&self, id: u16) -> Option<&Interest> {
        self.interests.get(&id)
    }

    /// All zones a given interest currently covers (after street-zone
    /// expansion), in no particular order.
    pub fn effective_zones(&self, id: u16) -> Vec<Zone> {
        self.interests
            .get(&id)
            .map(|i| i.effective_zones.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_zone_open(&self, zone: Zone) -> bool {
        self.zone_refcount.contains_key(&zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoVisibility;
    impl VisibilityDirectory for NoVisibility {
        fn visible_zones(&self, _branch: Zone) -> Vec<Zone> {
            Vec::new()
        }
    }

    struct FixedVisibility(Vec<Zone>);
    impl VisibilityDirectory for FixedVisibility {
        fn visible_zones(&self, _branch: Zone) -> Vec<Zone> {
            self.0.clone()
        }
    }

    #[test]
    fn first_add_interest_opens_every_requested_zone() {
        let mut mgr = InterestManager::new();
        let delta = mgr.add_interest(1, 100, vec![2100], &NoVisibility);
        assert_eq!(delta.added_zones, vec![2100]);
        assert!(delta.removed_zones.is_empty());
        assert!(mgr.is_zone_open(2100));
    }

    #[test]
    fn re_adding_the_same_single_zone_is_a_short_circuit_no_op() {
        let mut mgr = InterestManager::new();
        mgr.add_interest(1, 100, vec![2100], &NoVisibility);
        let delta = mgr.add_interest(1, 100, vec![2100], &NoVisibility);
        assert_eq!(delta, InterestDelta::default());
    }

    #[test]
    fn re_adding_one_zone_of_a_wider_existing_interest_does_not_kill_the_rest() {
        let mut mgr = InterestManager::new();
        mgr.add_interest(1, 100, vec![2100, 2200], &NoVisibility);
        let delta = mgr.add_interest(1, 100, vec![2100], &NoVisibility);
        assert_eq!(delta, InterestDelta::default());
        assert!(mgr.is_zone_open(2100));
        assert!(mgr.is_zone_open(2200));
    }

    #[test]
    fn updating_an_interest_kills_zones_no_longer_requested() {
        let mut mgr = InterestManager::new();
        mgr.add_interest(1, 100, vec![2100, 2200], &NoVisibility);
        let delta = mgr.add_interest(1, 100, vec![2100, 2300], &NoVisibility);
        assert_eq!(delta.added_zones, vec![2300]);
        assert_eq!(delta.removed_zones, vec![2200]);
        assert!(mgr.is_zone_open(2100));
        assert!(!mgr.is_zone_open(2200));
    }

    #[test]
    fn a_zone_shared_by_two_interests_survives_one_being_removed() {
        let mut mgr = InterestManager::new();
        mgr.add_interest(1, 100, vec![2100], &NoVisibility);
        mgr.add_interest(2, 100, vec![2100], &NoVisibility);
        let removed = mgr.remove_interest(1);
        assert!(removed.is_empty());
        assert!(mgr.is_zone_open(2100));
        let removed = mgr.remove_interest(2);
        assert_eq!(removed, vec![2100]);
        assert!(!mgr.is_zone_open(2100));
    }

    #[test]
    fn street_zones_expand_via_the_visibility_directory_and_cache_per_branch() {
        let mut mgr = InterestManager::new();
        let visibility = FixedVisibility(vec![2101, 2102]);
        let mut delta = mgr.add_interest(1, 100, vec![2150], &visibility);
        delta.added_zones.sort();
        assert_eq!(delta.added_zones, vec![2101, 2102, 2150]);
    }

    #[test]
    fn perma_zones_bypass_the_delta_pipeline() {
        let mut mgr = InterestManager::new();
        let delta = mgr.add_interest(1, 100, vec![crate::globals::OTP_ZONE_ID_MANAGEMENT], &NoVisibility);
        assert!(delta.added_zones.is_empty());
    }
}
