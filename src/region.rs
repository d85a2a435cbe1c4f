//! Region: the state a single node owns — its zone, its KV store, and its
//! neighbor map — plus the operations that mutate them under a single lock
//! (spec.md §3, §4.5, §4.6 steps 1-3).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CanError;
use crate::geometry::{hash_to_point, Point, Zone};

/// Identity of a peer node: the unique key of the neighbor map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub ip: String,
    pub port: u16,
}

impl Host {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Canonical `"ip:port"` string form, used as a map key where a
    /// structural key isn't convenient (e.g. wire encoding).
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Everything transferred to a joiner when its half of a split zone is
/// handed over (spec.md §4.6 step 4).
#[derive(Debug, Clone)]
pub struct JoinTransfer {
    pub dimension: usize,
    pub redundancy: usize,
    pub zone: Zone,
    pub data: HashMap<String, String>,
    pub neighbors: HashMap<Host, Zone>,
    /// Neighbors that are no longer adjacent to the retained (pre-split)
    /// owner and must be sent a DELETE.
    pub dead_neighbors: Vec<Host>,
    /// Neighbors still adjacent to the retained owner (excluding the
    /// joiner) that must be sent a PATCH carrying `owner_new_zone`.
    pub patch_targets: Vec<Host>,
    /// The owner's zone *after* the split, to PATCH to surviving neighbors.
    pub owner_new_zone: Zone,
}

/// A node's share of the keyspace: the zone it owns, the keys that hash
/// into it, and its view of adjacent peers.
#[derive(Debug, Clone)]
pub struct Region {
    pub dimension: usize,
    pub redundancy: usize,
    pub zone: Zone,
    pub data: HashMap<String, String>,
    pub neighbors: HashMap<Host, Zone>,
}

impl Region {
    /// A freshly created solo node: the whole unit cube, no data, no
    /// neighbors.
    pub fn new(dimension: usize, redundancy: usize) -> Self {
        Self {
            dimension,
            redundancy,
            zone: Zone::unit_cube(dimension),
            data: HashMap::new(),
            neighbors: HashMap::new(),
        }
    }

    pub fn hash_key(&self, key: &str) -> Point {
        hash_to_point(key, self.dimension)
    }

    fn require_in_zone(&self, p: &Point) -> Result<(), CanError> {
        if self.zone.contains(p) {
            Ok(())
        } else {
            Err(CanError::OutOfZone)
        }
    }

    pub fn add(&mut self, p: &Point, key: &str, value: String) -> Result<(), CanError> {
        self.require_in_zone(p)?;
        if self.data.contains_key(key) {
            return Err(CanError::Exists);
        }
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    pub fn modify(&mut self, p: &Point, key: &str, value: String) -> Result<(), CanError> {
        self.require_in_zone(p)?;
        if !self.data.contains_key(key) {
            return Err(CanError::Missing);
        }
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    pub fn delete(&mut self, p: &Point, key: &str) -> Result<String, CanError> {
        self.require_in_zone(p)?;
        self.data.remove(key).ok_or(CanError::Missing)
    }

    pub fn get(&self, p: &Point, key: &str) -> Result<String, CanError> {
        self.require_in_zone(p)?;
        self.data.get(key).cloned().ok_or(CanError::Missing)
    }

    pub fn add_neighbor(&mut self, host: Host, zone: Zone) -> Result<(), CanError> {
        if self.neighbors.contains_key(&host) {
            return Err(CanError::AlreadyNeighbor);
        }
        self.neighbors.insert(host, zone);
        Ok(())
    }

    pub fn patch_neighbor(&mut self, host: &Host, zone: Zone) -> Result<(), CanError> {
        let entry = self.neighbors.get_mut(host).ok_or(CanError::UnknownNeighbor)?;
        *entry = zone;
        Ok(())
    }

    pub fn remove_neighbor(&mut self, host: &Host) -> Result<(), CanError> {
        self.neighbors.remove(host).map(|_| ()).ok_or(CanError::UnknownNeighbor)
    }

    /// Bisect this region's zone and carve off everything the joiner needs:
    /// keys whose hashed point falls in the ceded half, and the subset of
    /// this node's neighbors now adjacent to the joiner. Mutates `self` to
    /// retain only the lower half, its surviving data, and its surviving
    /// neighbors. The joiner host is also inserted into this region's own
    /// neighbor map, and `self_host` (the owner's own advertised address) is
    /// inserted into the transfer's neighbor map, so the joiner learns about
    /// the retained owner across the split face.
    ///
    /// spec.md §4.6 steps 1-3.
    pub fn split_for_join(&mut self, self_host: Host, joiner: Host) -> JoinTransfer {
        let pre_split_zone = self.zone.clone();
        let (retained, ceded) = self.zone.split();

        let mut ceded_data = HashMap::new();
        let mut retained_data = HashMap::with_capacity(self.data.len());
        for (key, value) in self.data.drain() {
            let p = hash_to_point(&key, self.dimension);
            if ceded.contains(&p) {
                ceded_data.insert(key, value);
            } else {
                retained_data.insert(key, value);
            }
        }
        self.data = retained_data;

        let mut ceded_neighbors = HashMap::new();
        let mut dead_neighbors = Vec::new();
        let mut retained_neighbors = HashMap::with_capacity(self.neighbors.len());

        for (host, zone) in self.neighbors.drain() {
            let adjacent_to_ceded = ceded.is_neighbor(&zone);
            let adjacent_to_retained = retained.is_neighbor(&zone);

            if adjacent_to_ceded {
                ceded_neighbors.insert(host.clone(), zone.clone());
            }
            if adjacent_to_retained {
                retained_neighbors.insert(host, zone);
            } else {
                dead_neighbors.push(host);
            }
        }

        // The joiner learns about the retained owner across the split face,
        // keyed by the owner's own host and its pre-split zone, per spec.md
        // §4.6 step 3 ("S adds the joiner itself ... to newNeighbors").
        ceded_neighbors.insert(self_host, pre_split_zone);

        let patch_targets: Vec<Host> = retained_neighbors.keys().cloned().collect();

        self.zone = retained;
        self.neighbors = retained_neighbors;
        self.neighbors.insert(joiner, ceded.clone());

        JoinTransfer {
            dimension: self.dimension,
            redundancy: self.redundancy,
            zone: ceded,
            data: ceded_data,
            neighbors: ceded_neighbors,
            dead_neighbors,
            patch_targets,
            owner_new_zone: self.zone.clone(),
        }
    }

    /// Replace this region wholesale with a join response's payload
    /// (spec.md §3 Lifecycle: overwritten exactly once on join).
    pub fn adopt(&mut self, transfer: JoinTransfer) {
        self.dimension = transfer.dimension;
        self.redundancy = transfer.redundancy;
        self.zone = transfer.zone;
        self.data = transfer.data;
        self.neighbors = transfer.neighbors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(region: &mut Region, key: &str, value: &str) {
        let p = region.hash_key(key);
        region.add(&p, key, value.to_string()).unwrap();
    }

    #[test]
    fn solo_add_get_delete() {
        let mut region = Region::new(2, 1);
        put(&mut region, "alpha", "1");

        let p = region.hash_key("alpha");
        assert_eq!(region.get(&p, "alpha").unwrap(), "1");
        assert_eq!(region.delete(&p, "alpha").unwrap(), "1");
        assert_eq!(region.get(&p, "alpha"), Err(CanError::Missing));
    }

    #[test]
    fn duplicate_add_fails() {
        let mut region = Region::new(2, 1);
        put(&mut region, "alpha", "1");
        let p = region.hash_key("alpha");
        assert_eq!(region.add(&p, "alpha", "2".into()), Err(CanError::Exists));
    }

    #[test]
    fn modify_requires_existing_key() {
        let mut region = Region::new(2, 1);
        let p = region.hash_key("alpha");
        assert_eq!(region.modify(&p, "alpha", "x".into()), Err(CanError::Missing));
        put(&mut region, "alpha", "1");
        region.modify(&p, "alpha", "2".into()).unwrap();
        assert_eq!(region.get(&p, "alpha").unwrap(), "2");
    }

    #[test]
    fn out_of_zone_is_rejected() {
        let mut region = Region::new(1, 1);
        // Force the region into the lower half so a point in the upper
        // half is provably out of zone.
        region.zone.hi.coords[0] = 0.5;
        let p = Point::new(vec![0.75]);
        assert_eq!(region.add(&p, "k", "v".into()), Err(CanError::OutOfZone));
    }

    #[test]
    fn split_migrates_data_and_covers_cube() {
        let mut region = Region::new(2, 1);
        // Insert a handful of keys; afterwards every key must land on
        // exactly one side of the split.
        for key in ["alpha", "bravo", "charlie", "delta", "echo"] {
            put(&mut region, key, "v");
        }

        let self_host = Host::new("127.0.0.1", 3000);
        let joiner = Host::new("127.0.0.1", 4000);
        let original_zone = region.zone.clone();
        let transfer = region.split_for_join(self_host.clone(), joiner.clone());

        // Partition property: retained ∪ ceded == original, disjoint.
        let (expect_retained, expect_ceded) = original_zone.split();
        assert_eq!(region.zone, expect_retained);
        assert_eq!(transfer.zone, expect_ceded);

        for key in ["alpha", "bravo", "charlie", "delta", "echo"] {
            let p = hash_to_point(key, 2);
            let in_retained = region.zone.contains(&p);
            let in_ceded = transfer.zone.contains(&p);
            assert!(in_retained ^ in_ceded, "key {} must land on exactly one side", key);
            if in_retained {
                assert!(region.data.contains_key(key));
            } else {
                assert!(transfer.data.contains_key(key));
            }
        }

        // The owner must now list the joiner as a neighbor, and the joiner's
        // transfer must list the owner back (never itself).
        assert!(region.neighbors.contains_key(&joiner));
        assert!(!region.neighbors.contains_key(&self_host));
        assert!(transfer.neighbors.contains_key(&self_host));
        assert!(!transfer.neighbors.contains_key(&joiner));
    }

    #[test]
    fn neighbor_lifecycle() {
        let mut region = Region::new(2, 1);
        let host = Host::new("127.0.0.1", 5000);
        let zone = Zone::unit_cube(2);

        assert_eq!(region.remove_neighbor(&host), Err(CanError::UnknownNeighbor));
        region.add_neighbor(host.clone(), zone.clone()).unwrap();
        assert_eq!(region.add_neighbor(host.clone(), zone.clone()), Err(CanError::AlreadyNeighbor));
        region.patch_neighbor(&host, zone.clone()).unwrap();
        region.remove_neighbor(&host).unwrap();
        assert_eq!(region.patch_neighbor(&host, zone), Err(CanError::UnknownNeighbor));
    }
}
