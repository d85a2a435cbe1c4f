//! Zone algebra: points, axis-aligned zones, and the deterministic
//! string-to-point hash that every node in the overlay must agree on.
//!
//! This is the keying ABI of the system (see the module-level docs in
//! `lib.rs`): two independent processes must compute byte-identical points
//! for the same key, or they will disagree about which node owns it.

use serde::{Deserialize, Serialize};

/// A point in the `d`-dimensional unit hypercube `[0,1)^d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub coords: Vec<f64>,
}

impl Point {
    pub fn new(coords: Vec<f64>) -> Self {
        Self { coords }
    }

    pub fn zero(dim: usize) -> Self {
        Self { coords: vec![0.0; dim] }
    }

    pub fn ones(dim: usize) -> Self {
        Self { coords: vec![1.0; dim] }
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(
            self.coords
                .iter()
                .zip(&other.coords)
                .map(|(a, b)| a + b)
                .collect(),
        )
    }

    pub fn sub(&self, other: &Point) -> Point {
        Point::new(
            self.coords
                .iter()
                .zip(&other.coords)
                .map(|(a, b)| a - b)
                .collect(),
        )
    }

    pub fn scale(&self, scalar: f64) -> Point {
        Point::new(self.coords.iter().map(|c| c * scalar).collect())
    }

    pub fn magnitude(&self) -> f64 {
        self.coords.iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.sub(other).magnitude()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        self.add(other).scale(0.5)
    }
}

/// 64-bit FNV-1a hash, the keying primitive behind [`hash_to_point`].
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Hash a 64-bit unsigned integer into `[0,1)` by treating it as the
/// numerator over `2^64`.
fn unit_interval(h: u64) -> f64 {
    // u64::MAX + 1 == 2^64; dividing by u64::MAX would let h == u64::MAX map
    // to exactly 1.0, which must stay inside the half-open interval.
    (h as f64) / (u64::MAX as f64 + 1.0)
}

/// Deterministically map a string key to a point in `[0,1)^d`.
///
/// Coordinate 0 is `FNV-1a(key) / 2^64`. Each subsequent coordinate rehashes
/// the shortest round-trip decimal text of the previous coordinate. Rust's
/// default `f64` `Display` already produces the shortest round-trip decimal
/// representation, matching the ABI requirement in spec.md §4.1.
pub fn hash_to_point(key: &str, dim: usize) -> Point {
    let mut coords = Vec::with_capacity(dim);
    let mut current = key.to_string();

    for _ in 0..dim {
        let h = fnv1a_64(current.as_bytes());
        let coord = unit_interval(h);
        coords.push(coord);
        current = format!("{}", coord);
    }

    Point::new(coords)
}

/// An axis-aligned rectangular zone `[lo, hi)` of the unit hypercube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub lo: Point,
    pub hi: Point,
}

impl Zone {
    /// The whole unit hypercube `[0,1)^d`.
    pub fn unit_cube(dim: usize) -> Self {
        Self {
            lo: Point::zero(dim),
            hi: Point::ones(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.lo.dim()
    }

    /// Half-open containment: `lo[i] <= p[i] < hi[i]` on every axis.
    pub fn contains(&self, p: &Point) -> bool {
        (0..self.dim()).all(|i| self.lo.coords[i] <= p.coords[i] && p.coords[i] < self.hi.coords[i])
    }

    /// Closed containment: `lo[i] <= p[i] <= hi[i]` on every axis. Used by
    /// the locator's self-test and by the corner-overlap neighbor test.
    pub fn contains_closed(&self, p: &Point) -> bool {
        (0..self.dim()).all(|i| self.lo.coords[i] <= p.coords[i] && p.coords[i] <= self.hi.coords[i])
    }

    /// `hi - lo`, the side length along every axis.
    pub fn dimensions(&self) -> Point {
        self.hi.sub(&self.lo)
    }

    pub fn midpoint(&self) -> Point {
        self.lo.midpoint(&self.hi)
    }

    /// The `2^d` corners, enumerated by treating a `d`-bit index as a
    /// per-axis choice of `lo` (bit 0) or `hi` (bit 1).
    pub fn corners(&self) -> Vec<Point> {
        let d = self.dim();
        let count = 1usize << d;
        let mut out = Vec::with_capacity(count);

        for mask in 0..count {
            let coords = (0..d)
                .map(|axis| {
                    if (mask >> axis) & 1 == 0 {
                        self.lo.coords[axis]
                    } else {
                        self.hi.coords[axis]
                    }
                })
                .collect();
            out.push(Point::new(coords));
        }

        out
    }

    /// Bisect along the longest axis (ties broken by lowest index).
    ///
    /// Returns `(retained, ceded)`: `retained` keeps the current owner's
    /// `lo` with `hi[axis]` lowered to the midpoint; `ceded` is the upper
    /// half, handed to a joiner.
    pub fn split(&self) -> (Zone, Zone) {
        let sides = self.dimensions();
        let axis = sides
            .coords
            .iter()
            .enumerate()
            .fold(0, |best, (i, &v)| if v > sides.coords[best] { i } else { best });

        let m = (self.lo.coords[axis] + self.hi.coords[axis]) / 2.0;

        let mut retained = self.clone();
        retained.hi.coords[axis] = m;

        let mut ceded = self.clone();
        ceded.lo.coords[axis] = m;

        (retained, ceded)
    }

    /// Count how many of `self`'s corners lie inside `other` (closed test).
    fn directional_border(&self, other: &Zone) -> usize {
        self.corners()
            .iter()
            .filter(|c| other.contains_closed(c))
            .count()
    }

    /// Two zones are neighbors iff they share a `(d-1)`-dimensional face.
    /// Approximated by corner overlap, correct for zones produced by
    /// recursive bisection of the unit cube (spec.md §4.3).
    pub fn is_neighbor(&self, other: &Zone) -> bool {
        let half = 1usize << (self.dim().saturating_sub(1));
        self.directional_border(other) >= half || other.directional_border(self) >= half
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_to_point("hello", 2);
        let b = hash_to_point("hello", 2);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_produces_unit_interval_coords() {
        let p = hash_to_point("zeta", 4);
        assert_eq!(p.dim(), 4);
        for c in &p.coords {
            assert!(*c >= 0.0 && *c < 1.0);
        }
    }

    #[test]
    fn different_keys_usually_differ() {
        let a = hash_to_point("alpha", 2);
        let b = hash_to_point("bravo", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn half_open_containment() {
        let z = Zone::unit_cube(2);
        assert!(z.contains(&Point::new(vec![0.0, 0.0])));
        assert!(z.contains(&Point::new(vec![0.999, 0.999])));
        assert!(!z.contains(&Point::new(vec![1.0, 0.5])));
        assert!(!z.contains(&Point::new(vec![0.5, 1.0])));
    }

    #[test]
    fn closed_containment_includes_upper_face() {
        let z = Zone::unit_cube(2);
        assert!(z.contains_closed(&Point::new(vec![1.0, 1.0])));
    }

    #[test]
    fn split_preserves_partition() {
        let z = Zone::unit_cube(2);
        let (a, b) = z.split();

        // Every corner of the original zone is in exactly one half under
        // the half-open test, except the one corner each half can never
        // contain under a half-open test on its ceded boundary.
        assert_eq!(a.lo.coords[0], z.lo.coords[0]);
        assert_eq!(b.hi.coords[0], z.hi.coords[0]);
        assert_eq!(a.hi.coords[0], b.lo.coords[0]);

        // dims unaffected axis stay identical
        assert_eq!(a.lo.coords[1], z.lo.coords[1]);
        assert_eq!(a.hi.coords[1], z.hi.coords[1]);
        assert_eq!(b.lo.coords[1], z.lo.coords[1]);
        assert_eq!(b.hi.coords[1], z.hi.coords[1]);

        let sample_low = Point::new(vec![0.1, 0.1]);
        let sample_high = Point::new(vec![0.9, 0.1]);
        assert!(a.contains(&sample_low) ^ b.contains(&sample_low));
        assert!(a.contains(&sample_high) ^ b.contains(&sample_high));
    }

    #[test]
    fn split_halves_are_neighbors() {
        let z = Zone::unit_cube(2);
        let (a, b) = z.split();
        assert!(a.is_neighbor(&b));
    }

    #[test]
    fn non_adjacent_zones_are_not_neighbors() {
        // Split twice along the same longest axis so we get three
        // non-overlapping slabs; the two outer ones should not be
        // neighbors of each other.
        let z = Zone::unit_cube(2);
        let (left, right) = z.split();
        let (left2, _middle) = left.split();
        assert!(!left2.is_neighbor(&right));
    }

    #[test]
    fn corners_count_is_two_pow_d() {
        let z = Zone::unit_cube(3);
        assert_eq!(z.corners().len(), 8);
    }
}
