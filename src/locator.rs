//! Greedy routing decision (spec.md §4.4): is `p` inside the local zone, and
//! if not, which neighbor is the best next hop?

use crate::error::CanError;
use crate::geometry::Point;
use crate::region::{Host, Region};

#[derive(Debug, Clone, PartialEq)]
pub enum Locate {
    /// The point is inside the local zone (closed test — boundary points
    /// route to self rather than bouncing to a neighbor).
    Local,
    /// Forward to this neighbor.
    Forward(Host),
}

/// Decide where a point should be serviced.
///
/// `self_host` is excluded from candidate neighbors even if it somehow
/// appears in the neighbor map, so a corrupted self-entry can never produce
/// a `Forward` decision that targets this node itself — that would send a
/// request right back to the caller and loop forever instead of failing.
///
/// Returns `RouteFailure` when the point is outside the local zone and no
/// neighbor other than self can take it.
pub fn locate(region: &Region, self_host: &Host, p: &Point) -> Result<Locate, CanError> {
    if region.zone.contains_closed(p) {
        return Ok(Locate::Local);
    }

    let candidates = region.neighbors.iter().filter(|(host, _)| *host != self_host);

    // A neighbor whose zone already contains the point wins outright.
    for (host, zone) in candidates.clone() {
        if zone.contains(p) {
            return Ok(Locate::Forward(host.clone()));
        }
    }

    // Otherwise pick the neighbor whose zone midpoint is closest to `p`.
    // Every midpoint lies inside the unit cube, so the cube's diagonal
    // (sqrt(d)) is a safe initial upper bound on the winning distance.
    let mut best_host: Option<&Host> = None;
    let mut best_dist = (region.dimension as f64).sqrt();

    for (host, zone) in candidates {
        let dist = zone.midpoint().distance(p);
        if dist < best_dist {
            best_dist = dist;
            best_host = Some(host);
        }
    }

    match best_host {
        Some(host) => Ok(Locate::Forward(host.clone())),
        None => Err(CanError::RouteFailure(format!("{:?}", p.coords))),
    }
}
