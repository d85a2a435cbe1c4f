//! Wire schema for the HTTP surface (spec.md §6). These types are shared by
//! the inbound axum handlers (`api.rs`) and the outbound forwarding client
//! (`node.rs`), since both sides of a hop speak the same JSON.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Zone};
use crate::region::{Host, JoinTransfer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointWire {
    pub coords: Vec<f64>,
}

impl From<&Point> for PointWire {
    fn from(p: &Point) -> Self {
        Self { coords: p.coords.clone() }
    }
}

impl From<PointWire> for Point {
    fn from(p: PointWire) -> Self {
        Point::new(p.coords)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeWire {
    pub p1: PointWire,
    pub p2: PointWire,
}

impl From<&Zone> for RangeWire {
    fn from(z: &Zone) -> Self {
        Self { p1: (&z.lo).into(), p2: (&z.hi).into() }
    }
}

impl From<RangeWire> for Zone {
    fn from(r: RangeWire) -> Self {
        Zone { lo: r.p1.into(), hi: r.p2.into() }
    }
}

/// `POST /join` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub key: String,
    /// The joiner's advertised `"ip:port"`. Falls back to the transport
    /// remote address when absent, matching the original implementation's
    /// `data.ParseJoin`.
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub dimension: usize,
    pub redundancy: usize,
    pub range: RangeWire,
    pub data: HashMap<String, String>,
    pub neighbors: HashMap<String, RangeWire>,
}

impl JoinResponse {
    pub fn from_transfer(transfer: &JoinTransfer) -> Self {
        Self {
            dimension: transfer.dimension,
            redundancy: transfer.redundancy,
            range: (&transfer.zone).into(),
            data: transfer.data.clone(),
            neighbors: transfer
                .neighbors
                .iter()
                .map(|(h, z)| (h.canonical(), z.into()))
                .collect(),
        }
    }

    /// Rebuild a [`JoinTransfer`] from a wire response, for a joiner that
    /// is about to adopt it wholesale.
    pub fn into_transfer(self) -> Result<JoinTransfer, String> {
        let mut neighbors = HashMap::with_capacity(self.neighbors.len());
        for (key, zone) in self.neighbors {
            let host = parse_host(&key).ok_or_else(|| format!("bad neighbor key: {}", key))?;
            neighbors.insert(host, zone.into());
        }

        Ok(JoinTransfer {
            dimension: self.dimension,
            redundancy: self.redundancy,
            zone: self.range.into(),
            data: self.data,
            neighbors,
            dead_neighbors: Vec::new(),
            patch_targets: Vec::new(),
            owner_new_zone: Zone::unit_cube(self.dimension),
        })
    }
}

/// Parse a canonical `"ip:port"` string into a [`Host`].
pub fn parse_host(s: &str) -> Option<Host> {
    let (ip, port) = s.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(Host::new(ip, port))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugResponse {
    pub dimension: usize,
    pub redundancy: usize,
    pub range: RangeWire,
    pub data: HashMap<String, String>,
    pub neighbors: HashMap<String, RangeWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceResponse {
    pub route: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    pub key: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub key: String,
    pub data: String,
    pub coords: Vec<f64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborRequest {
    pub port: u16,
    pub range: RangeWire,
}

/// Response to a successful neighbor-map mutation: an empty JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Empty {}
