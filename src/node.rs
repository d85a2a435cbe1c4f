//! `CanNode`: the process-level object. Wraps the lock-guarded [`Region`]
//! plus an outbound HTTP client, and implements everything that needs I/O:
//! forwarding a request to a neighbor, the JOIN handshake, neighbor repair
//! fan-out, self-announce, and trace collection.
//!
//! Per spec.md §9: the locator's decision (which neighbor, which zone) is
//! snapshotted under the region lock, the lock is dropped, and only then
//! does the outbound call happen. No suspension point in this module ever
//! occurs while holding the region lock.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::CanError;
use crate::geometry::Zone;
use crate::locator::{locate, Locate};
use crate::region::{Host, Region};
use crate::wire;

/// Which KV precondition an inbound `/data` request exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOp {
    Add,
    Modify,
    Get,
    Delete,
}

impl DataOp {
    fn http_method(self) -> Method {
        match self {
            DataOp::Add => Method::PUT,
            DataOp::Modify => Method::PATCH,
            DataOp::Get => Method::GET,
            DataOp::Delete => Method::DELETE,
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            DataOp::Add => "Data successfully added",
            DataOp::Modify => "Data successfully modified",
            DataOp::Get => "Data successfully retrieved",
            DataOp::Delete => "Data successfully deleted",
        }
    }
}

pub struct CanNode {
    /// This node's advertised `host:port` — what other nodes should dial to
    /// reach it. Used as the key they store us under in their neighbor map.
    pub self_host: Host,
    region: Arc<RwLock<Region>>,
    client: reqwest::Client,
}

impl CanNode {
    pub fn new(dimension: usize, redundancy: usize, self_host: Host) -> Self {
        Self {
            self_host,
            region: Arc::new(RwLock::new(Region::new(dimension, redundancy))),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds"),
        }
    }

    fn base_url(host: &Host) -> String {
        format!("http://{}:{}", host.ip, host.port)
    }

    pub async fn debug(&self) -> wire::DebugResponse {
        let region = self.region.read().await;
        wire::DebugResponse {
            dimension: region.dimension,
            redundancy: region.redundancy,
            range: (&region.zone).into(),
            data: region.data.clone(),
            neighbors: region
                .neighbors
                .iter()
                .map(|(h, z)| (h.canonical(), z.into()))
                .collect(),
        }
    }

    // ---- KV path -----------------------------------------------------

    pub async fn data_op(
        &self,
        op: DataOp,
        key: &str,
        value: Option<String>,
    ) -> Result<wire::DataResponse, CanError> {
        let p = {
            let region = self.region.read().await;
            region.hash_key(key)
        };

        let decision = {
            let region = self.region.read().await;
            locate(&region, &self.self_host, &p)?
        };

        match decision {
            Locate::Local => {
                let mut region = self.region.write().await;
                let result_value = match op {
                    DataOp::Add => {
                        region.add(&p, key, value.clone().unwrap_or_default())?;
                        value.unwrap_or_default()
                    }
                    DataOp::Modify => {
                        region.modify(&p, key, value.clone().unwrap_or_default())?;
                        value.unwrap_or_default()
                    }
                    DataOp::Get => region.get(&p, key)?,
                    DataOp::Delete => region.delete(&p, key)?,
                };
                debug!(op = ?op, %key, "serviced locally");
                Ok(wire::DataResponse {
                    key: key.to_string(),
                    data: result_value,
                    coords: p.coords,
                    message: op.success_message().to_string(),
                })
            }
            Locate::Forward(host) => {
                debug!(op = ?op, %key, %host, "forwarding data request");
                self.forward_data(&host, op, key, value).await
            }
        }
    }

    async fn forward_data(
        &self,
        host: &Host,
        op: DataOp,
        key: &str,
        value: Option<String>,
    ) -> Result<wire::DataResponse, CanError> {
        let url = match op {
            DataOp::Add | DataOp::Modify => format!("{}/data", Self::base_url(host)),
            DataOp::Get | DataOp::Delete => format!("{}/data/{}", Self::base_url(host), key),
        };

        let mut builder = self.client.request(op.http_method(), url);
        if matches!(op, DataOp::Add | DataOp::Modify) {
            builder = builder.json(&wire::DataRequest {
                key: key.to_string(),
                data: value.unwrap_or_default(),
            });
        }

        let reply: DataReplyWire = self.send(builder).await?;
        match reply {
            DataReplyWire::Success(resp) => Ok(resp),
            DataReplyWire::Failure(err) => Err(CanError::Forwarding(err.message)),
        }
    }

    // ---- JOIN ----------------------------------------------------------

    /// Handle an inbound JOIN for `key`, where `joiner` is the host that
    /// should receive the upper half of the split (spec.md §4.6).
    pub async fn handle_join(&self, key: &str, joiner: Host) -> Result<wire::JoinResponse, CanError> {
        let p = {
            let region = self.region.read().await;
            region.hash_key(key)
        };

        let decision = {
            let region = self.region.read().await;
            locate(&region, &self.self_host, &p)?
        };

        match decision {
            Locate::Local => {
                info!(%key, %joiner, "join landed here, splitting zone");
                let transfer = {
                    let mut region = self.region.write().await;
                    region.split_for_join(self.self_host.clone(), joiner.clone())
                };

                self.repair_fanout(&transfer).await;

                Ok(wire::JoinResponse::from_transfer(&transfer))
            }
            Locate::Forward(host) => {
                debug!(%key, %host, "forwarding join");
                self.forward_join(&host, key, &joiner).await
            }
        }
    }

    async fn forward_join(
        &self,
        host: &Host,
        key: &str,
        joiner: &Host,
    ) -> Result<wire::JoinResponse, CanError> {
        let url = format!("{}/join", Self::base_url(host));
        let builder = self.client.post(url).json(&wire::JoinRequest {
            key: key.to_string(),
            host: Some(joiner.canonical()),
        });
        self.send(builder).await
    }

    /// PATCH surviving neighbors with the owner's new zone, DELETE neighbors
    /// no longer adjacent. Runs after the region lock has already been
    /// released (the caller only passes the immutable transfer record).
    async fn repair_fanout(&self, transfer: &crate::region::JoinTransfer) {
        for host in &transfer.patch_targets {
            if let Err(e) = self.send_neighbor_patch(host, &transfer.owner_new_zone).await {
                warn!(%host, error = %e, "neighbor repair PATCH failed");
            }
        }
        for host in &transfer.dead_neighbors {
            if let Err(e) = self.send_neighbor_delete(host).await {
                warn!(%host, error = %e, "neighbor repair DELETE failed");
            }
        }
    }

    /// Run the join handshake as the joiner: POST /join to `bootstrap`,
    /// adopt the response wholesale, then self-announce to every neighbor
    /// it names (spec.md §4.6 joiner side).
    pub async fn join_via(&self, bootstrap: Host, key: &str) -> Result<(), CanError> {
        let url = format!("{}/join", Self::base_url(&bootstrap));
        let builder = self.client.post(url).json(&wire::JoinRequest {
            key: key.to_string(),
            host: Some(self.self_host.canonical()),
        });

        let response: wire::JoinResponse = self.send(builder).await?;
        // A neighbor map must never gain a self-entry through any path, so
        // self_host is filtered out here even though the owner-side fix
        // above should already keep it out of `response.neighbors`.
        let neighbor_hosts: Vec<Host> = response
            .neighbors
            .keys()
            .filter_map(|s| wire::parse_host(s))
            .filter(|host| *host != self.self_host)
            .collect();

        let transfer = response
            .into_transfer()
            .map_err(CanError::Malformed)?;

        {
            let mut region = self.region.write().await;
            region.adopt(transfer);
        }

        info!(neighbors = neighbor_hosts.len(), "joined overlay, self-announcing");
        for host in neighbor_hosts {
            if let Err(e) = self.send_neighbor_put(&host).await {
                warn!(%host, error = %e, "self-announce failed");
            }
        }

        Ok(())
    }

    // ---- Neighbor map (local mutation, invoked by the HTTP layer) -----

    pub async fn neighbor_add(&self, host: Host, zone: Zone) -> Result<(), CanError> {
        let mut region = self.region.write().await;
        region.add_neighbor(host, zone)
    }

    pub async fn neighbor_patch(&self, host: &Host, zone: Zone) -> Result<(), CanError> {
        let mut region = self.region.write().await;
        region.patch_neighbor(host, zone)
    }

    pub async fn neighbor_remove(&self, host: &Host) -> Result<(), CanError> {
        let mut region = self.region.write().await;
        region.remove_neighbor(host)
    }

    async fn send_neighbor_put(&self, host: &Host) -> Result<(), CanError> {
        let zone = {
            let region = self.region.read().await;
            region.zone.clone()
        };
        let url = format!("{}/neighbors", Self::base_url(host));
        let builder = self.client.put(url).json(&wire::NeighborRequest {
            port: self.self_host.port,
            range: (&zone).into(),
        });
        let _: wire::Empty = self.send(builder).await?;
        Ok(())
    }

    async fn send_neighbor_patch(&self, host: &Host, zone: &Zone) -> Result<(), CanError> {
        let url = format!("{}/neighbors", Self::base_url(host));
        let builder = self.client.patch(url).json(&wire::NeighborRequest {
            port: self.self_host.port,
            range: zone.into(),
        });
        let _: wire::Empty = self.send(builder).await?;
        Ok(())
    }

    async fn send_neighbor_delete(&self, host: &Host) -> Result<(), CanError> {
        let url = format!(
            "{}/neighbors?port={}",
            Self::base_url(host),
            self.self_host.port
        );
        let builder = self.client.delete(url);
        let _: wire::Empty = self.send(builder).await?;
        Ok(())
    }

    // ---- Trace ----------------------------------------------------------

    pub async fn handle_trace(&self, key: &str) -> Result<wire::TraceResponse, CanError> {
        let p = {
            let region = self.region.read().await;
            region.hash_key(key)
        };

        let decision = {
            let region = self.region.read().await;
            locate(&region, &self.self_host, &p)?
        };

        match decision {
            Locate::Local => Ok(wire::TraceResponse {
                route: vec![format!("dest {}", self.self_host)],
            }),
            Locate::Forward(host) => {
                let url = format!("{}/trace", Self::base_url(&host));
                let builder = self
                    .client
                    .post(&url)
                    .json(&wire::TraceRequest { key: key.to_string() });
                let mut upstream: wire::TraceResponse = self.send(builder).await?;
                upstream.route.push(format!("step {}", self.self_host));
                Ok(upstream)
            }
        }
    }

    // ---- HTTP plumbing ---------------------------------------------------

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, CanError> {
        let response = builder
            .send()
            .await
            .map_err(|e| CanError::Forwarding(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map_err(|e| CanError::Forwarding(e.to_string()))
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DataReplyWire {
    Success(wire::DataResponse),
    Failure(wire::ErrorResponse),
}
