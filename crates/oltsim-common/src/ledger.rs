//! Alloc-ID and GEM port ownership tracking.
//!
//! Controllers assign Alloc-IDs and GEM ports from per-PON pools. A resource
//! may be referenced by several flows of the same ONU, but it must never be
//! claimed by two different ONUs on the same PON at once.
//!
//! Each resource kind has its own ledger: a map from
//! `(pon, onu, port, resource_id)` to the set of flow IDs that reference it.
//! An entry only exists while at least one flow references it, so a ledger in
//! which every stored flow has been freed is empty again.

use oltsim_types::Flow;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error};

/// Composite key of one ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub pon: u32,
    pub onu: u32,
    /// UNI port number the resource was provisioned for.
    pub port: u32,
    pub resource_id: u32,
}

/// The two tracked resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AllocId,
    GemPort,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::AllocId => write!(f, "allocId"),
            ResourceKind::GemPort => write!(f, "gem"),
        }
    }
}

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("gem-{gem}-already-in-use-on-uni-{port}-onu-{onu}-flow-{flow_id}")]
    GemPortInUse {
        gem: u32,
        port: u32,
        onu: u32,
        flow_id: u64,
    },

    #[error("gem-{gem}-already-in-use-on-uni-{port}-onu-{onu}-replicated-flow-{flow_id}")]
    ReplicatedGemPortInUse {
        gem: u32,
        port: u32,
        onu: u32,
        flow_id: u64,
    },

    #[error("allocId-{alloc_id}-already-in-use-on-uni-{port}-onu-{onu}-flow-{flow_id}")]
    AllocIdInUse {
        alloc_id: u32,
        port: u32,
        onu: u32,
        flow_id: u64,
    },
}

/// The resources a single flow wants to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceClaim {
    pub flow_id: u64,
    pub pon: u32,
    pub onu: u32,
    pub port: u32,
    pub alloc_id: u32,
    pub gem_ports: Vec<u32>,
    pub replicated: bool,
}

impl ResourceClaim {
    /// Builds the claim of an ONU-scoped flow.
    ///
    /// Returns `None` for flows that bypass resource tracking (OLT-scoped
    /// or multicast flows).
    pub fn from_flow(flow: &Flow) -> Option<Self> {
        if !flow.is_onu_flow() {
            return None;
        }
        Some(Self {
            flow_id: flow.flow_id,
            pon: flow.access_intf_id?,
            onu: flow.onu_id,
            port: flow.port_no,
            alloc_id: flow.alloc_id,
            gem_ports: flow.gem_ports(),
            replicated: flow.replicate_flow,
        })
    }

    fn gem_keys(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        self.gem_ports.iter().map(|gem| ResourceKey {
            pon: self.pon,
            onu: self.onu,
            port: self.port,
            resource_id: *gem,
        })
    }

    fn alloc_key(&self) -> ResourceKey {
        ResourceKey {
            pon: self.pon,
            onu: self.onu,
            port: self.port,
            resource_id: self.alloc_id,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    entries: HashMap<ResourceKey, BTreeSet<u64>>,
}

impl Ledger {
    /// Finds an entry on `pon` that holds `resource_id` for an ONU other than `onu`.
    fn owner_elsewhere(&self, pon: u32, onu: u32, resource_id: u32) -> Option<(ResourceKey, u64)> {
        self.entries.iter().find_map(|(key, flows)| {
            if key.pon == pon && key.onu != onu && key.resource_id == resource_id {
                flows.first().map(|flow_id| (*key, *flow_id))
            } else {
                None
            }
        })
    }

    fn store(&mut self, key: ResourceKey, flow_id: u64) {
        self.entries.entry(key).or_default().insert(flow_id);
    }

    fn free(&mut self, flow_id: u64) -> usize {
        let mut freed = 0;
        self.entries.retain(|_, flows| {
            if flows.remove(&flow_id) {
                freed += 1;
            }
            !flows.is_empty()
        });
        freed
    }

    fn clear_pon(&mut self, pon: u32) {
        self.entries.retain(|key, _| key.pon != pon);
    }
}

fn check_gems(gems: &Ledger, claim: &ResourceClaim) -> Result<(), LedgerError> {
    for gem in &claim.gem_ports {
        if let Some((key, flow_id)) = gems.owner_elsewhere(claim.pon, claim.onu, *gem) {
            return Err(if claim.replicated {
                LedgerError::ReplicatedGemPortInUse {
                    gem: *gem,
                    port: key.port,
                    onu: key.onu,
                    flow_id,
                }
            } else {
                LedgerError::GemPortInUse {
                    gem: *gem,
                    port: key.port,
                    onu: key.onu,
                    flow_id,
                }
            });
        }
    }
    Ok(())
}

fn check_alloc(allocs: &Ledger, claim: &ResourceClaim) -> Result<(), LedgerError> {
    match allocs.owner_elsewhere(claim.pon, claim.onu, claim.alloc_id) {
        Some((key, flow_id)) => Err(LedgerError::AllocIdInUse {
            alloc_id: claim.alloc_id,
            port: key.port,
            onu: key.onu,
            flow_id,
        }),
        None => Ok(()),
    }
}

/// Device-wide Alloc-ID and GEM port ledgers.
///
/// # Locking
///
/// Each ledger sits behind its own read/write lock. Operations touching both
/// always lock the GEM ledger first.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    gem_ports: RwLock<Ledger>,
    alloc_ids: RwLock<Ledger>,
    activated: RwLock<HashSet<(u32, u32)>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that an ONU was activated on a PON.
    pub fn register_onu(&self, pon: u32, onu: u32) {
        self.activated.write().insert((pon, onu));
    }

    pub fn is_registered(&self, pon: u32, onu: u32) -> bool {
        self.activated.read().contains(&(pon, onu))
    }

    /// Fails if another ONU on the claim's PON holds any requested GEM port
    /// or the requested Alloc-ID. GEM ports are checked first.
    pub fn validate(&self, claim: &ResourceClaim) -> Result<(), LedgerError> {
        check_gems(&self.gem_ports.read(), claim)?;
        check_alloc(&self.alloc_ids.read(), claim)
    }

    /// Marks the claim's flow as a referencer of each of its resources.
    pub fn store(&self, claim: &ResourceClaim) {
        let mut gems = self.gem_ports.write();
        let mut allocs = self.alloc_ids.write();
        self.store_locked(&mut gems, &mut allocs, claim);
    }

    /// Validates and stores under one acquisition of both write locks.
    ///
    /// On error nothing is stored.
    pub fn claim(&self, claim: &ResourceClaim) -> Result<(), LedgerError> {
        let mut gems = self.gem_ports.write();
        let mut allocs = self.alloc_ids.write();
        check_gems(&gems, claim)?;
        check_alloc(&allocs, claim)?;
        self.store_locked(&mut gems, &mut allocs, claim);
        Ok(())
    }

    fn store_locked(
        &self,
        gems: &mut RwLockWriteGuard<'_, Ledger>,
        allocs: &mut RwLockWriteGuard<'_, Ledger>,
        claim: &ResourceClaim,
    ) {
        if !self.is_registered(claim.pon, claim.onu) {
            error!(
                pon_id = claim.pon,
                onu_id = claim.onu,
                flow_id = claim.flow_id,
                "storing resources for an ONU that was never activated"
            );
        }
        for key in claim.gem_keys() {
            gems.store(key, claim.flow_id);
        }
        allocs.store(claim.alloc_key(), claim.flow_id);
        debug!(
            pon_id = claim.pon,
            onu_id = claim.onu,
            flow_id = claim.flow_id,
            alloc_id = claim.alloc_id,
            gem_ports = ?claim.gem_ports,
            "resources stored"
        );
    }

    /// Removes `flow_id` from every entry that references it.
    ///
    /// Freeing a flow that holds nothing is a no-op.
    pub fn free(&self, flow_id: u64) {
        let gems = self.gem_ports.write().free(flow_id);
        let allocs = self.alloc_ids.write().free(flow_id);
        debug!(flow_id, gems, allocs, "resources freed");
    }

    /// Resets both ledgers and forgets every activated ONU.
    pub fn clear(&self) {
        self.gem_ports.write().entries.clear();
        self.alloc_ids.write().entries.clear();
        self.activated.write().clear();
    }

    /// Resets both ledgers for a single PON.
    pub fn clear_pon(&self, pon: u32) {
        self.gem_ports.write().clear_pon(pon);
        self.alloc_ids.write().clear_pon(pon);
        self.activated.write().retain(|(p, _)| *p != pon);
    }

    /// Number of entries in one ledger.
    pub fn len(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::AllocId => self.alloc_ids.read().entries.len(),
            ResourceKind::GemPort => self.gem_ports.read().entries.len(),
        }
    }

    /// Returns true if both ledgers are empty.
    pub fn is_empty(&self) -> bool {
        self.len(ResourceKind::AllocId) == 0 && self.len(ResourceKind::GemPort) == 0
    }

    /// Flow IDs referencing an entry, in ascending order.
    pub fn referencing_flows(&self, kind: ResourceKind, key: &ResourceKey) -> Vec<u64> {
        let ledger = match kind {
            ResourceKind::AllocId => self.alloc_ids.read(),
            ResourceKind::GemPort => self.gem_ports.read(),
        };
        ledger
            .entries
            .get(key)
            .map(|flows| flows.iter().copied().collect())
            .unwrap_or_default()
    }
}
