//! Versioned record arena with optimistic, per-address commits.
//!
//! Every address carries a monotonic version (0 = never written). A
//! [`StagedTransaction`] remembers the version of each address it read and
//! buffers its writes. [`RecordArena::commit`] locks only the touched
//! addresses, in address order, and applies the writes only if none of the
//! observed versions moved; otherwise the whole transaction is rejected with
//! `Conflict`. Disjoint transactions never contend on a lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use dcloud_shared::{Address, RegistryError, UserId};
use parking_lot::{Mutex, RwLock};

use crate::models::Record;

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub record: Option<Record>,
}

impl Versioned {
    fn vacant() -> Self {
        Self {
            version: 0,
            record: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    version: u64,
    record: Option<Record>,
}

/// All ledger records, keyed by deterministic address.
#[derive(Default)]
pub struct RecordArena {
    slots: RwLock<HashMap<Address, Arc<Mutex<Slot>>>>,
    by_owner: RwLock<HashMap<UserId, BTreeSet<Address>>>,
}

impl RecordArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record and version at `address`.
    pub fn get(&self, address: &Address) -> Versioned {
        let slot = self.slots.read().get(address).cloned();
        match slot {
            Some(slot) => {
                let slot = slot.lock();
                Versioned {
                    version: slot.version,
                    record: slot.record.clone(),
                }
            }
            None => Versioned::vacant(),
        }
    }

    /// Addresses of every record owned by `owner`, in address order.
    pub fn addresses_owned_by(&self, owner: &UserId) -> Vec<Address> {
        self.by_owner
            .read()
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every owner that has at least one record.
    pub fn owners(&self) -> Vec<UserId> {
        let mut owners: Vec<_> = self.by_owner.read().keys().copied().collect();
        owners.sort();
        owners
    }

    /// Number of written addresses.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().record.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start an optimistic transaction against the current state.
    pub fn begin(&self) -> StagedTransaction<'_> {
        StagedTransaction {
            arena: self,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Atomically apply `staged` if every address it read is still at the
    /// observed version.
    ///
    /// `on_validated` runs while the touched addresses are locked and after
    /// validation succeeded; if it fails nothing is written. Returns its
    /// output together with the new version of each written address.
    pub fn commit<T>(
        &self,
        staged: StagedTransaction<'_>,
        on_validated: impl FnOnce() -> Result<T, RegistryError>,
    ) -> Result<(T, Vec<(Address, u64)>), RegistryError> {
        let StagedTransaction { reads, writes, .. } = staged;

        // BTreeMap iteration gives the global lock order.
        let slots: Vec<(Address, Arc<Mutex<Slot>>)> =
            reads.keys().map(|addr| (*addr, self.slot(addr))).collect();
        let mut guards: Vec<_> = slots
            .iter()
            .map(|(addr, slot)| (*addr, slot.lock()))
            .collect();

        for (addr, guard) in &guards {
            let observed = reads.get(addr).map(|v| v.version).unwrap_or_default();
            if guard.version != observed {
                tracing::debug!(
                    address = %addr.short(),
                    observed,
                    current = guard.version,
                    "optimistic commit lost race"
                );
                return Err(RegistryError::Conflict(*addr));
            }
        }

        let output = on_validated()?;

        let mut versions = Vec::with_capacity(writes.len());
        let mut new_owners = Vec::new();
        for (addr, guard) in guards.iter_mut() {
            let addr = *addr;
            if let Some(record) = writes.get(&addr) {
                if guard.record.is_none() {
                    new_owners.push((*record.owner(), addr));
                }
                guard.record = Some(record.clone());
                guard.version += 1;
                versions.push((addr, guard.version));
            }
        }

        if !new_owners.is_empty() {
            let mut by_owner = self.by_owner.write();
            for (owner, addr) in new_owners {
                by_owner.entry(owner).or_default().insert(addr);
            }
        }

        Ok((output, versions))
    }

    fn slot(&self, address: &Address) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.read().get(address) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(*address).or_default())
    }
}

/// Reads and buffered writes of one optimistic transaction.
pub struct StagedTransaction<'a> {
    arena: &'a RecordArena,
    reads: BTreeMap<Address, Versioned>,
    writes: BTreeMap<Address, Record>,
}

impl<'a> StagedTransaction<'a> {
    /// Read through the transaction: own writes first, then the version
    /// observed on first access.
    pub fn read(&mut self, address: &Address) -> Option<Record> {
        if let Some(record) = self.writes.get(address) {
            return Some(record.clone());
        }
        let arena = self.arena;
        self.reads
            .entry(*address)
            .or_insert_with(|| arena.get(address))
            .record
            .clone()
    }

    /// Buffer a write. The address joins the read set so a concurrent
    /// writer is detected at commit.
    pub fn write(&mut self, address: Address, record: Record) {
        if !self.reads.contains_key(&address) {
            let current = self.arena.get(&address);
            self.reads.insert(address, current);
        }
        self.writes.insert(address, record);
    }

    /// Addresses this transaction will modify.
    pub fn write_set(&self) -> impl Iterator<Item = &Address> {
        self.writes.keys()
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}
