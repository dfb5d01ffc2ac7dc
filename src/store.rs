use dashmap::DashMap;

use crate::errors::{LedgerError, Result};
use crate::ledger::{Ledger, LedgerKey};

/// persistent keyed storage for ledger aggregates. a ledger and its payment
/// history are always read and written as one unit.
pub trait LedgerStore: Send + Sync {
    /// insert a new ledger; at most one per (student, year, term)
    fn create(&self, ledger: Ledger) -> Result<()>;

    /// current snapshot of a ledger, value plus version
    fn get(&self, key: &LedgerKey) -> Result<Ledger>;

    /// compare-and-swap write: replaces the stored ledger only if its version
    /// still equals `expected_version`, then bumps the version
    fn update(&self, ledger: Ledger, expected_version: u64) -> Result<Ledger>;

    /// snapshot of every stored ledger, for reporting and sweeps. each entry
    /// is internally consistent; the set may mix versions across ledgers.
    fn snapshot_all(&self) -> Vec<Ledger>;
}

/// in-memory store backed by a concurrent map. shards lock independently, so
/// operations on different ledger keys never contend.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    ledgers: DashMap<LedgerKey, Ledger>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            ledgers: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create(&self, ledger: Ledger) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.ledgers.entry(ledger.key.clone()) {
            Entry::Occupied(entry) => Err(LedgerError::DuplicateLedger {
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(ledger);
                Ok(())
            }
        }
    }

    fn get(&self, key: &LedgerKey) -> Result<Ledger> {
        self.ledgers
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::NotFound { key: key.clone() })
    }

    fn update(&self, mut ledger: Ledger, expected_version: u64) -> Result<Ledger> {
        let mut entry = self
            .ledgers
            .get_mut(&ledger.key)
            .ok_or_else(|| LedgerError::NotFound {
                key: ledger.key.clone(),
            })?;

        let stored = entry.value().version;
        if stored != expected_version {
            tracing::debug!(key = %ledger.key, expected = expected_version, stored, "cas conflict");
            return Err(LedgerError::Conflict {
                expected: expected_version,
                stored,
            });
        }

        ledger.version = stored + 1;
        *entry.value_mut() = ledger.clone();
        Ok(ledger)
    }

    fn snapshot_all(&self) -> Vec<Ledger> {
        self.ledgers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
