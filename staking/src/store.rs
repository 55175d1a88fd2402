//! Ordered key-value store abstraction.
//!
//! The staking engine does not own persistence; it consumes an ordered,
//! byte-keyed store with prefix iteration.  Two implementations live here:
//!
//! - [`MemStore`]: a plain `BTreeMap`, used as the committed state in tests
//!   and by hosts that keep module state in memory.
//! - [`CacheStore`]: a write-buffering overlay over any other store.  A host
//!   runs one block against a `CacheStore` and calls [`CacheStore::commit`]
//!   only when the whole block succeeded; dropping it discards every write.

use {
    crate::error::{StakingError, StakingResult},
    borsh::{BorshDeserialize, BorshSerialize},
    std::collections::BTreeMap,
};

/// Key/value pairs returned by a prefix scan, ascending by raw key bytes.
pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// Value written under pure index keys whose information lives in the key.
pub const INDEX_MARKER: &[u8] = &[1];

/// Ordered byte-keyed store.
///
/// `iter_prefix` returns a snapshot, so callers may freely mutate the store
/// while walking the result.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// All entries whose key starts with `prefix`, ascending by key bytes.
    fn iter_prefix(&self, prefix: &[u8]) -> KvPairs;

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

/// In-memory ordered store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    fn iter_prefix(&self, prefix: &[u8]) -> KvPairs {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Block-scoped write buffer.
///
/// Reads see the buffered writes layered over the parent.  Nothing reaches
/// the parent until [`commit`](Self::commit); a failed block simply drops the
/// cache, which is the whole-block rollback the host relies on.
pub struct CacheStore<'a> {
    parent: &'a mut dyn KvStore,
    /// `None` marks a buffered delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes (sets and deletes).
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Flush every buffered write into the parent store.
    pub fn commit(self) {
        let Self { parent, writes } = self;
        for (key, value) in writes {
            match value {
                Some(value) => parent.set(key, value),
                None => parent.delete(&key),
            }
        }
    }

    /// Drop every buffered write.
    pub fn discard(self) {}
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(buffered) => buffered.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn iter_prefix(&self, prefix: &[u8]) -> KvPairs {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.iter_prefix(prefix).into_iter().collect();
        for (key, value) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Borsh helpers
// ---------------------------------------------------------------------------

pub fn decode<T: BorshDeserialize>(bytes: &[u8]) -> StakingResult<T> {
    borsh::from_slice(bytes).map_err(|err| StakingError::Codec(err.to_string()))
}

pub fn encode<T: BorshSerialize>(value: &T) -> StakingResult<Vec<u8>> {
    borsh::to_vec(value).map_err(|err| StakingError::Codec(err.to_string()))
}

/// Read and decode the value under `key`, `None` when absent.
pub fn get_object<T: BorshDeserialize>(
    store: &dyn KvStore,
    key: &[u8],
) -> StakingResult<Option<T>> {
    store.get(key).map(|bytes| decode(&bytes)).transpose()
}

pub fn set_object<T: BorshSerialize>(
    store: &mut dyn KvStore,
    key: Vec<u8>,
    value: &T,
) -> StakingResult<()> {
    store.set(key, encode(value)?);
    Ok(())
}
