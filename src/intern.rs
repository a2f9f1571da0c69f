//! Lock-striped interning of values keyed by byte-string names.
//! `insert_or_get` returns the address of the value for a name, installing a
//! freshly allocated one if the name is new. Values live in an arena, so
//! returned references stay valid for the whole link and concurrent callers
//! for the same name all see the same address.
//!
//! A name is hashed once; the hash picks the shard and then probes that
//! shard's table directly, so the name bytes are never rehashed.

use colosseum::sync::Arena;
use crossbeam_utils::CachePadded;
use foldhash::fast::FixedState;
use hashbrown::HashTable;
use hashbrown::hash_table::Entry;
use std::hash::BuildHasher;
use std::sync::Mutex;

/// One interned entry. Keeping the hash means table growth never has to
/// touch the name bytes again.
struct Slot<'data, V> {
    hash: u64,
    name: &'data [u8],
    value: &'data V,
}

pub(crate) struct ConcurrentInternMap<'data, V> {
    arena: &'data Arena<V>,
    shards: Box<[CachePadded<Mutex<HashTable<Slot<'data, V>>>>]>,
}

impl<'data, V> ConcurrentInternMap<'data, V> {
    pub(crate) fn new(arena: &'data Arena<V>) -> Self {
        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .next_power_of_two();

        Self {
            arena,
            shards: (0..num_shards)
                .map(|_| CachePadded::new(Mutex::new(HashTable::new())))
                .collect(),
        }
    }

    fn shard(&self, hash: u64) -> &Mutex<HashTable<Slot<'data, V>>> {
        &self.shards[hash as usize & (self.shards.len() - 1)]
    }

    /// Returns the stable address of the value for `name`, allocating one
    /// with `init` if absent. Exactly one concurrent caller's value is
    /// installed.
    pub(crate) fn insert_or_get(&self, name: &'data [u8], init: impl FnOnce() -> V) -> &'data V {
        let hash = hash_name(name);
        let mut shard = self.shard(hash).lock().unwrap();
        match shard.entry(hash, |slot| slot.name == name, |slot| slot.hash) {
            Entry::Occupied(entry) => entry.get().value,
            Entry::Vacant(entry) => {
                let value = &*self.arena.alloc(init());
                entry.insert(Slot { hash, name, value });
                value
            }
        }
    }

    pub(crate) fn get(&self, name: &[u8]) -> Option<&'data V> {
        let hash = hash_name(name);
        let shard = self.shard(hash).lock().unwrap();
        shard
            .find(hash, |slot| slot.name == name)
            .map(|slot| slot.value)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap().len())
            .sum()
    }
}

fn hash_name(name: &[u8]) -> u64 {
    FixedState::default().hash_one(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn concurrent_inserts_of_one_key_install_one_value() {
        let arena = Arena::new();
        let map = ConcurrentInternMap::new(&arena);
        let installs = AtomicUsize::new(0);
        let addresses = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let value = map.insert_or_get(b"alpha", || {
                            installs.fetch_add(1, Ordering::Relaxed);
                            7u64
                        });
                        addresses
                            .lock()
                            .unwrap()
                            .push(std::ptr::from_ref(value) as usize);
                    }
                });
            }
        });

        assert_eq!(installs.load(Ordering::Relaxed), 1);
        let addresses = addresses.into_inner().unwrap();
        assert!(addresses.iter().all(|&address| address == addresses[0]));
        assert_eq!(map.get(b"alpha"), Some(&7));
        assert_eq!(map.get(b"beta"), None);
    }

    #[test]
    fn distinct_keys_intern_distinct_values() {
        let arena = Arena::new();
        let map = ConcurrentInternMap::new(&arena);

        let a = map.insert_or_get(b"a", || 1u64);
        let b = map.insert_or_get(b"b", || 2u64);

        assert!(!std::ptr::eq(a, b));
        assert_eq!((*a, *b), (1, 2));
        assert_eq!(map.len(), 2);
    }
}
