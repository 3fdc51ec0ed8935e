//! Sharded in-memory index: composite key -> (offset, on-disk size).
//!
//! Шардинг снимает глобальный mutex с горячего пути: ключ попадает в шард
//! по стабильному 64-битному хэшу (XxHash64, seed 0 — как в hash-модуле
//! по соседству по стеку). Контракт для вызывающих: таблица линеаризуема
//! per-key, не более.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Mutex;

use twox_hash::XxHash64;

use super::CompositeKey;

/// In-memory index value: where the record lives and how much disk it
/// occupies (header + payload + alignment padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamControl {
    pub offset: u64,
    pub size: u64,
}

pub struct Index {
    shards: Vec<Mutex<HashMap<CompositeKey, RamControl>>>,
}

impl Index {
    pub fn new(shards: usize) -> Self {
        let n = shards.max(1);
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(Mutex::new(HashMap::new()));
        }
        Self { shards: v }
    }

    #[inline]
    fn shard(&self, key: &CompositeKey) -> &Mutex<HashMap<CompositeKey, RamControl>> {
        let mut h = XxHash64::with_seed(0);
        h.write(key);
        let idx = (h.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn lookup(&self, key: &CompositeKey) -> Option<RamControl> {
        self.shard(key).lock().unwrap().get(key).copied()
    }

    pub fn insert_or_replace(&self, key: CompositeKey, ctl: RamControl) -> Option<RamControl> {
        self.shard(&key).lock().unwrap().insert(key, ctl)
    }

    pub fn erase(&self, key: &CompositeKey) -> Option<RamControl> {
        self.shard(key).lock().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry. Holds one shard lock at a time; entries added or
    /// removed concurrently may or may not be seen.
    pub fn for_each<F: FnMut(&CompositeKey, RamControl)>(&self, mut f: F) {
        for shard in &self.shards {
            let map = shard.lock().unwrap();
            for (k, v) in map.iter() {
                f(k, *v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{composite_key, Kind};
    use crate::consts::ID_SIZE;

    fn key(b: u8, kind: Kind) -> CompositeKey {
        let mut id = [0u8; ID_SIZE];
        id[0] = b;
        composite_key(&id, kind)
    }

    #[test]
    fn insert_lookup_erase() {
        let idx = Index::new(4);
        let k = key(1, Kind::Data);

        assert!(idx.lookup(&k).is_none());
        assert!(idx
            .insert_or_replace(k, RamControl { offset: 0, size: 96 })
            .is_none());
        assert_eq!(idx.lookup(&k).expect("present").offset, 0);

        // replace supersedes
        let prev = idx
            .insert_or_replace(k, RamControl { offset: 96, size: 96 })
            .expect("prev");
        assert_eq!(prev.offset, 0);
        assert_eq!(idx.lookup(&k).expect("present").offset, 96);
        assert_eq!(idx.len(), 1);

        // kinds are distinct keys
        let kh = key(1, Kind::History);
        idx.insert_or_replace(kh, RamControl { offset: 7, size: 1 });
        assert_eq!(idx.len(), 2);

        assert!(idx.erase(&k).is_some());
        assert!(idx.lookup(&k).is_none());
        assert!(idx.erase(&k).is_none());
    }
}
