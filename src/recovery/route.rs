//! RouteTable — parsed ring membership, grouped by replica set.
//!
//! Записи сортируются по (group, range_start); внутри группы соседние
//! записи задают диапазоны кольца, последний диапазон заворачивается к
//! первому. Адрес, встречающийся в нескольких группах, принадлежит первой
//! по порядку таблицы (см. DESIGN.md).

use anyhow::{anyhow, Result};

use crate::blob::{Id, IdRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub start: Id,
    pub addr: String,
    pub group: u32,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    // sorted by (group, start); групповые записи лежат непрерывно
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(mut entries: Vec<RouteEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(anyhow!("empty route table"));
        }
        entries.sort_by(|a, b| (a.group, &a.start).cmp(&(b.group, &b.start)));
        entries.dedup_by(|a, b| a.group == b.group && a.start == b.start);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Distinct group ids in table order.
    pub fn groups(&self) -> Vec<u32> {
        let mut out: Vec<u32> = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.group) {
                out.push(e.group);
            }
        }
        out
    }

    pub fn group_entries(&self, group: u32) -> Vec<&RouteEntry> {
        self.entries.iter().filter(|e| e.group == group).collect()
    }

    /// The group an address belongs to: first route-table entry wins.
    pub fn group_of(&self, addr: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.addr == addr).map(|e| e.group)
    }

    /// Ranges of one ring: entry i covers [start_i, start_{i+1}), the last
    /// entry wraps around to the first start.
    pub fn ranges(&self, group: u32) -> Vec<(IdRange, RouteEntry)> {
        let ents = self.group_entries(group);
        let n = ents.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let next = ents[(i + 1) % n];
            out.push((IdRange::new(ents[i].start, next.start), ents[i].clone()));
        }
        out
    }

    /// Owner of `id` within a ring: the entry with the greatest start <= id,
    /// or the last entry when id precedes every start (wraparound).
    pub fn owner(&self, group: u32, id: &Id) -> Option<&RouteEntry> {
        let ents = self.group_entries(group);
        if ents.is_empty() {
            return None;
        }
        match ents.iter().rev().find(|e| e.start <= *id).copied() {
            Some(e) => Some(e),
            None => ents.last().copied(),
        }
    }

    /// Replica sets for dc recovery: the ring split at the union of all
    /// selected groups' boundary points; for each sub-range, one owner per
    /// group that has members.
    pub fn replica_sets(&self, groups: &[u32]) -> Vec<(IdRange, Vec<(u32, String)>)> {
        let mut bounds: Vec<Id> = Vec::new();
        for e in &self.entries {
            if groups.contains(&e.group) {
                bounds.push(e.start);
            }
        }
        bounds.sort();
        bounds.dedup();
        if bounds.is_empty() {
            return Vec::new();
        }

        let n = bounds.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let range = IdRange::new(bounds[i], bounds[(i + 1) % n]);
            let mut replicas: Vec<(u32, String)> = Vec::new();
            for &g in groups {
                if let Some(owner) = self.owner(g, &range.start) {
                    replicas.push((g, owner.addr.clone()));
                }
            }
            out.push((range, replicas));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ID_SIZE;

    fn id(b: u8) -> Id {
        let mut v = [0u8; ID_SIZE];
        v[0] = b;
        v
    }

    fn entry(b: u8, addr: &str, group: u32) -> RouteEntry {
        RouteEntry {
            start: id(b),
            addr: addr.to_string(),
            group,
        }
    }

    #[test]
    fn ranges_wrap_to_first() {
        let rt = RouteTable::new(vec![
            entry(0x80, "b:1025", 1),
            entry(0x10, "a:1025", 1),
        ])
        .expect("table");

        let ranges = rt.ranges(1);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].0, IdRange::new(id(0x10), id(0x80)));
        assert_eq!(ranges[0].1.addr, "a:1025");
        // последний диапазон заворачивается
        assert_eq!(ranges[1].0, IdRange::new(id(0x80), id(0x10)));
        assert!(ranges[1].0.is_wrapped());
    }

    #[test]
    fn owner_lookup_with_wraparound() {
        let rt = RouteTable::new(vec![
            entry(0x10, "a:1025", 1),
            entry(0x80, "b:1025", 1),
        ])
        .expect("table");

        assert_eq!(rt.owner(1, &id(0x10)).expect("own").addr, "a:1025");
        assert_eq!(rt.owner(1, &id(0x7f)).expect("own").addr, "a:1025");
        assert_eq!(rt.owner(1, &id(0x80)).expect("own").addr, "b:1025");
        assert_eq!(rt.owner(1, &id(0xff)).expect("own").addr, "b:1025");
        // id before every start belongs to the wrapped last range
        assert_eq!(rt.owner(1, &id(0x01)).expect("own").addr, "b:1025");
    }

    #[test]
    fn replica_sets_cover_all_boundaries() {
        let rt = RouteTable::new(vec![
            entry(0x10, "a:1025", 1),
            entry(0x80, "b:1025", 1),
            entry(0x40, "c:1025", 2),
        ])
        .expect("table");

        let sets = rt.replica_sets(&[1, 2]);
        assert_eq!(sets.len(), 3); // boundaries 0x10, 0x40, 0x80

        for (range, replicas) in &sets {
            assert_eq!(replicas.len(), 2, "range {:?}", range);
        }
        // range [0x40, 0x80): group1 owner a, group2 owner c
        let (_, reps) = &sets[1];
        assert!(reps.contains(&(1, "a:1025".to_string())));
        assert!(reps.contains(&(2, "c:1025".to_string())));
    }

    #[test]
    fn group_of_first_entry_wins() {
        let rt = RouteTable::new(vec![
            entry(0x10, "a:1025", 1),
            entry(0x20, "a:1025", 2),
        ])
        .expect("table");
        assert_eq!(rt.group_of("a:1025"), Some(1));
        assert_eq!(rt.group_of("missing:1"), None);
    }
}
