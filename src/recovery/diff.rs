//! Diff phase: кто кому и что должен переслать.
//!
//! merge_diff — попарное слияние двух сортированных стримов (local vs
//! remote). dc_diff — k-way слияние реплик с выбором победителя.
//!
//! Обе функции чистые: входы — сортированные по id массивы записей,
//! выход — инструкции на пересылку. Time-window фильтр применяется здесь:
//! ключи, чей новейший таймстемп по всем репликам меньше cutoff,
//! пропускаются целиком.

use crate::blob::Id;

use super::record::IterRecord;

/// One key the merge pass must push from the local node to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferItem {
    pub id: Id,
    pub size: u64,
    pub tsec: u64,
}

/// Transfer set for merge recovery: every local key that is absent
/// remotely, or present on both sides with a strictly newer local
/// timestamp.
pub fn merge_diff(local: &[IterRecord], remote: &[IterRecord], since: u64) -> Vec<TransferItem> {
    let mut out = Vec::new();
    let mut ri = 0usize;

    for l in local {
        while ri < remote.len() && remote[ri].id < l.id {
            ri += 1;
        }
        let newest = if ri < remote.len() && remote[ri].id == l.id {
            l.tsec.max(remote[ri].tsec)
        } else {
            l.tsec
        };
        if since > 0 && newest < since {
            continue;
        }

        let send = if ri < remote.len() && remote[ri].id == l.id {
            l.tsec > remote[ri].tsec
        } else {
            true
        };
        if send {
            out.push(TransferItem {
                id: l.id,
                size: l.size,
                tsec: l.tsec,
            });
        }
    }
    out
}

/// One dc reconciliation: read the key from the winning replica and write
/// it to every stale one. Indexes refer to the replica array passed to
/// dc_diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcTransfer {
    pub id: Id,
    pub src: usize,
    pub dst: Vec<usize>,
    pub size: u64,
    pub tsec: u64,
}

/// K-way winner diff for dc recovery.
///
/// For each id present on any replica, the winner is the replica with the
/// highest timestamp; ties break to the highest size, then the lowest node
/// address. A replica is stale when the key is absent, older than the
/// winner, or differs in size at an equal timestamp.
pub fn dc_diff(replicas: &[Vec<IterRecord>], addrs: &[String], since: u64) -> Vec<DcTransfer> {
    debug_assert_eq!(replicas.len(), addrs.len());
    let k = replicas.len();
    let mut cursors = vec![0usize; k];
    let mut out = Vec::new();

    loop {
        // smallest id across cursors
        let mut min_id: Option<Id> = None;
        for (i, cur) in cursors.iter().enumerate() {
            if *cur < replicas[i].len() {
                let id = replicas[i][*cur].id;
                min_id = Some(match min_id {
                    Some(m) if m <= id => m,
                    _ => id,
                });
            }
        }
        let Some(id) = min_id else { break };

        // collect this id's record from each replica that has it
        let mut have: Vec<(usize, IterRecord)> = Vec::with_capacity(k);
        for i in 0..k {
            let cur = cursors[i];
            if cur < replicas[i].len() && replicas[i][cur].id == id {
                have.push((i, replicas[i][cur]));
                cursors[i] += 1;
            }
        }

        let newest = have.iter().map(|(_, r)| r.tsec).max().unwrap_or(0);
        if since > 0 && newest < since {
            continue;
        }

        // winner: max (tsec, size), lowest address as the final tie-break
        let &(winner, wrec) = have
            .iter()
            .max_by(|(ai, a), (bi, b)| {
                (a.tsec, a.size)
                    .cmp(&(b.tsec, b.size))
                    .then_with(|| addrs[*bi].cmp(&addrs[*ai]))
            })
            .expect("non-empty replica set");

        let mut dst = Vec::new();
        for i in 0..k {
            if i == winner {
                continue;
            }
            match have.iter().find(|(ri, _)| *ri == i) {
                None => dst.push(i),
                Some((_, r)) => {
                    if r.tsec < wrec.tsec || (r.tsec == wrec.tsec && r.size != wrec.size) {
                        dst.push(i);
                    }
                }
            }
        }

        if !dst.is_empty() {
            out.push(DcTransfer {
                id,
                src: winner,
                dst,
                size: wrec.size,
                tsec: wrec.tsec,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ID_SIZE;

    fn rec(b: u8, tsec: u64, size: u64) -> IterRecord {
        let mut id = [0u8; ID_SIZE];
        id[0] = b;
        IterRecord {
            id,
            size,
            tsec,
            flags: 0,
        }
    }

    #[test]
    fn merge_diff_stale_local_and_missing_remote() {
        // local [(k1,t=5),(k2,t=9)], remote [(k1,t=7)] -> {k2}
        let local = vec![rec(1, 5, 10), rec(2, 9, 10)];
        let remote = vec![rec(1, 7, 10)];
        let out = merge_diff(&local, &remote, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id[0], 2);
    }

    #[test]
    fn merge_diff_newer_local_wins() {
        let local = vec![rec(1, 9, 10)];
        let remote = vec![rec(1, 7, 10)];
        let out = merge_diff(&local, &remote, 0);
        assert_eq!(out.len(), 1);

        // equal timestamps do not transfer
        let out = merge_diff(&[rec(1, 7, 10)], &[rec(1, 7, 10)], 0);
        assert!(out.is_empty());
    }

    #[test]
    fn merge_diff_time_window() {
        // newest replica timestamp below the cutoff -> skipped entirely
        let local = vec![rec(1, 5, 10), rec(2, 50, 10)];
        let remote = vec![];
        let out = merge_diff(&local, &remote, 40);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id[0], 2);

        // remote side may carry the newest stamp
        let local = vec![rec(3, 5, 10)];
        let remote = vec![rec(3, 45, 10)];
        assert!(merge_diff(&local, &remote, 40).is_empty());
    }

    #[test]
    fn dc_winner_by_ts_then_size() {
        // replicas report (k,t=3), (k,t=5), (k,t=5,size=10): winner is 3rd
        let replicas = vec![
            vec![rec(7, 3, 4)],
            vec![rec(7, 5, 4)],
            vec![rec(7, 5, 10)],
        ];
        let addrs = vec!["a:1".to_string(), "b:1".to_string(), "c:1".to_string()];
        let out = dc_diff(&replicas, &addrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].src, 2);
        assert_eq!(out[0].dst, vec![0, 1]);
    }

    #[test]
    fn dc_tie_breaks_to_lowest_address() {
        let replicas = vec![vec![rec(7, 5, 10)], vec![rec(7, 5, 10)]];
        let addrs = vec!["b:1".to_string(), "a:1".to_string()];
        let out = dc_diff(&replicas, &addrs, 0);
        // identical copies everywhere -> nothing to move
        assert!(out.is_empty());

        // missing on one replica: the lowest-address holder sources it
        let replicas = vec![vec![rec(7, 5, 10)], vec![rec(7, 5, 10)], vec![]];
        let addrs = vec!["b:1".to_string(), "a:1".to_string(), "c:1".to_string()];
        let out = dc_diff(&replicas, &addrs, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].src, 1, "lowest address wins the tie");
        assert_eq!(out[0].dst, vec![2]);
    }

    #[test]
    fn dc_interleaved_keys() {
        let replicas = vec![
            vec![rec(1, 5, 1), rec(3, 5, 1)],
            vec![rec(2, 5, 1), rec(3, 9, 1)],
        ];
        let addrs = vec!["a:1".to_string(), "b:1".to_string()];
        let out = dc_diff(&replicas, &addrs, 0);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].id[0], 1);
        assert_eq!(out[0].src, 0);
        assert_eq!(out[1].id[0], 2);
        assert_eq!(out[1].src, 1);
        assert_eq!(out[2].id[0], 3);
        assert_eq!(out[2].src, 1);
        assert_eq!(out[2].dst, vec![0]);
    }
}
