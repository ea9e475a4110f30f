//! The visibility oracle: a pure function of (version, snapshot, CLOG).
//!
//! A version's creator being visible takes more than a timestamp
//! comparison: snapshot isolation additionally requires that the creator
//! not be concurrently active, which needs the CLOG plus the snapshot's
//! recorded active set, not a timestamp comparison alone.

use crate::clog::{Clog, TxStatus};
use crate::txn::manager::Snapshot;
use crate::types::TxId;

/// Is a version with the given `xmin`/`xmax` visible to `snapshot`, given
/// the current CLOG? `xmax == 0` means the version is still live (never
/// deleted or superseded).
pub fn is_visible(xmin: TxId, xmax: TxId, snapshot: &Snapshot, clog: &Clog) -> bool {
    if !creator_visible(xmin, snapshot, clog) {
        return false;
    }
    if xmax == 0 {
        return true;
    }
    if xmax == snapshot.tx_id {
        // Own delete/update: hide the old version from ourselves.
        return false;
    }
    // Hidden only if the deleting/updating transaction is committed and
    // itself visible; otherwise the deletion hasn't taken effect for us.
    !creator_visible(xmax, snapshot, clog)
}

/// Was `creator` both committed (or ourselves) and not concurrently active
/// at snapshot-construction time?
fn creator_visible(creator: TxId, snapshot: &Snapshot, clog: &Clog) -> bool {
    if creator == snapshot.tx_id {
        return true;
    }
    if clog.status(creator) != TxStatus::Committed {
        return false;
    }
    if creator > snapshot.tx_id {
        return false;
    }
    !snapshot.active_set.contains(&creator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn snapshot(tx_id: TxId, active: &[TxId]) -> Snapshot {
        Snapshot {
            tx_id,
            active_set: active.iter().copied().collect::<BTreeSet<_>>(),
            wall_timestamp: 0,
        }
    }

    #[test]
    fn own_uncommitted_write_is_visible() {
        let clog = Clog::new();
        clog.mark_in_progress(5);
        let snap = snapshot(5, &[]);
        assert!(is_visible(5, 0, &snap, &clog));
    }

    #[test]
    fn concurrently_active_creator_is_not_visible() {
        let clog = Clog::new();
        clog.mark_committed(3);
        let snap = snapshot(5, &[3]);
        assert!(!is_visible(3, 0, &snap, &clog));
    }

    #[test]
    fn committed_before_snapshot_and_inactive_is_visible() {
        let clog = Clog::new();
        clog.mark_committed(2);
        let snap = snapshot(5, &[]);
        assert!(is_visible(2, 0, &snap, &clog));
    }

    #[test]
    fn future_creator_is_not_visible() {
        let clog = Clog::new();
        clog.mark_committed(9);
        let snap = snapshot(5, &[]);
        assert!(!is_visible(9, 0, &snap, &clog));
    }

    #[test]
    fn deleted_by_committed_past_tx_is_hidden() {
        let clog = Clog::new();
        clog.mark_committed(1);
        clog.mark_committed(2);
        let snap = snapshot(5, &[]);
        assert!(!is_visible(1, 2, &snap, &clog));
    }

    #[test]
    fn own_delete_hides_version_for_self() {
        let clog = Clog::new();
        clog.mark_committed(1);
        clog.mark_in_progress(5);
        let snap = snapshot(5, &[]);
        assert!(!is_visible(1, 5, &snap, &clog));
    }

    #[test]
    fn delete_by_aborted_tx_does_not_hide() {
        let clog = Clog::new();
        clog.mark_committed(1);
        clog.mark_aborted(2);
        let snap = snapshot(5, &[]);
        assert!(is_visible(1, 2, &snap, &clog));
    }

    proptest::proptest! {
        /// A version created by the snapshot's own transaction is always
        /// visible to it, no matter what the CLOG says about anyone else —
        /// a transaction never has to wait on its own writes.
        #[test]
        fn own_writes_are_always_visible(tx_id in 1u64..1000, active in proptest::collection::vec(1u64..1000, 0..10)) {
            let clog = Clog::new();
            clog.mark_in_progress(tx_id);
            let snap = snapshot(tx_id, &active);
            proptest::prop_assert!(is_visible(tx_id, 0, &snap, &clog));
        }

        /// A creator in the snapshot's own active set is never visible,
        /// regardless of its eventual CLOG status — the active set was
        /// fixed at snapshot-construction time and the read must be
        /// reproducible even if that transaction commits moments later.
        #[test]
        fn concurrently_active_creators_are_never_visible(
            snapshot_tx in 10u64..1000,
            creator in 1u64..9,
        ) {
            let clog = Clog::new();
            clog.mark_committed(creator);
            let snap = snapshot(snapshot_tx, &[creator]);
            proptest::prop_assert!(!is_visible(creator, 0, &snap, &clog));
        }

        /// A creator with a transaction id greater than the snapshot's own
        /// is always in the snapshot's future and never visible, whether
        /// or not it has committed by the time this check runs.
        #[test]
        fn future_creators_are_never_visible(snapshot_tx in 1u64..500, offset in 1u64..500) {
            let creator = snapshot_tx + offset;
            let clog = Clog::new();
            clog.mark_committed(creator);
            let snap = snapshot(snapshot_tx, &[]);
            proptest::prop_assert!(!is_visible(creator, 0, &snap, &clog));
        }
    }
}
