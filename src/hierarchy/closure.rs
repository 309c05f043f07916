//! Pure closure-table planning. The organization tree is stored as a
//! flattened reachability index: one row per (ancestor, descendant) pair with
//! the path length as depth, including a depth-0 self row for every node.
//! Mutations are planned here and applied transactionally by the store, so
//! ancestor/descendant queries never recurse.

use super::HierarchyError;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClosureRow {
    pub ancestor_id: Uuid,
    pub descendant_id: Uuid,
    pub depth: i32,
}

impl ClosureRow {
    pub fn new(ancestor_id: Uuid, descendant_id: Uuid, depth: i32) -> Self {
        Self {
            ancestor_id,
            descendant_id,
            depth,
        }
    }
}

/// Closure rows for a newly created organization: its self row plus one row
/// per entry of the parent's full ancestor chain (which includes the parent's
/// own self row), each one level deeper.
pub fn seed_rows(org_id: Uuid, parent_chain: &[ClosureRow]) -> Vec<ClosureRow> {
    let mut rows = vec![ClosureRow::new(org_id, org_id, 0)];
    for link in parent_chain {
        rows.push(ClosureRow::new(link.ancestor_id, org_id, link.depth + 1));
    }
    rows
}

/// Planned subtree move. `subtree_ids` is the moved organization's descendant
/// set including itself; every closure row whose descendant is in the set and
/// whose ancestor is not must be deleted (the old external ancestor links),
/// then `inserts` applied with skip-duplicates semantics.
#[derive(Debug, Clone)]
pub struct MovePlan {
    pub subtree_ids: BTreeSet<Uuid>,
    pub inserts: Vec<ClosureRow>,
}

/// Plans re-parenting `org_id` under `new_parent_id` (None makes it a root).
///
/// `subtree_rows` are the rows with `ancestor_id == org_id` (the org's
/// descendant set with depths, including its self row); `new_parent_chain`
/// are the rows with `descendant_id == new_parent_id`. The cycle check runs
/// before anything else: moving an organization under its own descendant is
/// rejected without producing a plan.
pub fn plan_move(
    org_id: Uuid,
    new_parent_id: Option<Uuid>,
    subtree_rows: &[ClosureRow],
    new_parent_chain: &[ClosureRow],
) -> Result<MovePlan, HierarchyError> {
    let mut subtree_ids: BTreeSet<Uuid> =
        subtree_rows.iter().map(|row| row.descendant_id).collect();
    subtree_ids.insert(org_id);

    if let Some(parent) = new_parent_id {
        if subtree_ids.contains(&parent) {
            return Err(HierarchyError::CycleDetected);
        }
    }

    // ancestor chain of the moved node: the new parent at depth 0, then its
    // own ancestors at their recorded depths
    let mut chain: Vec<(Uuid, i32)> = Vec::new();
    if let Some(parent) = new_parent_id {
        chain.push((parent, 0));
        for link in new_parent_chain {
            if !chain.contains(&(link.ancestor_id, link.depth)) {
                chain.push((link.ancestor_id, link.depth));
            }
        }
    }

    let mut seen: BTreeSet<(Uuid, Uuid)> = BTreeSet::new();
    let mut inserts = Vec::new();
    for (ancestor_id, chain_depth) in &chain {
        for sub in subtree_rows {
            let row = ClosureRow::new(*ancestor_id, sub.descendant_id, chain_depth + sub.depth + 1);
            if seen.insert((row.ancestor_id, row.descendant_id)) {
                inserts.push(row);
            }
        }
    }

    Ok(MovePlan {
        subtree_ids,
        inserts,
    })
}
