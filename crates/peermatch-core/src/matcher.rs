//! Greedy FIFO matchers over a loaded snapshot.
//!
//! Both matchers are pure functions of the snapshot they are handed: they
//! mutate it in place and report whether anything changed, leaving the
//! commit (and any retry on conflict) to the engine. Group formation is
//! deterministic given a snapshot and its store-insertion order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  record::{ConnectionType, GroupId, Record},
  store::Snapshot,
};

/// Walk `eligible` (indices into `records`, in store order), repeatedly
/// taking the next `size` entries as a group. A bucket whose ids are not
/// pairwise distinct is resolved by skipping one entry and retrying; this
/// guards against inconsistent snapshots. Leftovers stay queued.
///
/// Returns the number of groups formed.
pub(crate) fn form_groups(
  records: &mut [Record],
  eligible: &[usize],
  size: usize,
  new_group_id: fn() -> GroupId,
  now: DateTime<Utc>,
) -> usize {
  let mut queue = eligible;
  let mut formed = 0;

  while queue.len() >= size {
    let bucket = &queue[..size];
    let distinct: HashSet<Uuid> =
      bucket.iter().map(|&i| records[i].id).collect();
    if distinct.len() < size {
      queue = &queue[1..];
      continue;
    }

    let group_id = new_group_id();
    for &i in bucket {
      records[i].mark_matched(group_id.clone(), now);
    }
    formed += 1;
    queue = &queue[size..];
  }

  formed
}

/// Form exact-criteria groups around a `find` target.
///
/// Eligibility: unmatched `find` records with the target's country, cohort,
/// topic module, and group size, whose availability is compatible with the
/// target's. The whole eligible set (the target included) is bucketed
/// greedily; several groups may form in one pass.
///
/// Returns the number of groups formed. A target without a group size
/// forms nothing; the engine rejects that case up front.
pub fn match_find_groups(
  snapshot: &mut Snapshot,
  target: &Record,
  now: DateTime<Utc>,
) -> usize {
  let Some(size) = target.preferred_study_setup else {
    return 0;
  };

  let eligible: Vec<usize> = snapshot
    .records
    .iter()
    .enumerate()
    .filter(|(_, r)| {
      r.is_unmatched()
        && r.connection_type == ConnectionType::Find
        && r.country == target.country
        && r.cohort == target.cohort
        && r.topic_module == target.topic_module
        && r.preferred_study_setup == Some(size)
        && r.availability.compatible_with(&target.availability)
    })
    .map(|(i, _)| i)
    .collect();

  form_groups(
    &mut snapshot.records,
    &eligible,
    size.member_count(),
    GroupId::fresh,
    now,
  )
}

/// Pair an `offer`/`need` target with the first unmatched opposite-role
/// record (same country and cohort, compatible availability) in store
/// order. At most one pair forms per invocation.
///
/// Returns `true` if a pair was formed.
pub fn match_pair(
  snapshot: &mut Snapshot,
  target: &Record,
  now: DateTime<Utc>,
) -> bool {
  let Some(opposite) = target.connection_type.opposite() else {
    return false;
  };

  let candidate = snapshot.records.iter().position(|r| {
    r.is_unmatched()
      && r.connection_type == opposite
      && r.country == target.country
      && r.cohort == target.cohort
      && r.availability.compatible_with(&target.availability)
  });
  let Some(candidate) = candidate else {
    return false;
  };

  let group_id = GroupId::fresh();
  snapshot.records[candidate].mark_matched(group_id.clone(), now);
  if let Some(t) = snapshot.find_mut(target.id) {
    t.mark_matched(group_id, now);
  }
  true
}
