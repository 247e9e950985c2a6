//! Time-based relaxed matching for long-waiting `find` requests.
//!
//! An externally triggered batch pass. It selects unmatched `find` records
//! older than the staleness threshold and buckets them by group size alone,
//! ignoring the country / cohort / topic / availability filters of the
//! exact matcher. The pass is idempotent: its input set only shrinks as
//! records become matched, so re-running it with no new stale input forms
//! no further groups.

use chrono::{DateTime, Duration, Utc};

use crate::{
  matcher::form_groups,
  record::{ConnectionType, GroupId, GroupSize},
  store::Snapshot,
};

/// A `find` record must have waited this long before the relaxed pass
/// picks it up.
pub const STALE_AFTER_DAYS: i64 = 4;

/// Run one fallback pass over the snapshot. Returns the number of groups
/// formed.
///
/// Records with no parseable creation timestamp are treated as
/// not-yet-stale and left alone.
pub fn run(snapshot: &mut Snapshot, now: DateTime<Utc>) -> usize {
  let cutoff = now - Duration::days(STALE_AFTER_DAYS);
  let mut formed = 0;

  for size in GroupSize::ALL {
    let eligible: Vec<usize> = snapshot
      .records
      .iter()
      .enumerate()
      .filter(|(_, r)| {
        r.is_unmatched()
          && r.connection_type == ConnectionType::Find
          && r.preferred_study_setup == Some(size)
          && r.timestamp.is_some_and(|t| t < cutoff)
      })
      .map(|(i, _)| i)
      .collect();

    formed += form_groups(
      &mut snapshot.records,
      &eligible,
      size.member_count(),
      GroupId::fresh_fallback,
      now,
    );
  }

  formed
}
