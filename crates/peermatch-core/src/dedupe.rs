//! Duplicate detection at join time.
//!
//! A join request is a duplicate of an existing record when it reaches the
//! same person (matching phone or email) asking for the same thing (same
//! cohort, group size, and role). Duplicates never create a second record:
//! a matched duplicate is shown its existing group, an unmatched one its
//! queued id.

use crate::{
  record::{ConnectionType, GroupSize, Record},
  store::Snapshot,
};

/// Return the first record, in store order, that duplicates the candidate
/// join, or `None`.
pub fn find_duplicate<'a>(
  snapshot: &'a Snapshot,
  phone: &str,
  email: &str,
  cohort: &str,
  preferred_study_setup: Option<GroupSize>,
  connection_type: ConnectionType,
) -> Option<&'a Record> {
  snapshot.records.iter().find(|r| {
    (r.phone == phone || r.email == email)
      && r.cohort == cohort
      && r.preferred_study_setup == preferred_study_setup
      && r.connection_type == connection_type
  })
}
