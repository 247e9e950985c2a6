//! Record fixtures shared by the unit tests in this crate.

use chrono::Utc;
use uuid::Uuid;

use crate::record::{
  Availability, ConnectionType, GroupSize, Record,
};

/// An unmatched `find` record with fresh identity fields.
pub fn find_record(
  country: &str,
  cohort: &str,
  topic_module: &str,
  availability: &str,
  size: GroupSize,
) -> Record {
  let id = Uuid::new_v4();
  Record {
    id,
    name:                  format!("user-{id}"),
    phone:                 format!("+23480{}", &id.simple().to_string()[..8]),
    email:                 format!("{id}@example.com"),
    country:               country.into(),
    language:              "English".into(),
    cohort:                cohort.into(),
    topic_module:          topic_module.into(),
    learning_preferences:  "Visual".into(),
    availability:          Availability::new(availability),
    preferred_study_setup: Some(size),
    kind_of_support:       String::new(),
    connection_type:       ConnectionType::Find,
    timestamp:             Some(Utc::now()),
    matched:               false,
    group_id:              None,
    unpair_reason:         String::new(),
    matched_timestamp:     None,
  }
}

/// An unmatched `offer` or `need` record.
pub fn support_record(
  connection_type: ConnectionType,
  country: &str,
  cohort: &str,
  availability: &str,
) -> Record {
  let mut record = find_record(country, cohort, "T1", availability, GroupSize::Two);
  record.connection_type = connection_type;
  record.preferred_study_setup = None;
  record.kind_of_support = "Accountability".into();
  record
}
