//! CSV encoding and normalization between core records and the persisted
//! snapshot document.
//!
//! The column order is the record's canonical field order and never
//! changes. Decoding doubles as the snapshot normalizer: missing columns
//! are defaulted (`matched = false`, other fields empty), `phone` is
//! trimmed, `matched` is parsed case-insensitively, and timestamps are
//! parsed leniently (an unparseable value normalizes to "unknown").

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use uuid::Uuid;

use peermatch_core::{
  record::{Availability, ConnectionType, GroupId, GroupSize, Record},
  store::Snapshot,
};

use crate::{Error, Result};

pub const COLUMNS: [&str; 18] = [
  "id",
  "name",
  "phone",
  "email",
  "country",
  "language",
  "cohort",
  "topic_module",
  "learning_preferences",
  "availability",
  "preferred_study_setup",
  "kind_of_support",
  "connection_type",
  "timestamp",
  "matched",
  "group_id",
  "unpair_reason",
  "matched_timestamp",
];

// ─── Encoding ────────────────────────────────────────────────────────────────

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
  let mut writer = csv::Writer::from_writer(Vec::new());
  writer.write_record(COLUMNS)?;

  for r in &snapshot.records {
    writer.write_record(&[
      r.id.to_string(),
      r.name.clone(),
      r.phone.trim().to_string(),
      r.email.clone(),
      r.country.clone(),
      r.language.clone(),
      r.cohort.clone(),
      r.topic_module.clone(),
      r.learning_preferences.clone(),
      r.availability.as_str().to_string(),
      r.preferred_study_setup
        .map(|s| s.as_str().to_string())
        .unwrap_or_default(),
      r.kind_of_support.clone(),
      r.connection_type.as_str().to_string(),
      encode_timestamp(r.timestamp),
      if r.matched { "TRUE" } else { "FALSE" }.to_string(),
      r.group_id
        .as_ref()
        .map(|g| g.as_str().to_string())
        .unwrap_or_default(),
      r.unpair_reason.clone(),
      encode_timestamp(r.matched_timestamp),
    ])?;
  }

  writer
    .into_inner()
    .map_err(|e| Error::Corrupt(format!("csv flush failed: {e}")))
}

fn encode_timestamp(ts: Option<DateTime<Utc>>) -> String {
  ts.map(|t| t.to_rfc3339()).unwrap_or_default()
}

// ─── Decoding / normalization ────────────────────────────────────────────────

pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
  let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
  let headers = reader.headers()?.clone();

  let mut records = Vec::new();
  for row in reader.into_records() {
    records.push(normalize_row(&headers, &row?)?);
  }
  Ok(Snapshot::new(records))
}

fn column<'r>(headers: &StringRecord, row: &'r StringRecord, name: &str) -> &'r str {
  headers
    .iter()
    .position(|h| h == name)
    .and_then(|i| row.get(i))
    .unwrap_or("")
}

fn normalize_row(headers: &StringRecord, row: &StringRecord) -> Result<Record> {
  let get = |name: &str| column(headers, row, name);

  let id_raw = get("id").trim();
  let id = Uuid::parse_str(id_raw)
    .map_err(|_| Error::Corrupt(format!("record id {id_raw:?} is not a UUID")))?;

  let connection_raw = get("connection_type").trim();
  let connection_type = ConnectionType::parse(connection_raw).ok_or_else(|| {
    Error::Corrupt(format!("unknown connection type {connection_raw:?}"))
  })?;

  let group_id = match get("group_id").trim() {
    "" => None,
    value => Some(GroupId::from_stored(value)),
  };

  Ok(Record {
    id,
    name: get("name").to_string(),
    phone: get("phone").trim().to_string(),
    email: get("email").to_string(),
    country: get("country").to_string(),
    language: get("language").to_string(),
    cohort: get("cohort").to_string(),
    topic_module: get("topic_module").to_string(),
    learning_preferences: get("learning_preferences").to_string(),
    availability: Availability::new(get("availability")),
    preferred_study_setup: GroupSize::parse(get("preferred_study_setup").trim()),
    kind_of_support: get("kind_of_support").to_string(),
    connection_type,
    timestamp: decode_timestamp(get("timestamp")),
    matched: get("matched").trim().eq_ignore_ascii_case("true"),
    group_id,
    unpair_reason: get("unpair_reason").to_string(),
    matched_timestamp: decode_timestamp(get("matched_timestamp")),
  })
}

/// Lenient timestamp parse: RFC 3339 first, then a naive ISO-8601 value
/// (older snapshots carry timezone-less timestamps) taken as UTC.
/// Anything else is "unknown".
fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if value.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
    .ok()
    .map(|naive| naive.and_utc())
}
