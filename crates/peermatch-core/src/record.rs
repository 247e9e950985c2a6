//! Record — one join request in the matching queue.
//!
//! A record is created on join (unmatched, no group), mutated exactly once
//! into "matched" by a group, pair, or fallback transaction, and may later
//! be anonymized by unpair. Records are never deleted; a "group" is not a
//! stored entity but the set of records sharing a non-empty group id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel written over `email`, `cohort`, and `topic_module` on withdrawal.
pub const UNPAIRED: &str = "unpaired";

/// Availability value compatible with every other value.
pub const FLEXIBLE: &str = "Flexible";

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Role of a request: seeking a same-criteria group, offering support, or
/// seeking support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
  Find,
  Offer,
  Need,
}

impl ConnectionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Find => "find",
      Self::Offer => "offer",
      Self::Need => "need",
    }
  }

  /// The role a pair request is matched against. `Find` has no opposite.
  pub fn opposite(&self) -> Option<Self> {
    match self {
      Self::Find => None,
      Self::Offer => Some(Self::Need),
      Self::Need => Some(Self::Offer),
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "find" => Some(Self::Find),
      "offer" => Some(Self::Offer),
      "need" => Some(Self::Need),
      _ => None,
    }
  }
}

/// The desired exact group size for a `find` request. Only these three
/// sizes are supported; anything else is a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupSize {
  #[serde(rename = "2")]
  Two,
  #[serde(rename = "3")]
  Three,
  #[serde(rename = "5")]
  Five,
}

impl GroupSize {
  pub const ALL: [Self; 3] = [Self::Two, Self::Three, Self::Five];

  pub fn member_count(&self) -> usize {
    match self {
      Self::Two => 2,
      Self::Three => 3,
      Self::Five => 5,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Two => "2",
      Self::Three => "3",
      Self::Five => "5",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "2" => Some(Self::Two),
      "3" => Some(Self::Three),
      "5" => Some(Self::Five),
      _ => None,
    }
  }
}

// ─── Availability ────────────────────────────────────────────────────────────

/// A declared availability slot. Free-form text with one sentinel value,
/// [`FLEXIBLE`], that matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Availability(pub String);

impl Availability {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn is_flexible(&self) -> bool { self.0 == FLEXIBLE }

  /// Symmetric and reflexive: true if either side is flexible, else on
  /// textual equality.
  pub fn compatible_with(&self, other: &Self) -> bool {
    self.is_flexible() || other.is_flexible() || self.0 == other.0
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Group id ────────────────────────────────────────────────────────────────

/// Shared identifier linking all members of one formed group or pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
  /// A new id for a group formed by the exact-criteria or pair matchers.
  pub fn fresh() -> Self { Self(format!("group-{}", Uuid::new_v4())) }

  /// A new id for a group formed by the relaxed fallback pass.
  pub fn fresh_fallback() -> Self {
    Self(format!("group-fallback-{}", Uuid::new_v4()))
  }

  /// Wrap an id read back from storage.
  pub fn from_stored(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One participant / join request. Field order mirrors the persisted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  pub id:                    Uuid,
  pub name:                  String,
  /// Normalized to a trimmed string; must start with `+`.
  pub phone:                 String,
  pub email:                 String,
  pub country:               String,
  pub language:              String,
  pub cohort:                String,
  pub topic_module:          String,
  pub learning_preferences:  String,
  pub availability:          Availability,
  /// Only meaningful for [`ConnectionType::Find`].
  pub preferred_study_setup: Option<GroupSize>,
  /// Only meaningful for [`ConnectionType::Offer`] / [`ConnectionType::Need`].
  pub kind_of_support:       String,
  pub connection_type:       ConnectionType,
  /// Creation time. `None` when the stored value was missing or unparseable;
  /// such records are treated as not-yet-stale by the fallback pass.
  pub timestamp:             Option<DateTime<Utc>>,
  pub matched:               bool,
  pub group_id:              Option<GroupId>,
  pub unpair_reason:         String,
  pub matched_timestamp:     Option<DateTime<Utc>>,
}

impl Record {
  pub fn is_unmatched(&self) -> bool { !self.matched }

  /// The single unmatched -> matched transition. Never reversed.
  pub fn mark_matched(&mut self, group_id: GroupId, at: DateTime<Utc>) {
    self.matched = true;
    self.group_id = Some(group_id);
    self.matched_timestamp = Some(at);
  }

  /// Overwrite identity and classification fields with the [`UNPAIRED`]
  /// sentinel and record the reason. `matched` and `group_id` are left
  /// untouched: a withdrawal anonymizes identity without erasing the fact
  /// that a match occurred.
  pub fn anonymize(&mut self, reason: &str) {
    self.email = UNPAIRED.to_string();
    self.cohort = UNPAIRED.to_string();
    self.topic_module = UNPAIRED.to_string();
    self.unpair_reason = reason.to_string();
  }

  pub fn is_anonymized(&self) -> bool { self.email == UNPAIRED }
}
