//! The transactional engine: every operation the surrounding application
//! calls into the core through.
//!
//! Each operation is a short synchronous transaction against the shared
//! store: load a versioned snapshot, compute the new snapshot purely from
//! it, then commit with a conditional save. On a version conflict the
//! whole computation is redone from a fresh snapshot, up to
//! [`MAX_COMMIT_ATTEMPTS`] times, after which [`Error::Contention`]
//! surfaces to the caller. A later snapshot may include concurrently
//! joined records and change the outcome; matching is best-effort over
//! current state.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  dedupe, fallback, matcher,
  error::{Error, Result},
  notify::Notifier,
  record::{
    Availability, ConnectionType, GroupId, GroupSize, Record,
  },
  store::{QueueStore, Snapshot, StoreError, Version},
};

/// How many times a lost optimistic write is retried before giving up.
pub const MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Minimum accepted phone length, including the leading `+`.
const MIN_PHONE_LEN: usize = 7;

// ─── Requests and outcomes ───────────────────────────────────────────────────

/// A raw join candidate, exactly as received from the outer surface.
/// Everything is untrimmed text; [`Engine::join`] validates and normalizes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
  pub name:                  String,
  pub phone:                 String,
  pub email:                 String,
  pub country:               String,
  pub language:              String,
  pub cohort:                String,
  pub topic_module:          String,
  pub learning_preferences:  String,
  pub availability:          String,
  pub preferred_study_setup: String,
  pub kind_of_support:       String,
  pub connection_type:       String,
}

#[derive(Debug, Clone)]
pub enum JoinOutcome {
  /// A new record was created and persisted.
  Joined { id: Uuid },
  /// An identical request is already queued; nothing was created.
  AlreadyQueued { id: Uuid },
  /// An identical request already got matched; here is its group.
  AlreadyMatched { record: Record, members: Vec<Record> },
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
  Pending,
  Matched { group_id: GroupId, members: Vec<Record> },
}

/// A record together with its derived group view (empty while unmatched).
#[derive(Debug, Clone)]
pub struct StatusView {
  pub record:  Record,
  pub members: Vec<Record>,
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// A join request that passed validation: trimmed, email lowercased,
/// enums parsed.
#[derive(Debug, Clone)]
struct Candidate {
  name:                  String,
  phone:                 String,
  email:                 String,
  country:               String,
  language:              String,
  cohort:                String,
  topic_module:          String,
  learning_preferences:  String,
  availability:          Availability,
  preferred_study_setup: Option<GroupSize>,
  kind_of_support:       String,
  connection_type:       ConnectionType,
}

impl Candidate {
  fn into_record(self, now: chrono::DateTime<Utc>) -> Record {
    Record {
      id:                    Uuid::new_v4(),
      name:                  self.name,
      phone:                 self.phone,
      email:                 self.email,
      country:               self.country,
      language:              self.language,
      cohort:                self.cohort,
      topic_module:          self.topic_module,
      learning_preferences:  self.learning_preferences,
      availability:          self.availability,
      preferred_study_setup: self.preferred_study_setup,
      kind_of_support:       self.kind_of_support,
      connection_type:       self.connection_type,
      timestamp:             Some(now),
      matched:               false,
      group_id:              None,
      unpair_reason:         String::new(),
      matched_timestamp:     None,
    }
  }
}

fn require(field: &'static str, value: &str) -> Result<String> {
  let value = value.trim();
  if value.is_empty() {
    return Err(Error::validation(field, "this field is required"));
  }
  Ok(value.to_string())
}

fn validate(request: &JoinRequest) -> Result<Candidate> {
  let connection_type = ConnectionType::parse(request.connection_type.trim())
    .ok_or_else(|| {
      Error::validation("connection_type", "must be find, offer, or need")
    })?;

  let name = require("name", &request.name)?;
  let phone = require("phone", &request.phone)?;
  let email = require("email", &request.email)?.to_lowercase();
  let country = require("country", &request.country)?;
  let language = require("language", &request.language)?;
  let cohort = require("cohort", &request.cohort)?;
  let topic_module = require("topic_module", &request.topic_module)?;
  let learning_preferences =
    require("learning_preferences", &request.learning_preferences)?;
  let availability = Availability::new(require("availability", &request.availability)?);

  if !phone.starts_with('+') || phone.len() < MIN_PHONE_LEN {
    return Err(Error::validation(
      "phone",
      "must start with + and be a valid number",
    ));
  }

  let (preferred_study_setup, kind_of_support) = match connection_type {
    ConnectionType::Find => {
      let size = GroupSize::parse(request.preferred_study_setup.trim())
        .ok_or_else(|| {
          Error::validation("preferred_study_setup", "must be 2, 3, or 5")
        })?;
      (Some(size), String::new())
    }
    ConnectionType::Offer | ConnectionType::Need => {
      let support = require("kind_of_support", &request.kind_of_support)?;
      (None, support)
    }
  };

  Ok(Candidate {
    name,
    phone,
    email,
    country,
    language,
    cohort,
    topic_module,
    learning_preferences,
    availability,
    preferred_study_setup,
    kind_of_support,
    connection_type,
  })
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// All core operations, bound to one store and one notifier.
///
/// Constructed once at startup and handed to every caller; the store is
/// the only shared mutable resource and is never locked pessimistically.
pub struct Engine<S, N> {
  store:            S,
  notifier:         N,
  status_check_url: String,
}

impl<S, N> Engine<S, N>
where
  S: QueueStore,
  N: Notifier,
{
  pub fn new(store: S, notifier: N, status_check_url: impl Into<String>) -> Self {
    Self { store, notifier, status_check_url: status_check_url.into() }
  }

  async fn load(&self) -> Result<(Snapshot, Version)> {
    self.store.load().await.map_err(|e| match e {
      StoreError::Conflict => Error::Contention,
      StoreError::Backend(e) => Error::StorageUnavailable(Box::new(e)),
    })
  }

  /// Conditional save. `Ok(None)` means the write lost the race and the
  /// caller should recompute from a fresh snapshot.
  async fn try_save(
    &self,
    snapshot: &Snapshot,
    expected: &Version,
  ) -> Result<Option<Version>> {
    match self.store.save(snapshot, expected).await {
      Ok(version) => Ok(Some(version)),
      Err(StoreError::Conflict) => Ok(None),
      Err(StoreError::Backend(e)) => Err(Error::StorageUnavailable(Box::new(e))),
    }
  }

  // ── Operations ────────────────────────────────────────────────────────

  /// Validate a candidate, detect duplicates, and persist a new record.
  /// Duplicates never create a second record.
  pub async fn join(&self, request: JoinRequest) -> Result<JoinOutcome> {
    let candidate = validate(&request)?;

    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut snapshot, version) = self.load().await?;

      if let Some(existing) = dedupe::find_duplicate(
        &snapshot,
        &candidate.phone,
        &candidate.email,
        &candidate.cohort,
        candidate.preferred_study_setup,
        candidate.connection_type,
      ) {
        let existing = existing.clone();
        if existing.matched
          && let Some(group_id) = existing.group_id.clone()
        {
          let members = snapshot
            .group_members(&group_id)
            .into_iter()
            .cloned()
            .collect();
          return Ok(JoinOutcome::AlreadyMatched { record: existing, members });
        }
        return Ok(JoinOutcome::AlreadyQueued { id: existing.id });
      }

      let record = candidate.clone().into_record(Utc::now());
      snapshot.records.push(record.clone());

      if self.try_save(&snapshot, &version).await?.is_some() {
        if let Err(e) =
          self.notifier.waiting_notice(&record, &self.status_check_url).await
        {
          tracing::warn!(record = %record.id, error = %e, "waiting notice failed");
        }
        return Ok(JoinOutcome::Joined { id: record.id });
      }
    }

    Err(Error::Contention)
  }

  /// Run the matcher for `id`'s role over the current snapshot and commit
  /// any groups formed. An already-matched record reports its existing
  /// group without touching the store.
  pub async fn attempt_match(&self, id: Uuid) -> Result<MatchOutcome> {
    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut snapshot, version) = self.load().await?;
      let target =
        snapshot.find(id).ok_or(Error::NotFound(id))?.clone();

      if target.matched {
        return Ok(matched_outcome(&snapshot, &target));
      }

      let now = Utc::now();
      let updated = match target.connection_type {
        ConnectionType::Find => {
          if target.preferred_study_setup.is_none() {
            return Err(Error::validation(
              "preferred_study_setup",
              "must be 2, 3, or 5",
            ));
          }
          matcher::match_find_groups(&mut snapshot, &target, now) > 0
        }
        ConnectionType::Offer | ConnectionType::Need => {
          matcher::match_pair(&mut snapshot, &target, now)
        }
      };

      if !updated {
        return Ok(MatchOutcome::Pending);
      }

      if self.try_save(&snapshot, &version).await?.is_none() {
        continue;
      }

      // Groups may have formed around the target without including it.
      let outcome = match snapshot.find(id) {
        Some(target) if target.matched => matched_outcome(&snapshot, target),
        _ => MatchOutcome::Pending,
      };
      if let MatchOutcome::Matched { members, .. } = &outcome {
        self.notify_matched(members).await;
      }
      return Ok(outcome);
    }

    Err(Error::Contention)
  }

  /// The record and, when matched, its derived group view.
  pub async fn status(&self, id: Uuid) -> Result<StatusView> {
    let (snapshot, _) = self.load().await?;
    let record = snapshot.find(id).ok_or(Error::NotFound(id))?.clone();
    let members = match &record.group_id {
      Some(group_id) if record.matched => snapshot
        .group_members(group_id)
        .into_iter()
        .cloned()
        .collect(),
      _ => Vec::new(),
    };
    Ok(StatusView { record, members })
  }

  /// Anonymize `id` (and, when it is matched, every member of its group):
  /// contact and classification fields are overwritten with the sentinel
  /// and the reason recorded. Match state is deliberately left intact.
  pub async fn unpair(&self, id: Uuid, reason: &str) -> Result<()> {
    let reason = reason.trim();
    if reason.is_empty() {
      return Err(Error::validation("reason", "this field is required"));
    }

    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut snapshot, version) = self.load().await?;
      let target =
        snapshot.find(id).ok_or(Error::NotFound(id))?.clone();

      let affected: Vec<Uuid> = match &target.group_id {
        Some(group_id) if target.matched => snapshot
          .group_members(group_id)
          .iter()
          .map(|r| r.id)
          .collect(),
        _ => vec![target.id],
      };

      for member_id in &affected {
        if let Some(member) = snapshot.find_mut(*member_id) {
          member.anonymize(reason);
        }
      }

      if self.try_save(&snapshot, &version).await?.is_some() {
        tracing::info!(record = %id, affected = affected.len(), "unpaired");
        return Ok(());
      }
    }

    Err(Error::Contention)
  }

  /// One relaxed batch pass over the queue. Returns the number of groups
  /// formed; zero stale input commits nothing.
  pub async fn run_fallback_pass(&self) -> Result<usize> {
    for _ in 0..MAX_COMMIT_ATTEMPTS {
      let (mut snapshot, version) = self.load().await?;
      let formed = fallback::run(&mut snapshot, Utc::now());

      if formed == 0 {
        return Ok(0);
      }
      if self.try_save(&snapshot, &version).await?.is_some() {
        tracing::info!(groups = formed, "fallback pass committed");
        return Ok(formed);
      }
    }

    Err(Error::Contention)
  }

  /// The full current snapshot, for administrative export.
  pub async fn export_all(&self) -> Result<Snapshot> {
    let (snapshot, _) = self.load().await?;
    Ok(snapshot)
  }

  async fn notify_matched(&self, members: &[Record]) {
    for member in members.iter().filter(|m| !m.is_anonymized()) {
      if let Err(e) = self.notifier.match_notice(member, members).await {
        tracing::warn!(record = %member.id, error = %e, "match notice failed");
      }
    }
  }
}

fn matched_outcome(snapshot: &Snapshot, target: &Record) -> MatchOutcome {
  match &target.group_id {
    Some(group_id) => MatchOutcome::Matched {
      group_id: group_id.clone(),
      members:  snapshot
        .group_members(group_id)
        .into_iter()
        .cloned()
        .collect(),
    },
    // A matched record without a group id violates the invariant; report
    // it as pending rather than fabricating a group.
    None => MatchOutcome::Pending,
  }
}
