//! Integration tests: the engine running against an in-memory blob store.

use std::{
  convert::Infallible,
  sync::{Arc, Mutex},
};

use bytes::Bytes;
use chrono::{Duration, Utc};
use uuid::Uuid;

use peermatch_core::{
  Error,
  engine::{Engine, JoinOutcome, JoinRequest, MatchOutcome},
  fallback::STALE_AFTER_DAYS,
  notify::{Notifier, NotifyError},
  record::{ConnectionType, Record, UNPAIRED},
  store::QueueStore,
};

use crate::{BlobStore, CsvQueueStore, MemoryBlobStore};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Notifier that records every notice it is asked to deliver.
#[derive(Clone, Default)]
struct RecordingNotifier {
  match_notices:   Arc<Mutex<Vec<(String, usize)>>>,
  waiting_notices: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
  fn match_notice_count(&self) -> usize {
    self.match_notices.lock().unwrap().len()
  }

  fn waiting_notice_count(&self) -> usize {
    self.waiting_notices.lock().unwrap().len()
  }
}

impl Notifier for RecordingNotifier {
  async fn match_notice(
    &self,
    recipient: &Record,
    members: &[Record],
  ) -> Result<(), NotifyError> {
    self
      .match_notices
      .lock()
      .unwrap()
      .push((recipient.email.clone(), members.len()));
    Ok(())
  }

  async fn waiting_notice(
    &self,
    recipient: &Record,
    _status_check_url: &str,
  ) -> Result<(), NotifyError> {
    self.waiting_notices.lock().unwrap().push(recipient.email.clone());
    Ok(())
  }
}

type TestEngine = Engine<CsvQueueStore<MemoryBlobStore>, RecordingNotifier>;

fn engine_over(blob: MemoryBlobStore) -> (TestEngine, RecordingNotifier) {
  let notifier = RecordingNotifier::default();
  let engine = Engine::new(
    CsvQueueStore::new(blob),
    notifier.clone(),
    "http://localhost:8080/api/status",
  );
  (engine, notifier)
}

fn engine() -> (TestEngine, RecordingNotifier, MemoryBlobStore) {
  let blob = MemoryBlobStore::new();
  let (engine, notifier) = engine_over(blob.clone());
  (engine, notifier, blob)
}

fn find_request(email: &str, phone: &str, availability: &str) -> JoinRequest {
  JoinRequest {
    name:                  email.split('@').next().unwrap_or("peer").to_string(),
    phone:                 phone.into(),
    email:                 email.into(),
    country:               "NG".into(),
    language:              "English".into(),
    cohort:                "C1".into(),
    topic_module:          "T1".into(),
    learning_preferences:  "Visual".into(),
    availability:          availability.into(),
    preferred_study_setup: "2".into(),
    kind_of_support:       String::new(),
    connection_type:       "find".into(),
  }
}

fn support_request(role: &str, email: &str, phone: &str) -> JoinRequest {
  JoinRequest {
    preferred_study_setup: String::new(),
    kind_of_support:       "Accountability".into(),
    connection_type:       role.into(),
    ..find_request(email, phone, "Morning")
  }
}

fn joined_id(outcome: JoinOutcome) -> Uuid {
  match outcome {
    JoinOutcome::Joined { id } => id,
    other => panic!("expected a new record, got {other:?}"),
  }
}

/// Push every record's creation time into the stale window.
async fn age_all_records(store: &CsvQueueStore<MemoryBlobStore>) {
  let (mut snapshot, version) = store.load().await.unwrap();
  for r in &mut snapshot.records {
    r.timestamp = Some(Utc::now() - Duration::days(STALE_AFTER_DAYS + 1));
  }
  store.save(&snapshot, &version).await.unwrap();
}

// ─── Join ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn join_persists_a_record_and_sends_a_waiting_notice() {
  let (engine, notifier, blob) = engine();

  let id = joined_id(
    engine
      .join(find_request("amina@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );

  assert_eq!(notifier.waiting_notice_count(), 1);

  let status = engine.status(id).await.unwrap();
  assert_eq!(status.record.email, "amina@example.com");
  assert!(status.record.is_unmatched());
  assert!(status.members.is_empty());

  // The snapshot survives a fresh store instance over the same blob.
  let reloaded = CsvQueueStore::new(blob);
  let (snapshot, _) = reloaded.load().await.unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.records[0].id, id);
}

#[tokio::test]
async fn join_rejects_invalid_candidates_without_writing() {
  let (engine, notifier, _) = engine();

  let mut bad_phone = find_request("amina@example.com", "080000", "Morning");
  bad_phone.phone = "080000000".into();
  assert!(matches!(
    engine.join(bad_phone).await.unwrap_err(),
    Error::Validation { field: "phone", .. }
  ));

  let mut bad_size = find_request("amina@example.com", "+2348000000001", "Morning");
  bad_size.preferred_study_setup = "4".into();
  assert!(matches!(
    engine.join(bad_size).await.unwrap_err(),
    Error::Validation { field: "preferred_study_setup", .. }
  ));

  assert_eq!(notifier.waiting_notice_count(), 0);
  let snapshot = engine.export_all().await.unwrap();
  assert!(snapshot.is_empty());
}

#[tokio::test]
async fn joining_twice_returns_the_same_id() {
  let (engine, _, _) = engine();

  let first = joined_id(
    engine
      .join(find_request("amina@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );

  // Same email, different phone: still the same person asking for the
  // same thing.
  let again = engine
    .join(find_request("amina@example.com", "+2348999999999", "Morning"))
    .await
    .unwrap();
  match again {
    JoinOutcome::AlreadyQueued { id } => assert_eq!(id, first),
    other => panic!("expected AlreadyQueued, got {other:?}"),
  }

  let snapshot = engine.export_all().await.unwrap();
  assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn duplicate_join_after_match_shows_the_existing_group() {
  let (engine, _, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );
  engine
    .join(find_request("b@example.com", "+2348000000002", "Flexible"))
    .await
    .unwrap();
  engine.attempt_match(a).await.unwrap();

  let outcome = engine
    .join(find_request("a@example.com", "+2348000000001", "Morning"))
    .await
    .unwrap();
  match outcome {
    JoinOutcome::AlreadyMatched { record, members } => {
      assert_eq!(record.id, a);
      assert_eq!(members.len(), 2);
    }
    other => panic!("expected AlreadyMatched, got {other:?}"),
  }
}

// ─── Matching ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn compatible_find_records_form_a_group() {
  // Scenario A: same criteria, availabilities Morning and Flexible.
  let (engine, notifier, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );
  let b = joined_id(
    engine
      .join(find_request("b@example.com", "+2348000000002", "Flexible"))
      .await
      .unwrap(),
  );

  let outcome = engine.attempt_match(a).await.unwrap();
  let MatchOutcome::Matched { group_id, members } = outcome else {
    panic!("expected a match");
  };
  assert_eq!(members.len(), 2);
  let ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
  assert!(ids.contains(&a) && ids.contains(&b));

  // Both members got a match notice naming the whole group.
  assert_eq!(notifier.match_notice_count(), 2);

  // Invariant: matched iff group id set.
  let snapshot = engine.export_all().await.unwrap();
  for r in &snapshot.records {
    assert_eq!(r.matched, r.group_id.is_some());
    assert_eq!(r.group_id.as_ref(), Some(&group_id));
    assert!(r.matched_timestamp.is_some());
  }
}

#[tokio::test]
async fn lone_find_record_stays_pending() {
  // Scenario C.
  let (engine, notifier, _) = engine();

  let id = joined_id(
    engine
      .join(find_request("solo@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );

  assert!(matches!(
    engine.attempt_match(id).await.unwrap(),
    MatchOutcome::Pending
  ));
  assert_eq!(notifier.match_notice_count(), 0);

  let status = engine.status(id).await.unwrap();
  assert!(status.record.is_unmatched());
  assert!(status.record.group_id.is_none());
}

#[tokio::test]
async fn offer_and_need_pair_up() {
  // Scenario B.
  let (engine, _, _) = engine();

  let offer = joined_id(
    engine
      .join(support_request("offer", "mentor@example.com", "+2348000000001"))
      .await
      .unwrap(),
  );
  let need = joined_id(
    engine
      .join(support_request("need", "student@example.com", "+2348000000002"))
      .await
      .unwrap(),
  );

  let MatchOutcome::Matched { members, .. } =
    engine.attempt_match(offer).await.unwrap()
  else {
    panic!("expected a pair");
  };
  assert_eq!(members.len(), 2);

  let roles: Vec<ConnectionType> =
    members.iter().map(|m| m.connection_type).collect();
  assert!(roles.contains(&ConnectionType::Offer));
  assert!(roles.contains(&ConnectionType::Need));
  let ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
  assert!(ids.contains(&offer) && ids.contains(&need));
}

#[tokio::test]
async fn rematching_a_matched_record_reports_without_renotifying() {
  let (engine, notifier, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Flexible"))
      .await
      .unwrap(),
  );
  engine
    .join(find_request("b@example.com", "+2348000000002", "Flexible"))
    .await
    .unwrap();

  engine.attempt_match(a).await.unwrap();
  let notices_after_match = notifier.match_notice_count();

  let MatchOutcome::Matched { members, .. } =
    engine.attempt_match(a).await.unwrap()
  else {
    panic!("expected the existing group");
  };
  assert_eq!(members.len(), 2);
  assert_eq!(notifier.match_notice_count(), notices_after_match);
}

#[tokio::test]
async fn match_attempt_for_unknown_record_is_not_found() {
  let (engine, _, _) = engine();
  assert!(matches!(
    engine.attempt_match(Uuid::new_v4()).await.unwrap_err(),
    Error::NotFound(_)
  ));
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_match_attempts_never_overlap_groups() {
  // Scenario D: two callers race over the same eligible set.
  let (engine_a, _, blob) = engine();
  let (engine_b, _) = engine_over(blob.clone());
  let engine_a = Arc::new(engine_a);
  let engine_b = Arc::new(engine_b);

  let mut ids = Vec::new();
  for i in 0..4 {
    ids.push(joined_id(
      engine_a
        .join(find_request(
          &format!("peer{i}@example.com"),
          &format!("+234800000000{i}"),
          "Flexible",
        ))
        .await
        .unwrap(),
    ));
  }

  let first = {
    let engine = engine_a.clone();
    let id = ids[0];
    tokio::spawn(async move { engine.attempt_match(id).await })
  };
  let second = {
    let engine = engine_b.clone();
    let id = ids[2];
    tokio::spawn(async move { engine.attempt_match(id).await })
  };
  first.await.unwrap().unwrap();
  second.await.unwrap().unwrap();

  let snapshot = engine_a.export_all().await.unwrap();
  assert!(snapshot.records.iter().all(|r| r.matched));

  // Each group id covers exactly two records; nobody is in two groups.
  let mut by_group = std::collections::HashMap::new();
  for r in &snapshot.records {
    let group_id = r.group_id.as_ref().expect("matched implies group id");
    *by_group.entry(group_id.as_str().to_string()).or_insert(0usize) += 1;
  }
  assert_eq!(by_group.len(), 2);
  assert!(by_group.values().all(|&count| count == 2));
}

#[tokio::test]
async fn exhausted_retries_surface_as_contention() {
  /// A backend whose writes always lose the race.
  #[derive(Clone, Default)]
  struct AlwaysConflict;

  impl BlobStore for AlwaysConflict {
    type Error = Infallible;

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, Infallible> {
      Ok(None)
    }

    async fn put_if(
      &self,
      _key: &str,
      _bytes: Bytes,
      _expected_digest: Option<&str>,
    ) -> Result<bool, Infallible> {
      Ok(false)
    }
  }

  let engine = Engine::new(
    CsvQueueStore::new(AlwaysConflict),
    RecordingNotifier::default(),
    "http://localhost:8080/api/status",
  );

  assert!(matches!(
    engine
      .join(find_request("amina@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap_err(),
    Error::Contention
  ));
}

// ─── Fallback ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fallback_groups_stale_records_across_criteria() {
  let (engine, _, blob) = engine();

  // Two requests that the exact matcher would never put together.
  let mut kenyan = find_request("b@example.com", "+2548000000002", "Evening");
  kenyan.country = "KE".into();
  kenyan.cohort = "C9".into();
  kenyan.topic_module = "T9".into();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );
  let b = joined_id(engine.join(kenyan).await.unwrap());

  assert!(matches!(
    engine.attempt_match(a).await.unwrap(),
    MatchOutcome::Pending
  ));

  // Not stale yet: the pass is a no-op.
  assert_eq!(engine.run_fallback_pass().await.unwrap(), 0);

  age_all_records(&CsvQueueStore::new(blob)).await;
  assert_eq!(engine.run_fallback_pass().await.unwrap(), 1);

  let snapshot = engine.export_all().await.unwrap();
  let a = snapshot.find(a).unwrap();
  let b = snapshot.find(b).unwrap();
  assert!(a.matched && b.matched);
  assert_eq!(a.group_id, b.group_id);
  assert!(
    a.group_id
      .as_ref()
      .unwrap()
      .as_str()
      .starts_with("group-fallback-")
  );

  // Idempotent: nothing new to rescue.
  assert_eq!(engine.run_fallback_pass().await.unwrap(), 0);
}

#[tokio::test]
async fn fallback_ignores_pair_roles_and_fresh_records() {
  let (engine, _, blob) = engine();

  let offer = joined_id(
    engine
      .join(support_request("offer", "mentor@example.com", "+2348000000001"))
      .await
      .unwrap(),
  );
  let fresh = joined_id(
    engine
      .join(find_request("fresh@example.com", "+2348000000002", "Morning"))
      .await
      .unwrap(),
  );

  age_all_records(&CsvQueueStore::new(blob.clone())).await;

  // Make one record fresh again after the aging pass.
  let store = CsvQueueStore::new(blob);
  let (mut snapshot, version) = store.load().await.unwrap();
  snapshot.find_mut(fresh).unwrap().timestamp = Some(Utc::now());
  store.save(&snapshot, &version).await.unwrap();

  assert_eq!(engine.run_fallback_pass().await.unwrap(), 0);

  let snapshot = engine.export_all().await.unwrap();
  assert!(snapshot.find(offer).unwrap().is_unmatched());
  assert!(snapshot.find(fresh).unwrap().is_unmatched());
}

// ─── Unpair ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unpair_anonymizes_the_whole_group_but_keeps_match_state() {
  let (engine, _, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Flexible"))
      .await
      .unwrap(),
  );
  let b = joined_id(
    engine
      .join(find_request("b@example.com", "+2348000000002", "Flexible"))
      .await
      .unwrap(),
  );
  engine.attempt_match(a).await.unwrap();

  engine.unpair(a, "no longer available").await.unwrap();

  let snapshot = engine.export_all().await.unwrap();
  for id in [a, b] {
    let r = snapshot.find(id).unwrap();
    assert_eq!(r.email, UNPAIRED);
    assert_eq!(r.cohort, UNPAIRED);
    assert_eq!(r.topic_module, UNPAIRED);
    assert_eq!(r.unpair_reason, "no longer available");
    assert!(r.matched, "unpair must not clear the match");
    assert!(r.group_id.is_some(), "unpair must not clear the group id");
  }
}

#[tokio::test]
async fn unpair_of_an_unmatched_record_affects_only_itself() {
  let (engine, _, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );
  let b = joined_id(
    engine
      .join(find_request("b@example.com", "+2348000000002", "Evening"))
      .await
      .unwrap(),
  );

  engine.unpair(a, "entered wrong details").await.unwrap();

  let snapshot = engine.export_all().await.unwrap();
  assert_eq!(snapshot.find(a).unwrap().email, UNPAIRED);
  assert!(snapshot.find(a).unwrap().is_unmatched());
  assert_eq!(snapshot.find(b).unwrap().email, "b@example.com");
}

#[tokio::test]
async fn unpair_requires_a_reason_and_a_known_record() {
  let (engine, _, _) = engine();

  let a = joined_id(
    engine
      .join(find_request("a@example.com", "+2348000000001", "Morning"))
      .await
      .unwrap(),
  );

  assert!(matches!(
    engine.unpair(a, "   ").await.unwrap_err(),
    Error::Validation { field: "reason", .. }
  ));
  assert!(matches!(
    engine.unpair(Uuid::new_v4(), "reason").await.unwrap_err(),
    Error::NotFound(_)
  ));
}

// ─── Store-level behaviour ───────────────────────────────────────────────────

#[tokio::test]
async fn stale_version_save_is_a_conflict() {
  use peermatch_core::store::StoreError;

  let store = CsvQueueStore::new(MemoryBlobStore::new());
  let (snapshot, version) = store.load().await.unwrap();

  // First writer commits.
  store.save(&snapshot, &version).await.unwrap();

  // Second writer still holds the pre-creation version.
  let result = store.save(&snapshot, &version).await;
  assert!(matches!(result, Err(StoreError::Conflict)));
}
