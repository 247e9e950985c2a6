//! Outbound notification interface.
//!
//! Notices are fired by the engine only after a successful commit, and are
//! strictly best-effort: a failure is logged and never unwinds the commit.
//! Anonymized records (email overwritten with the `unpaired` sentinel) are
//! never notified.

use std::future::Future;

use thiserror::Error;

use crate::record::Record;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery interface for the two notices the system sends.
pub trait Notifier: Send + Sync {
  /// Tell `recipient` their group has formed. `members` is the whole
  /// group, recipient included.
  fn match_notice<'a>(
    &'a self,
    recipient: &'a Record,
    members: &'a [Record],
  ) -> impl Future<Output = Result<(), NotifyError>> + Send + 'a;

  /// Tell `recipient` they are queued, with their record id and the URL
  /// where they can check their status later.
  fn waiting_notice<'a>(
    &'a self,
    recipient: &'a Record,
    status_check_url: &'a str,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send + 'a;
}

/// Notifier that writes notices to the log. Used where no mail transport
/// is configured; also a sane default for local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn match_notice(
    &self,
    recipient: &Record,
    members: &[Record],
  ) -> Result<(), NotifyError> {
    let peers: Vec<&str> = members
      .iter()
      .filter(|m| m.id != recipient.id && !m.is_anonymized())
      .map(|m| m.name.as_str())
      .collect();
    tracing::info!(
      recipient = %recipient.email,
      name = %recipient.name,
      peers = ?peers,
      "match notice"
    );
    Ok(())
  }

  async fn waiting_notice(
    &self,
    recipient: &Record,
    status_check_url: &str,
  ) -> Result<(), NotifyError> {
    tracing::info!(
      recipient = %recipient.email,
      name = %recipient.name,
      record = %recipient.id,
      status_check_url,
      "waiting notice"
    );
    Ok(())
  }
}
