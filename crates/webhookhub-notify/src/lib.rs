//! Fan-out of stored webhooks to external notification backends.
//!
//! Each [`Backend`] formats a [`NotificationRecord`] for one service
//! (Pushover, Discord, SMTP). The [`Dispatcher`] runs every enabled backend
//! concurrently, bounds each call with a timeout and collects the outcomes
//! without ever propagating a failure to the caller.

pub mod backends;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod utils;

pub use config::{DiscordConfig, NotifyConfig, PushoverConfig, SmtpConfig};
pub use dispatcher::{BackendOutcome, BackendStatus, DispatchReport, Dispatcher, Outcome};
pub use error::NotifyError;

use async_trait::async_trait;
use webhookhub_types::models::{ChannelPrefs, NotificationRecord};

/// An external notification sink.
///
/// Backends are only constructed when their configuration is complete, so a
/// registered backend is an enabled one.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable name used in logs and status reports (e.g. `"pushover"`).
    fn name(&self) -> &'static str;

    /// Whether this record should be sent at all. Returning `false` records a
    /// skip rather than a failure.
    fn accepts(&self, _record: &NotificationRecord, _prefs: &ChannelPrefs) -> bool {
        true
    }

    /// Delivers one record.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Unavailable`] when the service cannot be reached,
    /// [`NotifyError::Rejected`] when it refuses the request.
    async fn send(&self, record: &NotificationRecord, prefs: &ChannelPrefs) -> Result<(), NotifyError>;
}
