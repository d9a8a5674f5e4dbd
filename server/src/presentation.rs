//! UI state machine, notifications and user-facing messages

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::VerifierError;
use crate::models::{VerificationStats, WeatherProof};

pub const GENERIC_ERROR: &str = "An unknown error occurred";
pub const SUCCESS_MESSAGE: &str = "Proof verified and reward claimed!";
pub const NYC_TOO_WARM: &str = "Claim rejected: New York is too warm (must be below -1°C)";
pub const SF_TOO_COLD: &str = "Claim rejected: San Francisco is too cold (must be above 10°C)";

const NYC_THRESHOLD_PHRASE: &str = "NYC temperature must be below";
const SF_THRESHOLD_PHRASE: &str = "SF temperature must be above";
const REVERT_MARKER: &str = "execution reverted:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UiState {
    Idle,
    Fetching,
    Succeeded {
        proof: WeatherProof,
        stats: VerificationStats,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
}

impl UiState {
    pub fn is_busy(&self) -> bool {
        matches!(self, UiState::Fetching)
    }
}

impl Default for UiState {
    fn default() -> Self {
        UiState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Timed, dismissible toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Owner of the single live [`UiState`] and the notification stack.
#[derive(Debug, Default)]
pub struct Presenter {
    state: UiState,
    notifications: Vec<Notification>,
    next_id: u64,
}

impl Presenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    /// Moves to `Fetching` unless a run is already in flight.
    pub fn trigger(&mut self) -> bool {
        if self.state.is_busy() {
            return false;
        }
        self.state = UiState::Fetching;
        true
    }

    pub fn succeed(&mut self, proof: WeatherProof, stats: VerificationStats, now: DateTime<Utc>) {
        self.state = UiState::Succeeded { proof, stats };
        self.notify(NotificationLevel::Success, SUCCESS_MESSAGE.to_string(), Duration::seconds(2), now);
    }

    pub fn fail(&mut self, error: &VerifierError, now: DateTime<Utc>) {
        let message = user_message(error);
        let duration = match error {
            VerifierError::WalletUnavailable => Duration::seconds(5),
            _ => Duration::seconds(15),
        };
        self.state = UiState::Failed {
            kind: error.kind(),
            message: message.clone(),
        };
        self.notify(NotificationLevel::Error, message, duration, now);
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    /// Drops expired notifications and returns the rest, newest first.
    pub fn active_notifications(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        self.notifications.retain(|n| n.is_active(now));
        self.notifications.iter().rev().cloned().collect()
    }

    fn notify(&mut self, level: NotificationLevel, message: String, duration: Duration, now: DateTime<Utc>) {
        self.next_id += 1;
        self.notifications.push(Notification {
            id: self.next_id,
            level,
            message,
            created_at: now,
            expires_at: now + duration,
        });
    }
}

/// Text shown to the user for a failed run.
pub fn user_message(error: &VerifierError) -> String {
    if let VerifierError::TransactionReverted(reason) = error {
        return humanize_revert(reason);
    }

    let message = error.to_string();
    if let Some((_, tail)) = message.split_once(REVERT_MARKER) {
        return humanize_revert(tail);
    }
    if message.trim().is_empty() {
        return GENERIC_ERROR.to_string();
    }
    message
}

/// Rewrites the contract's threshold reverts; other reasons are shown unquoted.
pub fn humanize_revert(reason: &str) -> String {
    let reason = reason.trim();
    let reason = reason
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(reason);

    if reason.contains(NYC_THRESHOLD_PHRASE) {
        NYC_TOO_WARM.to_string()
    } else if reason.contains(SF_THRESHOLD_PHRASE) {
        SF_TOO_COLD.to_string()
    } else if reason.is_empty() {
        GENERIC_ERROR.to_string()
    } else {
        reason.to_string()
    }
}

/// `12.0°C / 53.6°F`; the Celsius reading is shown as extracted.
pub fn format_temperature(celsius: &str) -> String {
    match celsius.trim().parse::<f64>() {
        Ok(c) => format!("{}°C / {:.1}°F", celsius.trim(), c * 9.0 / 5.0 + 32.0),
        Err(_) => format!("{}°C", celsius.trim()),
    }
}

pub fn format_timestamp(secs: u64) -> Option<String> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}
