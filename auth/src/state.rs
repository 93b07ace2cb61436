//! Local user state types.
//!
//! `LocalUser` is the system of record for a principal. It links to the
//! identity provider through its optional [`ExternalId`] and mirrors the
//! provider's current bearer token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Internal identifier for a user.
///
/// Assigned once at creation and never changed. This is the only key other
/// subsystems should persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The identity provider's stable numeric identifier for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(pub i64);

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Status Enums
// ═══════════════════════════════════════════════════════════════════════

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Registered but not yet activated.
    Pending,
    /// Active account.
    Available,
    /// Suspended by an administrator.
    Suspended,
    /// Soft-deleted.
    Deleted,
}

impl UserStatus {
    /// Storage code for this status.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Available => 1,
            Self::Pending => 2,
            Self::Suspended => 9,
            Self::Deleted => 10,
        }
    }

    /// Parse a storage code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Available),
            2 => Some(Self::Pending),
            9 => Some(Self::Suspended),
            10 => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Email verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// Email confirmed.
    Available,
    /// Confirmation mail sent, not yet verified.
    ToBeVerified,
}

impl EmailStatus {
    /// Storage code for this status.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Available => 1,
            Self::ToBeVerified => 2,
        }
    }

    /// Parse a storage code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Available),
            2 => Some(Self::ToBeVerified),
            _ => None,
        }
    }
}

/// Notification preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    /// Notifications enabled.
    #[default]
    On,
    /// Notifications disabled.
    Off,
}

impl NoticeStatus {
    /// Storage code for this status.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::On => 1,
            Self::Off => 2,
        }
    }

    /// Parse a storage code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::On),
            2 => Some(Self::Off),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Local User
// ═══════════════════════════════════════════════════════════════════════

/// A local user record.
///
/// When `external_id` is set, `access_token` and `token_expires_at` mirror the
/// most recent successful identity provider exchange for this user.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    /// Internal ID (primary key).
    pub id: UserId,

    /// Identity provider link. Unique across all users when present.
    pub external_id: Option<ExternalId>,

    /// Login / handle name.
    pub username: String,

    /// Name shown to other users.
    pub display_name: String,

    /// Email address.
    pub email: String,

    /// Random local credential.
    ///
    /// Not used for provider-authenticated logins, but the schema requires a
    /// non-empty value.
    #[serde(skip_serializing, default)]
    pub local_secret: String,

    /// Current bearer token issued by the identity provider.
    #[serde(skip_serializing, default)]
    pub access_token: String,

    /// Absolute expiry of `access_token`.
    pub token_expires_at: Option<DateTime<Utc>>,

    /// Account status.
    pub status: UserStatus,

    /// Email verification status.
    pub email_status: EmailStatus,

    /// Notification preference.
    pub notice_status: NoticeStatus,

    /// Number of answers posted.
    pub answer_count: i64,

    /// Number of questions posted.
    pub question_count: i64,

    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl LocalUser {
    /// Returns `true` if the account may be used.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Available
    }

    /// Returns `true` if the bearer token is missing or expired at `now`.
    #[must_use]
    pub fn token_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.is_none_or(|expires_at| expires_at <= now)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for LocalUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUser")
            .field("id", &self.id)
            .field("external_id", &self.external_id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("local_secret", &"[redacted]")
            .field("access_token", &"[redacted]")
            .field("token_expires_at", &self.token_expires_at)
            .field("status", &self.status)
            .field("email_status", &self.email_status)
            .field("notice_status", &self.notice_status)
            .field("answer_count", &self.answer_count)
            .field("question_count", &self.question_count)
            .field("last_login_at", &self.last_login_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Editable profile columns (`UserRepository::update_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New username.
    pub username: String,
    /// New display name.
    pub display_name: String,
}
