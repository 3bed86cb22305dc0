use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification callers switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    NotFound,
    QuotaExceeded,
    Captcha,
    InvalidInput,
    Conflict,
    Payment,
    FeatureDisabled,
    Internal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("unauthorized, cannot update tag description")]
    CannotUpdateTagDescription,

    #[error("organization not found")]
    OrganizationNotFound,

    #[error("member not found")]
    MemberNotFound,

    #[error("organization quota exceeded")]
    OrganizationQuotaExceeded { resets_at: DateTime<Utc> },

    /// `resets_at` is `None` when the lifetime cap was hit.
    #[error("member quota exceeded")]
    MemberQuotaExceeded { resets_at: Option<DateTime<Utc>> },

    #[error("captcha required")]
    CaptchaRequired,

    #[error("incorrect captcha")]
    CaptchaIncorrect,

    #[error("invalid duration: {0}")]
    InvalidDuration(i64),

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("organization already exists")]
    OrganizationExists,

    #[error("member already exists")]
    MemberExists,

    #[error("owner's username cannot be a member's username")]
    OwnerCannotBeMember,

    #[error("maximum organizations for user reached")]
    OrganizationLimitReached,

    #[error("unable to add more members to this organization")]
    MemberLimitReached,

    #[error("payment error: {0}")]
    Payment(#[source] anyhow::Error),

    #[error("{0} is disabled")]
    FeatureDisabled(&'static str),

    #[error("{0} timed out")]
    CollaboratorTimeout(&'static str),

    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("concurrent updates to {0} kept conflicting")]
    Contention(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized | Self::CannotUpdateTagDescription => ErrorKind::Authorization,
            Self::OrganizationNotFound | Self::MemberNotFound => ErrorKind::NotFound,
            Self::OrganizationQuotaExceeded { .. } | Self::MemberQuotaExceeded { .. } => {
                ErrorKind::QuotaExceeded
            }
            Self::CaptchaRequired | Self::CaptchaIncorrect => ErrorKind::Captcha,
            Self::InvalidDuration(_) | Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::OrganizationExists
            | Self::MemberExists
            | Self::OwnerCannotBeMember
            | Self::OrganizationLimitReached
            | Self::MemberLimitReached => ErrorKind::Conflict,
            Self::Payment(_) => ErrorKind::Payment,
            Self::FeatureDisabled(_) => ErrorKind::FeatureDisabled,
            Self::CollaboratorTimeout(_)
            | Self::Collaborator { .. }
            | Self::Contention(_)
            | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// When a quota error is expected to clear, if ever.
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::OrganizationQuotaExceeded { resets_at } => Some(*resets_at),
            Self::MemberQuotaExceeded { resets_at } => *resets_at,
            _ => None,
        }
    }
}
