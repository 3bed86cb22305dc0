use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use taggate_types::models::TagIndexEntry;
use taggate_types::time;

use crate::error::{CoreError, Result};
use crate::service::TagService;

/// Remote human-verification check.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(false)` means the response was checked and rejected.
    async fn verify(&self, response: &str) -> anyhow::Result<bool>;
}

/// An organization's tag index split by age at one instant.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagDensity {
    /// Entries created within the last hour.
    pub recent: usize,
    /// Tokens of entries older than an hour.
    pub stale: Vec<String>,
}

impl TagDensity {
    pub fn measure(entries: &[TagIndexEntry], now: DateTime<Utc>) -> Self {
        let mut density = Self::default();
        for entry in entries {
            if now - entry.created_at <= time::hour() {
                density.recent += 1;
            } else {
                density.stale.push(entry.token.clone());
            }
        }
        density
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptchaPolicy {
    pub enabled: bool,
    pub threshold: u32,
}

impl CaptchaPolicy {
    pub fn requires_challenge(&self, recent: usize) -> bool {
        self.enabled && recent >= self.threshold as usize
    }
}

impl TagService {
    pub fn captcha_policy(&self) -> CaptchaPolicy {
        CaptchaPolicy {
            enabled: self.config.enable_captcha,
            threshold: self.config.max_tags_per_hour_until_captcha_required,
        }
    }

    /// Count recent tags and drop stale index entries. A failed drop is
    /// logged and ignored.
    pub(crate) fn measure_density(
        &self,
        organization: &str,
        now: DateTime<Utc>,
    ) -> Result<TagDensity> {
        let index = self.store.list_tag_index(organization)?;
        let density = TagDensity::measure(&index, now);

        if !density.stale.is_empty() {
            match self.store.unindex_tags(organization, &density.stale) {
                Ok(()) => debug!(organization, stale = density.stale.len(), "swept tag index"),
                Err(e) => warn!(organization, "tag index sweep failed: {:#}", e),
            }
            match self.store.purge_expired_tags(organization, now) {
                Ok(0) => {}
                Ok(purged) => debug!(organization, purged, "purged expired tags"),
                Err(e) => warn!(organization, "expired tag purge failed: {:#}", e),
            }
        }

        Ok(density)
    }

    /// Demand a captcha response and have it checked.
    pub(crate) async fn challenge(&self, response: Option<&str>) -> Result<()> {
        let Some(response) = response.filter(|r| !r.is_empty()) else {
            return Err(CoreError::CaptchaRequired);
        };

        let accepted = self
            .bounded("captcha verification", self.captcha.verify(response))
            .await?
            .map_err(|source| CoreError::Collaborator {
                collaborator: "captcha verification",
                source,
            })?;

        if accepted {
            Ok(())
        } else {
            debug!("captcha response rejected");
            Err(CoreError::CaptchaIncorrect)
        }
    }
}
