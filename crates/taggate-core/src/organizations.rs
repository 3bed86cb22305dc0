use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use taggate_types::models::{InstagramChallenge, Organization, RedemptionPeriod};
use taggate_types::time;

use crate::error::{CoreError, Result};
use crate::service::TagService;
use crate::{token, validation};

pub const INSTAGRAM_CHALLENGE_TTL_MS: i64 = 300_000;

/// Public profile lookup used to prove ownership of an Instagram handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Biography text of `handle`, or `None` if the profile does not exist.
    async fn biography(&self, handle: &str) -> anyhow::Result<Option<String>>;
}

/// An organization with counts computed at read time.
#[derive(Debug, Clone)]
pub struct OrganizationSummary {
    pub organization: Organization,
    pub member_count: usize,
    /// Redemptions recorded in the current calendar month.
    pub total_redemptions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstagramVerification {
    /// Put `code` in the profile biography and call again before `expires_at`.
    Pending {
        code: String,
        expires_at: DateTime<Utc>,
    },
    Verified,
}

impl TagService {
    /// Create an organization owned by `caller`. An owner who created one
    /// within the last hour must pass a captcha.
    pub async fn create_organization(
        &self,
        caller: &str,
        name: &str,
        captcha_response: Option<&str>,
    ) -> Result<Organization> {
        validation::organization_name(name)?;

        let now = self.now();
        let owned = self.store.list_organizations_by_owner(caller)?;
        let created_recently = owned
            .iter()
            .any(|org| now - org.created_at <= time::hour());
        if self.config.enable_captcha && created_recently {
            self.challenge(captcha_response).await?;
        }

        if self.store.get_organization(name)?.is_some() {
            return Err(CoreError::OrganizationExists);
        }
        if owned.len() >= self.config.max_organizations_per_owner {
            return Err(CoreError::OrganizationLimitReached);
        }

        let organization = Organization::new(name, caller, now);
        if !self.store.insert_organization(&organization)? {
            return Err(CoreError::OrganizationExists);
        }
        info!(organization = name, owner = caller, "organization created");
        Ok(organization)
    }

    pub fn read_organization(&self, caller: &str, name: &str) -> Result<OrganizationSummary> {
        let organization = self.load_organization(name)?;
        self.actor(&organization, caller)?;
        self.summarize(organization)
    }

    /// Organizations owned by `caller`, by name.
    pub fn list_organizations(&self, caller: &str) -> Result<Vec<OrganizationSummary>> {
        self.store
            .list_organizations_by_owner(caller)?
            .into_iter()
            .map(|organization| self.summarize(organization))
            .collect()
    }

    pub fn delete_organization(&self, caller: &str, name: &str) -> Result<()> {
        let organization = self.load_organization(name)?;
        if organization.owner != caller {
            return Err(CoreError::Unauthorized);
        }
        self.store.delete_organization(name)?;
        info!(organization = name, "organization deleted");
        Ok(())
    }

    /// Two-step handle verification. The first call (or one after the code
    /// lapsed) issues a code; the next looks for it in the biography.
    pub async fn verify_instagram(
        &self,
        caller: &str,
        name: &str,
        handle: &str,
    ) -> Result<InstagramVerification> {
        validation::instagram_handle(handle)?;
        let organization = self.load_organization(name)?;
        if organization.owner != caller {
            return Err(CoreError::Unauthorized);
        }

        let now = self.now();
        let challenge = match organization.instagram_challenge {
            Some(challenge) if now < challenge.expires_at => challenge,
            _ => {
                let challenge = InstagramChallenge {
                    code: token::generate(),
                    expires_at: now + TimeDelta::milliseconds(INSTAGRAM_CHALLENGE_TTL_MS),
                };
                self.store
                    .set_instagram(name, organization.instagram.as_deref(), Some(&challenge))?;
                debug!(organization = name, handle, "instagram code issued");
                return Ok(InstagramVerification::Pending {
                    code: challenge.code,
                    expires_at: challenge.expires_at,
                });
            }
        };

        let biography = self
            .bounded("profile lookup", self.profiles.biography(handle))
            .await?
            .map_err(|source| CoreError::Collaborator {
                collaborator: "profile lookup",
                source,
            })?;

        if !biography.is_some_and(|bio| bio.contains(&challenge.code)) {
            return Err(CoreError::invalid(
                "instagram",
                "verification code not found in profile biography",
            ));
        }

        self.store.set_instagram(name, Some(handle), None)?;
        info!(organization = name, handle, "instagram verified");
        Ok(InstagramVerification::Verified)
    }

    /// Attach counts and apply a lapsed window reset. Losing the reset to
    /// a concurrent generator is fine; the caller still sees the rolled view.
    fn summarize(&self, mut organization: Organization) -> Result<OrganizationSummary> {
        let now = self.now();
        let rolled = organization.tag_window.rolled(now);
        if rolled != organization.tag_window {
            if self
                .store
                .swap_tag_window(&organization.name, &organization.tag_window, &rolled)?
            {
                debug!(organization = %organization.name, "tag window reset on read");
            }
            organization.tag_window = rolled;
        }

        let member_count = self.store.count_members(&organization.name)?;
        let total_redemptions = self
            .store
            .total_redemptions(&organization.name, RedemptionPeriod::containing(now))?;
        Ok(OrganizationSummary {
            organization,
            member_count,
            total_redemptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::MockCaptchaVerifier;
    use crate::config::CoreConfig;
    use crate::service::testing::{harness, quiet, t0};
    use crate::store::Store;
    use crate::subscription::MockPaymentGateway;
    use taggate_types::window::QuotaCounter;

    #[tokio::test]
    async fn create_and_list() {
        let h = quiet(CoreConfig {
            enable_captcha: false,
            ..CoreConfig::default()
        });
        h.service.create_organization("owner", "beta", None).await.unwrap();
        h.service.create_organization("owner", "alpha", None).await.unwrap();

        let names: Vec<String> = h
            .service
            .list_organizations("owner")
            .unwrap()
            .into_iter()
            .map(|s| s.organization.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(matches!(
            h.service.create_organization("other", "alpha", None).await,
            Err(CoreError::OrganizationExists)
        ));
    }

    #[tokio::test]
    async fn second_creation_within_hour_needs_captcha() {
        let h = quiet(CoreConfig::default());
        h.service.create_organization("owner", "alpha", None).await.unwrap();
        assert!(matches!(
            h.service.create_organization("owner", "beta", None).await,
            Err(CoreError::CaptchaRequired)
        ));

        h.clock.advance(TimeDelta::hours(2));
        h.service.create_organization("owner", "beta", None).await.unwrap();
    }

    #[tokio::test]
    async fn owner_limit() {
        let h = quiet(CoreConfig {
            enable_captcha: false,
            max_organizations_per_owner: 1,
            ..CoreConfig::default()
        });
        h.service.create_organization("owner", "alpha", None).await.unwrap();
        assert!(matches!(
            h.service.create_organization("owner", "beta", None).await,
            Err(CoreError::OrganizationLimitReached)
        ));
    }

    #[test]
    fn read_resets_lapsed_window() {
        let h = quiet(CoreConfig::default());
        let org = Organization::new("acme", "owner", t0());
        h.store.insert_organization(&org).unwrap();
        let used = QuotaCounter {
            count: 9,
            window_start: t0(),
        };
        h.store.swap_tag_window("acme", &org.tag_window, &used).unwrap();

        h.clock.advance(TimeDelta::hours(1));
        let summary = h.service.read_organization("owner", "acme").unwrap();
        assert_eq!(summary.organization.tag_window.count, 0);
        let stored = h.store.get_organization("acme").unwrap().unwrap();
        assert_eq!(stored.tag_window.count, 0);
    }

    #[test]
    fn only_owner_deletes() {
        let h = quiet(CoreConfig::default());
        h.store
            .insert_organization(&Organization::new("acme", "owner", t0()))
            .unwrap();
        assert!(matches!(
            h.service.delete_organization("mallory", "acme"),
            Err(CoreError::Unauthorized)
        ));
        h.service.delete_organization("owner", "acme").unwrap();
        assert!(matches!(
            h.service.read_organization("owner", "acme"),
            Err(CoreError::OrganizationNotFound)
        ));
    }

    #[tokio::test]
    async fn instagram_round_trip() {
        let mut profiles = MockProfileDirectory::new();
        profiles
            .expect_biography()
            .times(1)
            .returning(|_| Ok(Some("coffee lovers | code ABC123".to_string())));
        let h = harness(
            CoreConfig::default(),
            MockCaptchaVerifier::new(),
            MockPaymentGateway::new(),
            profiles,
        );
        h.store
            .insert_organization(&Organization::new("acme", "owner", t0()))
            .unwrap();

        let pending = h
            .service
            .verify_instagram("owner", "acme", "acme.coffee")
            .await
            .unwrap();
        assert!(matches!(pending, InstagramVerification::Pending { .. }));

        // Pin the code so the stubbed biography contains it.
        let challenge = InstagramChallenge {
            code: "ABC123".into(),
            expires_at: t0() + TimeDelta::minutes(5),
        };
        h.store.set_instagram("acme", None, Some(&challenge)).unwrap();

        let verified = h
            .service
            .verify_instagram("owner", "acme", "acme.coffee")
            .await
            .unwrap();
        assert_eq!(verified, InstagramVerification::Verified);
        let org = h.store.get_organization("acme").unwrap().unwrap();
        assert_eq!(org.instagram.as_deref(), Some("acme.coffee"));
        assert!(org.instagram_challenge.is_none());
    }

    #[tokio::test]
    async fn lapsed_code_is_reissued() {
        let h = quiet(CoreConfig::default());
        h.store
            .insert_organization(&Organization::new("acme", "owner", t0()))
            .unwrap();
        let first = h
            .service
            .verify_instagram("owner", "acme", "acme.coffee")
            .await
            .unwrap();
        h.clock.advance(TimeDelta::minutes(6));
        let second = h
            .service
            .verify_instagram("owner", "acme", "acme.coffee")
            .await
            .unwrap();
        match (first, second) {
            (
                InstagramVerification::Pending { expires_at: a, .. },
                InstagramVerification::Pending { expires_at: b, .. },
            ) => assert!(b > a),
            other => panic!("expected two pending codes, got {:?}", other),
        }
    }
}
