use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use taggate_types::models::{Member, Organization, RedemptionPeriod, Tag};

use crate::error::{CoreError, Result};
use crate::permissions::Capability;
use crate::quota;
use crate::service::TagService;
use crate::{token, validation};

const MAX_MINT_ATTEMPTS: usize = 8;

impl TagService {
    /// Issue a single-use tag for `organization` on behalf of `caller`.
    ///
    /// Gates run in order: input, caller, description change, quotas,
    /// captcha. Counters are written only after every gate has passed and
    /// are handed back if the tag cannot be stored.
    pub async fn generate_tag(
        &self,
        caller: &str,
        organization: &str,
        description: &str,
        expiration: Option<TimeDelta>,
        captcha_response: Option<&str>,
    ) -> Result<String> {
        validation::tag_description(description)?;
        let expiration_ms = expiration.map(|offset| offset.num_milliseconds());

        let now = self.now();
        let org = self.load_organization(organization)?;
        let actor = self.actor(&org, caller)?;
        actor.require(Capability::GenerateTags)?;

        let member = actor.member();
        let defaults_changed = member.is_some_and(|m| {
            m.tag_description != description || m.tag_expiration_ms != expiration_ms
        });
        if defaults_changed && !actor.has(Capability::UpdateMembers) {
            return Err(CoreError::CannotUpdateTagDescription);
        }

        // A member's unchanged default was validated when it was stored; a
        // new one must be storable as a default.
        match (member, expiration) {
            (Some(_), _) if defaults_changed => validation::member_expiration(expiration_ms)?,
            (Some(_), _) => {}
            (None, Some(offset)) => validation::generate_expiration(offset)?,
            (None, None) => {}
        }

        let org_limit = quota::organization_limit(&self.config, &org.subscription, now);
        quota::check_organization(&org.tag_window, now, org_limit)?;
        if let Some(member) = member {
            quota::check_member(member, now)?;
        }

        let density = self.measure_density(organization, now)?;
        if self.captcha_policy().requires_challenge(density.recent) {
            debug!(organization, recent = density.recent, "captcha demanded");
            self.challenge(captcha_response).await?;
        }

        let member_charge = match member {
            Some(member) => Some(self.charge_member(organization, member, now)?),
            None => None,
        };

        let issued = self.issue_tag(
            &org,
            member,
            description,
            expiration,
            defaults_changed,
            now,
            org_limit,
        );
        if let (Err(e), Some(member), Some(charged)) = (&issued, member, &member_charge) {
            debug!(organization, member = %member.username, "tag not issued ({}), refunding member", e);
            self.refund_member(organization, &member.username, charged);
        }

        let tag = issued?;
        info!(
            organization,
            created_by = %tag.created_by,
            expires_at = ?tag.expires_at,
            "tag generated"
        );
        Ok(tag.token)
    }

    /// Charge the organization window, persist new defaults and store the
    /// tag. The window charge is handed back if the later steps fail.
    #[allow(clippy::too_many_arguments)]
    fn issue_tag(
        &self,
        org: &Organization,
        member: Option<&Member>,
        description: &str,
        expiration: Option<TimeDelta>,
        defaults_changed: bool,
        now: DateTime<Utc>,
        org_limit: Option<u32>,
    ) -> Result<Tag> {
        let organization = org.name.as_str();
        let window = self.charge_organization(organization, org.tag_window, now, org_limit)?;

        let minted = (|| -> Result<Tag> {
            let (created_by, expires_at) = match member {
                Some(member) => {
                    if defaults_changed {
                        self.store_tag_defaults(organization, member, description, expiration)?;
                    }
                    (member.username.clone(), expiration.map(|offset| now + offset))
                }
                None => (org.owner.clone(), None),
            };
            self.mint_tag(organization, description, created_by, now, expires_at)
        })();

        if minted.is_err() {
            self.refund_organization(organization, &window);
        }
        minted
    }

    /// Redeem a tag as an owner or scanning member. A missing or expired
    /// tag is a miss, not an error.
    pub fn verify_tag(&self, caller: &str, organization: &str, token: &str) -> Result<bool> {
        let org = self.load_organization(organization)?;
        let actor = self.actor(&org, caller)?;
        actor.require(Capability::ScanTags)?;

        let redeemed = self.redeem(organization, token)?;
        if redeemed {
            if let Some(member) = actor.member() {
                let period = RedemptionPeriod::containing(self.now());
                let count = self
                    .store
                    .increment_redemption(organization, &member.username, period)?;
                debug!(organization, member = %member.username, count, "redemption recorded");
            }
        }
        Ok(redeemed)
    }

    /// Redeem a tag without authentication. Nothing is attributed.
    pub fn verify_tag_public(&self, organization: &str, token: &str) -> Result<bool> {
        self.load_organization(organization)?;
        self.redeem(organization, token)
    }

    fn redeem(&self, organization: &str, token: &str) -> Result<bool> {
        if !token::is_well_formed(token) {
            return Ok(false);
        }
        let Some(tag) = self.store.get_tag(organization, token)? else {
            return Ok(false);
        };
        if tag.is_expired(self.now()) {
            debug!(organization, token, "expired tag presented");
            return Ok(false);
        }

        // Deletion is the single-use gate: of two concurrent redeemers
        // only one sees `true`.
        let redeemed = self.store.delete_tag(organization, token)?;
        if redeemed {
            info!(organization, token, created_by = %tag.created_by, "tag redeemed");
        }
        Ok(redeemed)
    }

    fn store_tag_defaults(
        &self,
        organization: &str,
        member: &Member,
        description: &str,
        expiration: Option<TimeDelta>,
    ) -> Result<()> {
        let updated = Member {
            tag_description: description.to_string(),
            tag_expiration_ms: expiration.map(|offset| offset.num_milliseconds()),
            ..member.clone()
        };
        if !self.store.update_member(organization, &updated)? {
            return Err(CoreError::MemberNotFound);
        }
        debug!(organization, member = %member.username, "tag defaults updated");
        Ok(())
    }

    fn mint_tag(
        &self,
        organization: &str,
        description: &str,
        created_by: String,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Tag> {
        let mut tag = Tag {
            token: String::new(),
            description: description.to_string(),
            created_by,
            created_at: now,
            expires_at,
        };
        for _ in 0..MAX_MINT_ATTEMPTS {
            tag.token = token::generate();
            if self.store.insert_tag(organization, &tag)? {
                return Ok(tag);
            }
            warn!(organization, "tag token collision, drawing again");
        }
        Err(CoreError::Contention("tag tokens"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::MockCaptchaVerifier;
    use crate::config::CoreConfig;
    use crate::organizations::MockProfileDirectory;
    use crate::service::testing::{Harness, harness, quiet, t0};
    use crate::store::Store;
    use crate::subscription::MockPaymentGateway;
    use taggate_types::models::{MemberUsage, Organization, Permissions};

    fn setup(config: CoreConfig) -> Harness {
        let h = quiet(config);
        seed(&h);
        h
    }

    fn seed(h: &Harness) {
        h.store
            .insert_organization(&Organization::new("acme", "owner", t0()))
            .unwrap();
        h.store
            .insert_member(
                "acme",
                &Member {
                    username: "alice".into(),
                    permissions: Permissions {
                        allow_scan_tags: true,
                        ..Permissions::default()
                    },
                    tag_description: "coffee".into(),
                    tag_expiration_ms: Some(60_000),
                    tag_generation_limit: None,
                    usage: MemberUsage::new(t0()),
                    created_at: t0(),
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn member_tag_carries_expiry() {
        let h = setup(CoreConfig::default());
        let token = h
            .service
            .generate_tag("alice", "acme", "coffee", Some(TimeDelta::minutes(1)), None)
            .await
            .unwrap();

        let tag = h.store.get_tag("acme", &token).unwrap().unwrap();
        assert_eq!(tag.created_by, "alice");
        assert_eq!(tag.expires_at, Some(t0() + TimeDelta::minutes(1)));
        assert!(token::is_well_formed(&token));
    }

    #[tokio::test]
    async fn owner_tag_never_expires() {
        let h = setup(CoreConfig::default());
        let token = h
            .service
            .generate_tag("owner", "acme", "anything", Some(TimeDelta::minutes(1)), None)
            .await
            .unwrap();
        let tag = h.store.get_tag("acme", &token).unwrap().unwrap();
        assert_eq!(tag.created_by, "owner");
        assert_eq!(tag.expires_at, None);
    }

    #[tokio::test]
    async fn member_cannot_change_description_without_update() {
        let h = setup(CoreConfig::default());
        let err = h
            .service
            .generate_tag("alice", "acme", "tea", Some(TimeDelta::minutes(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CannotUpdateTagDescription));

        let err = h
            .service
            .generate_tag("alice", "acme", "coffee", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CannotUpdateTagDescription));
    }

    #[tokio::test]
    async fn member_with_update_rewrites_defaults() {
        let h = setup(CoreConfig::default());
        let mut alice = h.store.get_member("acme", "alice").unwrap().unwrap();
        alice.permissions.accounts.update = true;
        h.store.update_member("acme", &alice).unwrap();

        h.service
            .generate_tag("alice", "acme", "tea", None, None)
            .await
            .unwrap();
        let stored = h.store.get_member("acme", "alice").unwrap().unwrap();
        assert_eq!(stored.tag_description, "tea");
        assert_eq!(stored.tag_expiration_ms, None);
        assert_eq!(stored.usage.total_tag_count, 1);
    }

    #[tokio::test]
    async fn stranger_and_unknown_organization() {
        let h = setup(CoreConfig::default());
        assert!(matches!(
            h.service.generate_tag("mallory", "acme", "", None, None).await,
            Err(CoreError::Unauthorized)
        ));
        assert!(matches!(
            h.service.generate_tag("owner", "nope", "", None, None).await,
            Err(CoreError::OrganizationNotFound)
        ));
        assert!(matches!(
            h.service.verify_tag("owner", "nope", "AAAAAA"),
            Err(CoreError::OrganizationNotFound)
        ));
    }

    #[tokio::test]
    async fn bad_input_is_rejected_before_lookup() {
        let h = setup(CoreConfig::default());
        let err = h
            .service
            .generate_tag("owner", "nope", "bang!", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn redeem_once_and_attribute() {
        let h = setup(CoreConfig::default());
        let token = h
            .service
            .generate_tag("owner", "acme", "", None, None)
            .await
            .unwrap();

        assert!(h.service.verify_tag("alice", "acme", &token).unwrap());
        assert!(!h.service.verify_tag("alice", "acme", &token).unwrap());

        let period = RedemptionPeriod::containing(t0());
        let redemption = h.store.get_redemption("acme", "alice", period).unwrap().unwrap();
        assert_eq!(redemption.count, 1);
    }

    #[tokio::test]
    async fn owner_redemptions_are_not_recorded() {
        let h = setup(CoreConfig::default());
        let token = h
            .service
            .generate_tag("owner", "acme", "", None, None)
            .await
            .unwrap();
        assert!(h.service.verify_tag("owner", "acme", &token).unwrap());
        let period = RedemptionPeriod::containing(t0());
        assert_eq!(h.store.total_redemptions("acme", period).unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_tag_is_a_soft_miss() {
        let h = setup(CoreConfig::default());
        let token = h
            .service
            .generate_tag("alice", "acme", "coffee", Some(TimeDelta::minutes(1)), None)
            .await
            .unwrap();

        h.clock.advance(TimeDelta::minutes(1));
        assert!(!h.service.verify_tag("owner", "acme", &token).unwrap());
        assert!(!h.service.verify_tag_public("acme", &token).unwrap());
        assert!(h.store.get_tag("acme", &token).unwrap().is_some());
    }

    #[tokio::test]
    async fn long_stored_default_can_still_be_used() {
        let h = setup(CoreConfig::default());
        let mut alice = h.store.get_member("acme", "alice").unwrap().unwrap();
        alice.tag_expiration_ms = Some(1_000_000_000_000);
        h.store.update_member("acme", &alice).unwrap();

        let token = h
            .service
            .generate_tag(
                "alice",
                "acme",
                "coffee",
                Some(TimeDelta::milliseconds(1_000_000_000_000)),
                None,
            )
            .await
            .unwrap();
        let tag = h.store.get_tag("acme", &token).unwrap().unwrap();
        assert_eq!(
            tag.expires_at,
            Some(t0() + TimeDelta::milliseconds(1_000_000_000_000))
        );
    }

    #[tokio::test]
    async fn new_default_expiration_must_be_storable() {
        let h = setup(CoreConfig::default());
        let mut alice = h.store.get_member("acme", "alice").unwrap().unwrap();
        alice.permissions.accounts.update = true;
        h.store.update_member("acme", &alice).unwrap();

        let err = h
            .service
            .generate_tag("alice", "acme", "coffee", Some(TimeDelta::zero()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));

        let stored = h.store.get_member("acme", "alice").unwrap().unwrap();
        assert_eq!(stored.tag_expiration_ms, Some(60_000));
        assert_eq!(stored.usage.total_tag_count, 0);
    }

    #[tokio::test]
    async fn owner_expiration_is_range_checked() {
        let h = setup(CoreConfig::default());
        let err = h
            .service
            .generate_tag("owner", "acme", "", Some(TimeDelta::milliseconds(-1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn failed_window_charge_refunds_member() {
        let h = setup(CoreConfig::default());
        let mut alice = h.store.get_member("acme", "alice").unwrap().unwrap();
        alice.tag_generation_limit = Some(3);
        h.store.update_member("acme", &alice).unwrap();

        h.store.set_window_contention(true);
        let err = h
            .service
            .generate_tag("alice", "acme", "coffee", Some(TimeDelta::minutes(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Contention(_)));

        let stored = h.store.get_member("acme", "alice").unwrap().unwrap();
        assert_eq!(stored.usage, alice.usage);
        assert!(h.store.list_tag_index("acme").unwrap().is_empty());

        h.store.set_window_contention(false);
        for _ in 0..3 {
            h.service
                .generate_tag("alice", "acme", "coffee", Some(TimeDelta::minutes(1)), None)
                .await
                .unwrap();
        }
        let stored = h.store.get_member("acme", "alice").unwrap().unwrap();
        assert_eq!(stored.usage.total_tag_count, 3);
    }

    #[tokio::test]
    async fn scanning_needs_permission() {
        let h = setup(CoreConfig::default());
        let mut alice = h.store.get_member("acme", "alice").unwrap().unwrap();
        alice.permissions.allow_scan_tags = false;
        h.store.update_member("acme", &alice).unwrap();
        assert!(matches!(
            h.service.verify_tag("alice", "acme", "AAAAAA"),
            Err(CoreError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn malformed_token_is_a_miss() {
        let h = setup(CoreConfig::default());
        assert!(!h.service.verify_tag_public("acme", "not-a-token").unwrap());
    }

    #[tokio::test]
    async fn captcha_failure_leaves_counters_alone() {
        let config = CoreConfig {
            max_tags_per_hour_until_captcha_required: 1,
            ..CoreConfig::default()
        };
        let mut verifier = MockCaptchaVerifier::new();
        verifier.expect_verify().returning(|_| Ok(false));
        let h = harness(
            config,
            verifier,
            MockPaymentGateway::new(),
            MockProfileDirectory::new(),
        );
        seed(&h);

        h.service
            .generate_tag("owner", "acme", "", None, None)
            .await
            .unwrap();
        let err = h
            .service
            .generate_tag("owner", "acme", "", None, Some("robot"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CaptchaIncorrect));

        let org = h.store.get_organization("acme").unwrap().unwrap();
        assert_eq!(org.tag_window.count, 1);
        assert_eq!(h.store.list_tag_index("acme").unwrap().len(), 1);
    }
}
