use tracing::info;

use taggate_types::models::{Member, MemberUsage, Permissions};

use crate::error::{CoreError, Result};
use crate::permissions::Capability;
use crate::service::TagService;
use crate::validation;

/// Everything about a member an administrator may set.
#[derive(Debug, Clone, Default)]
pub struct MemberSettings {
    pub permissions: Permissions,
    pub tag_description: String,
    pub tag_expiration_ms: Option<i64>,
    pub tag_generation_limit: Option<u64>,
}

impl MemberSettings {
    fn validate(&self) -> Result<()> {
        validation::tag_description(&self.tag_description)?;
        validation::member_expiration(self.tag_expiration_ms)
    }
}

impl TagService {
    pub fn add_member(
        &self,
        caller: &str,
        organization: &str,
        username: &str,
        settings: MemberSettings,
    ) -> Result<Member> {
        validation::username(username)?;
        settings.validate()?;

        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?.require(Capability::CreateMembers)?;
        if org.owner == username {
            return Err(CoreError::OwnerCannotBeMember);
        }
        if self.store.count_members(organization)? >= self.config.max_members_per_organization {
            return Err(CoreError::MemberLimitReached);
        }

        let now = self.now();
        let member = Member {
            username: username.to_string(),
            permissions: settings.permissions,
            tag_description: settings.tag_description,
            tag_expiration_ms: settings.tag_expiration_ms,
            tag_generation_limit: settings.tag_generation_limit,
            usage: MemberUsage::new(now),
            created_at: now,
        };
        if !self.store.insert_member(organization, &member)? {
            return Err(CoreError::MemberExists);
        }
        info!(organization, member = username, added_by = caller, "member added");
        Ok(member)
    }

    /// Replace a member's settings. Usage counters are kept.
    pub fn update_member(
        &self,
        caller: &str,
        organization: &str,
        username: &str,
        settings: MemberSettings,
    ) -> Result<Member> {
        settings.validate()?;

        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?.require(Capability::UpdateMembers)?;
        let current = self
            .store
            .get_member(organization, username)?
            .ok_or(CoreError::MemberNotFound)?;

        let updated = Member {
            permissions: settings.permissions,
            tag_description: settings.tag_description,
            tag_expiration_ms: settings.tag_expiration_ms,
            tag_generation_limit: settings.tag_generation_limit,
            ..current
        };
        if !self.store.update_member(organization, &updated)? {
            return Err(CoreError::MemberNotFound);
        }
        info!(organization, member = username, updated_by = caller, "member updated");
        Ok(updated)
    }

    pub fn delete_member(&self, caller: &str, organization: &str, username: &str) -> Result<()> {
        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?.require(Capability::DeleteMembers)?;
        if !self.store.delete_member(organization, username)? {
            return Err(CoreError::MemberNotFound);
        }
        info!(organization, member = username, deleted_by = caller, "member deleted");
        Ok(())
    }

    /// Any member may list; usernames are matched by prefix.
    pub fn list_members(
        &self,
        caller: &str,
        organization: &str,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Member>> {
        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?;
        Ok(self.store.list_members(
            organization,
            filter,
            offset,
            validation::page_size(limit),
        )?)
    }
}
