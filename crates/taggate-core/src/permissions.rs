use taggate_types::models::{Member, Organization};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    GenerateTags,
    ScanTags,
    CreateMembers,
    UpdateMembers,
    DeleteMembers,
}

/// The caller's relationship to an organization.
#[derive(Debug, Clone)]
pub enum Actor {
    Owner,
    Member(Member),
}

impl Actor {
    /// The owner is implicit; anyone else needs a member record.
    pub fn resolve(organization: &Organization, member: Option<Member>, caller: &str) -> Result<Self> {
        if organization.owner == caller {
            return Ok(Actor::Owner);
        }
        member.map(Actor::Member).ok_or(CoreError::Unauthorized)
    }

    pub fn has(&self, capability: Capability) -> bool {
        let member = match self {
            Actor::Owner => return true,
            Actor::Member(member) => member,
        };
        let permissions = &member.permissions;
        match capability {
            Capability::GenerateTags => permissions.allow_generate_tags,
            Capability::ScanTags => permissions.allow_scan_tags,
            Capability::CreateMembers => permissions.accounts.create,
            Capability::UpdateMembers => permissions.accounts.update,
            Capability::DeleteMembers => permissions.accounts.delete,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized)
        }
    }

    pub fn member(&self) -> Option<&Member> {
        match self {
            Actor::Owner => None,
            Actor::Member(member) => Some(member),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Actor::Owner)
    }
}
