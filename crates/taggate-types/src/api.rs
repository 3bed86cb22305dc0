use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Member, PaymentCard, Permissions, Redemption, RedemptionPeriod, Subscription};

// -- JWT Claims --

/// JWT claims issued by `/api/auth/*` and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Tags --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateTagRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expiration_ms: Option<i64>,
    #[serde(default)]
    pub captcha_response: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateTagResponse {
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyTagResponse {
    pub is_valid: bool,
}

// -- Organizations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrganizationRequest {
    pub organization: String,
    #[serde(default)]
    pub captcha_response: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrganizationResponse {
    pub name: String,
    pub owner: String,
    pub member_count: usize,
    pub instagram: Option<String>,
    pub subscription: Subscription,
    pub tag_count: u32,
    pub total_redemptions: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstagramRequest {
    pub instagram: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstagramResponse {
    pub verified: bool,
    pub verification_code: Option<String>,
    pub instructions: Option<String>,
}

// -- Premium --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PremiumRequest {
    pub duration: i64,
    pub card_details: PaymentCard,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PremiumResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DealsResponse {
    pub silver: u64,
    pub gold: u64,
    pub platinum: u64,
    pub diamond: u64,
}

// -- Members --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub username: String,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub tag_description: String,
    #[serde(default)]
    pub tag_expiration_ms: Option<i64>,
    #[serde(default)]
    pub tag_generation_limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemberRequest {
    pub permissions: Permissions,
    #[serde(default)]
    pub tag_description: String,
    #[serde(default)]
    pub tag_expiration_ms: Option<i64>,
    #[serde(default)]
    pub tag_generation_limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub username: String,
    pub permissions: Permissions,
    pub tag_description: String,
    pub tag_expiration_ms: Option<i64>,
    pub tag_generation_limit: Option<u64>,
    pub tag_count: u32,
    pub total_tag_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            username: member.username,
            permissions: member.permissions,
            tag_description: member.tag_description,
            tag_expiration_ms: member.tag_expiration_ms,
            tag_generation_limit: member.tag_generation_limit,
            tag_count: member.usage.window.count,
            total_tag_count: member.usage.total_tag_count,
            created_at: member.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    30
}

// -- Redemptions --

#[derive(Debug, Deserialize)]
pub struct RedemptionsQuery {
    #[serde(default)]
    pub months_ago: u32,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedemptionResponse {
    pub username: String,
    pub period: RedemptionPeriod,
    pub count: u64,
}

impl From<Redemption> for RedemptionResponse {
    fn from(redemption: Redemption) -> Self {
        Self {
            username: redemption.username,
            period: redemption.period,
            count: redemption.count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedemptionsResponse {
    pub redemptions: Vec<RedemptionResponse>,
    pub total_redemptions: u64,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
