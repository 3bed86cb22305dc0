use std::time::Duration;

use taggate_types::time::{Deal, MONTH_MS};

/// Monthly cost of each deal tier, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealCosts {
    pub silver: u64,
    pub gold: u64,
    pub platinum: u64,
    pub diamond: u64,
}

impl DealCosts {
    pub fn monthly(&self, deal: Deal) -> u64 {
        match deal {
            Deal::Silver => self.silver,
            Deal::Gold => self.gold,
            Deal::Platinum => self.platinum,
            Deal::Diamond => self.diamond,
        }
    }

    /// Monthly rate prorated over the deal's duration, in cents.
    pub fn total(&self, deal: Deal) -> u64 {
        let total = self.monthly(deal) as u128 * deal.duration_ms() as u128 / MONTH_MS as u128;
        total.min(u64::MAX as u128) as u64
    }
}

impl Default for DealCosts {
    fn default() -> Self {
        Self {
            silver: 999,
            gold: 899,
            platinum: 799,
            diamond: 699,
        }
    }
}

/// Immutable engine configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub enable_captcha: bool,
    pub enable_premium: bool,
    pub enable_card_payment: bool,
    /// Recent organization-wide tags allowed before a captcha is demanded.
    pub max_tags_per_hour_until_captcha_required: u32,
    /// Organization-wide hourly cap on the free tier.
    pub max_unsubscribed_tags_per_hour: u32,
    pub max_members_per_organization: usize,
    pub max_organizations_per_owner: usize,
    pub deal_costs: DealCosts,
    /// Upper bound on any captcha, payment or profile call.
    pub collaborator_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            enable_captcha: true,
            enable_premium: false,
            enable_card_payment: false,
            max_tags_per_hour_until_captcha_required: 30,
            max_unsubscribed_tags_per_hour: 60,
            max_members_per_organization: 50,
            max_organizations_per_owner: 10,
            deal_costs: DealCosts::default(),
            collaborator_timeout: Duration::from_secs(5),
        }
    }
}
