use taggate_types::models::{Redemption, RedemptionPeriod};

use crate::error::{CoreError, Result};
use crate::service::TagService;
use crate::validation;

/// How far back redemption history can be read.
pub const MAX_MONTHS_AGO: u32 = 3;

/// A page of per-member counts for one month, plus the month's total.
#[derive(Debug, Clone)]
pub struct RedemptionReport {
    pub period: RedemptionPeriod,
    pub redemptions: Vec<Redemption>,
    pub total_redemptions: u64,
}

impl TagService {
    fn period(&self, months_ago: u32) -> Result<RedemptionPeriod> {
        if months_ago > MAX_MONTHS_AGO {
            return Err(CoreError::invalid("months ago", "must be between 0 and 3"));
        }
        Ok(RedemptionPeriod::months_before(self.now(), months_ago))
    }

    pub fn list_redemptions(
        &self,
        caller: &str,
        organization: &str,
        months_ago: u32,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RedemptionReport> {
        let period = self.period(months_ago)?;
        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?;

        let redemptions = self.store.list_redemptions(
            organization,
            period,
            filter,
            offset,
            validation::page_size(limit),
        )?;
        let total_redemptions = self.store.total_redemptions(organization, period)?;
        Ok(RedemptionReport {
            period,
            redemptions,
            total_redemptions,
        })
    }

    /// One member's count for the month; zero if nothing was recorded.
    pub fn read_redemption(
        &self,
        caller: &str,
        organization: &str,
        username: &str,
        months_ago: u32,
    ) -> Result<Redemption> {
        let period = self.period(months_ago)?;
        let org = self.load_organization(organization)?;
        self.actor(&org, caller)?;

        Ok(self
            .store
            .get_redemption(organization, username, period)?
            .unwrap_or_else(|| Redemption {
                username: username.to_string(),
                period,
                count: 0,
            }))
    }
}
