use async_trait::async_trait;
use tracing::{info, warn};

use taggate_types::models::{PaymentCard, Subscription};
use taggate_types::time::Deal;

use crate::config::DealCosts;
use crate::error::{CoreError, Result};
use crate::service::TagService;
use crate::validation;

/// Card processor. An `Err` is a declined or failed charge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, card: &PaymentCard, amount_cents: u64) -> anyhow::Result<()>;
}

impl TagService {
    pub fn deal_costs(&self) -> Result<DealCosts> {
        if !self.config.enable_premium {
            return Err(CoreError::FeatureDisabled("premium"));
        }
        Ok(self.config.deal_costs)
    }

    /// Buy `duration_ms` of premium for `organization`. The duration must
    /// be exactly one of the deal lengths. Time is added on top of a live
    /// subscription and starts now otherwise.
    pub async fn upgrade_to_premium(
        &self,
        organization: &str,
        duration_ms: i64,
        card: &PaymentCard,
    ) -> Result<Subscription> {
        if !self.config.enable_premium {
            return Err(CoreError::FeatureDisabled("premium"));
        }
        let deal = Deal::from_duration_ms(duration_ms).ok_or(CoreError::InvalidDuration(duration_ms))?;
        self.load_organization(organization)?;

        if self.config.enable_card_payment {
            validation::payment_card(card, self.now())?;
            let amount = self.config.deal_costs.total(deal);
            self.bounded("payment", self.payments.charge(card, amount))
                .await?
                .map_err(|e| {
                    warn!(organization, ?deal, "charge failed: {:#}", e);
                    CoreError::Payment(e)
                })?;
            info!(organization, ?deal, amount, "card charged");
        }

        // Re-read so a renewal that landed during the charge is stacked on.
        let org = self.load_organization(organization)?;
        let now = self.now();
        let subscription = org.subscription.extended(now, deal.duration());
        self.store.set_subscription(organization, &subscription)?;
        info!(organization, ?deal, expires_at = ?subscription.expires_at, "premium extended");
        Ok(subscription)
    }
}
