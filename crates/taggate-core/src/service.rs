use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use taggate_types::models::Organization;

use crate::captcha::CaptchaVerifier;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::organizations::ProfileDirectory;
use crate::permissions::Actor;
use crate::store::Store;
use crate::subscription::PaymentGateway;

/// Everything the engine talks to but does not own.
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub profiles: Arc<dyn ProfileDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// The tag engine. Operations are spread over the modules of this crate
/// as separate `impl TagService` blocks.
pub struct TagService {
    pub(crate) config: CoreConfig,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) captcha: Arc<dyn CaptchaVerifier>,
    pub(crate) payments: Arc<dyn PaymentGateway>,
    pub(crate) profiles: Arc<dyn ProfileDirectory>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl TagService {
    pub fn new(config: CoreConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            store: collaborators.store,
            captcha: collaborators.captcha,
            payments: collaborators.payments,
            profiles: collaborators.profiles,
            clock: collaborators.clock,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn load_organization(&self, name: &str) -> Result<Organization> {
        self.store
            .get_organization(name)?
            .ok_or(CoreError::OrganizationNotFound)
    }

    /// Resolve `caller` as owner or member of `organization`.
    pub(crate) fn actor(&self, organization: &Organization, caller: &str) -> Result<Actor> {
        let member = if organization.owner == caller {
            None
        } else {
            self.store.get_member(&organization.name, caller)?
        };
        Actor::resolve(organization, member, caller)
    }

    /// Await a remote call under the configured timeout. The inner result
    /// is the collaborator's own answer, left for the caller to classify.
    pub(crate) async fn bounded<T, F>(
        &self,
        collaborator: &'static str,
        call: F,
    ) -> Result<anyhow::Result<T>>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::time::timeout(self.config.collaborator_timeout, call)
            .await
            .map_err(|_| {
                warn!(collaborator, "collaborator call timed out");
                CoreError::CollaboratorTimeout(collaborator)
            })
    }
}
