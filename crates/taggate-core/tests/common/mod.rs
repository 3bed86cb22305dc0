#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use taggate_core::captcha::CaptchaVerifier;
use taggate_core::members::MemberSettings;
use taggate_core::organizations::ProfileDirectory;
use taggate_core::subscription::PaymentGateway;
use taggate_core::{Collaborators, CoreConfig, ManualClock, MemoryStore, TagService};
use taggate_types::models::{PaymentCard, Permissions, TagsPerHour};

/// Accepts exactly the response "human" and counts calls.
#[derive(Default)]
pub struct FakeCaptcha {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CaptchaVerifier for FakeCaptcha {
    async fn verify(&self, response: &str) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(response == "human")
    }
}

/// Records every charge in cents.
#[derive(Default)]
pub struct FakePayments {
    pub charges: Mutex<Vec<u64>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn charge(&self, _card: &PaymentCard, amount_cents: u64) -> anyhow::Result<()> {
        self.charges.lock().unwrap().push(amount_cents);
        Ok(())
    }
}

pub struct NoProfiles;

#[async_trait]
impl ProfileDirectory for NoProfiles {
    async fn biography(&self, _handle: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

pub struct World {
    pub service: Arc<TagService>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub captcha: Arc<FakeCaptcha>,
    pub payments: Arc<FakePayments>,
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

pub fn world(config: CoreConfig) -> World {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let captcha = Arc::new(FakeCaptcha::default());
    let payments = Arc::new(FakePayments::default());
    let service = Arc::new(TagService::new(
        config,
        Collaborators {
            store: store.clone(),
            captcha: captcha.clone(),
            payments: payments.clone(),
            profiles: Arc::new(NoProfiles),
            clock: clock.clone(),
        },
    ));
    World {
        service,
        store,
        clock,
        captcha,
        payments,
    }
}

/// "acme" owned by "owner", with "alice" allowed to generate and scan.
pub async fn acme(world: &World, per_hour: Option<TagsPerHour>, lifetime: Option<u64>) {
    world
        .service
        .create_organization("owner", "acme", None)
        .await
        .unwrap();
    world
        .service
        .add_member(
            "owner",
            "acme",
            "alice",
            MemberSettings {
                permissions: Permissions {
                    allow_generate_tags: true,
                    allow_scan_tags: true,
                    tags_per_hour: per_hour,
                    ..Permissions::default()
                },
                tag_description: "coffee".into(),
                tag_expiration_ms: None,
                tag_generation_limit: lifetime,
            },
        )
        .unwrap();
}

pub fn card() -> PaymentCard {
    PaymentCard {
        cardholder_name: "Jane Doe".into(),
        card_number: "4242424242424242".into(),
        cvv: "123".into(),
        expiration_month: 12,
        expiration_year: 2030,
    }
}
