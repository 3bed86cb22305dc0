use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use taggate_core::{CoreConfig, DealCosts};

/// Placeholder JWT secrets that MUST NOT be used.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// `None` when unset or zero.
    pub max_requests_per_hour: Option<u32>,
    pub hcaptcha_secret: String,
    pub payment_gateway_url: String,
    pub core: CoreConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `TAGGATE_*` variables resolved by `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| var(&format!("TAGGATE_{}", name)).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) || jwt_secret.is_empty() {
            bail!("TAGGATE_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse(&get, "PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let defaults = CoreConfig::default();
        let costs = DealCosts::default();
        let core = CoreConfig {
            enable_captcha: flag(&get, "ENABLE_CAPTCHA", defaults.enable_captcha)?,
            enable_premium: flag(&get, "ENABLE_PREMIUM", defaults.enable_premium)?,
            enable_card_payment: flag(&get, "ENABLE_CARD_PAYMENTS", defaults.enable_card_payment)?,
            max_tags_per_hour_until_captcha_required: parse(
                &get,
                "MAX_TAGS_PER_HOUR_UNTIL_CAPTCHA_REQUIRED",
                defaults.max_tags_per_hour_until_captcha_required,
            )?,
            max_unsubscribed_tags_per_hour: parse(
                &get,
                "MAX_UNSUBSCRIBED_TAGS_PER_HOUR",
                defaults.max_unsubscribed_tags_per_hour,
            )?,
            max_members_per_organization: parse(
                &get,
                "MAX_MEMBERS_PER_ORGANIZATION",
                defaults.max_members_per_organization,
            )?,
            deal_costs: DealCosts {
                silver: parse(&get, "DEAL_COST_SILVER", costs.silver)?,
                gold: parse(&get, "DEAL_COST_GOLD", costs.gold)?,
                platinum: parse(&get, "DEAL_COST_PLATINUM", costs.platinum)?,
                diamond: parse(&get, "DEAL_COST_DIAMOND", costs.diamond)?,
            },
            ..defaults
        };

        let max_requests_per_hour: u32 = parse(&get, "MAX_REQUESTS_PER_HOUR", 0)?;

        Ok(Self {
            addr,
            db_path: get("DB_PATH").unwrap_or_else(|| "taggate.db".into()).into(),
            jwt_secret,
            max_requests_per_hour: (max_requests_per_hour > 0).then_some(max_requests_per_hour),
            hcaptcha_secret: get("HCAPTCHA_SECRET").unwrap_or_default(),
            payment_gateway_url: get("PAYMENT_GATEWAY_URL").unwrap_or_default(),
            core,
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("TAGGATE_{} is not valid: {:?}", name, raw)),
        None => Ok(default),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> Result<bool> {
    match get(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => bail!("TAGGATE_{} is not a boolean: {:?}", name, other),
    }
}
