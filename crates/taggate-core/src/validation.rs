use std::sync::LazyLock;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use regex::Regex;

use taggate_types::models::PaymentCard;

use crate::error::{CoreError, Result};

static ORGANIZATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9 _]{1,60}$").expect("valid regex"));
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,12}$").expect("valid regex"));
static TAG_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 ,.]{0,40}$").expect("valid regex"));
static INSTAGRAM_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w[\w.]{1,28}\w$").expect("valid regex"));
static PASSWORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@$!%*#?& ]{8,}$").expect("valid regex"));

/// Longest expiration a caller may request when generating a tag (~5 years).
pub const MAX_GENERATE_EXPIRATION_MS: i64 = 157_800_000_000;
pub const MIN_MEMBER_EXPIRATION_MS: i64 = 1_000;
pub const MAX_MEMBER_EXPIRATION_MS: i64 = 9_999_999_999_999;
pub const MAX_PAGE_SIZE: usize = 30;

pub fn organization_name(name: &str) -> Result<()> {
    if ORGANIZATION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::invalid(
            "organization name",
            "must be 1-60 of a-z, 0-9, space or underscore",
        ))
    }
}

pub fn username(name: &str) -> Result<()> {
    if USERNAME.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::invalid(
            "username",
            "must be 1-12 of a-z, 0-9 or underscore",
        ))
    }
}

pub fn password(password: &str) -> Result<()> {
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| "@$!%*#?&".contains(c));
    if PASSWORD_CHARS.is_match(password) && has_letter && has_digit && has_symbol {
        Ok(())
    } else {
        Err(CoreError::invalid(
            "password",
            "needs 8+ characters with a letter, a digit and one of @$!%*#?&",
        ))
    }
}

pub fn tag_description(description: &str) -> Result<()> {
    if TAG_DESCRIPTION.is_match(description) {
        Ok(())
    } else {
        Err(CoreError::invalid(
            "tag description",
            "must be at most 40 letters, digits, spaces, commas or periods",
        ))
    }
}

/// Expiration offset passed to tag generation.
pub fn generate_expiration(offset: TimeDelta) -> Result<()> {
    let ms = offset.num_milliseconds();
    if (0..=MAX_GENERATE_EXPIRATION_MS).contains(&ms) {
        Ok(())
    } else {
        Err(CoreError::invalid("expiration", "out of range"))
    }
}

/// Default expiration offset stored on a member.
pub fn member_expiration(ms: Option<i64>) -> Result<()> {
    match ms {
        Some(ms) if !(MIN_MEMBER_EXPIRATION_MS..=MAX_MEMBER_EXPIRATION_MS).contains(&ms) => Err(
            CoreError::invalid("tag expiration", "must be between 1 second and ~317 years"),
        ),
        _ => Ok(()),
    }
}

pub fn instagram_handle(handle: &str) -> Result<()> {
    if INSTAGRAM_HANDLE.is_match(handle) && !handle.contains("..") {
        Ok(())
    } else {
        Err(CoreError::invalid("instagram handle", "not a valid handle"))
    }
}

pub fn page_size(limit: usize) -> usize {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        MAX_PAGE_SIZE
    } else {
        limit
    }
}

pub fn payment_card(card: &PaymentCard, now: DateTime<Utc>) -> Result<()> {
    let name = card.cardholder_name.trim();
    if name.is_empty()
        || name.len() > 60
        || !name
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'' || c == '.')
    {
        return Err(CoreError::invalid("cardholder name", "not a valid name"));
    }

    let number = &card.card_number;
    if !(8..=19).contains(&number.len())
        || !number.bytes().all(|b| b.is_ascii_digit())
        || !luhn(number)
    {
        return Err(CoreError::invalid("card number", "not a valid card number"));
    }

    if !(3..=4).contains(&card.cvv.len()) || !card.cvv.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid("cvv", "must be 3 or 4 digits"));
    }

    if !(1..=12).contains(&card.expiration_month) {
        return Err(CoreError::invalid("expiration month", "must be 1-12"));
    }

    let expired = card.expiration_year < now.year()
        || (card.expiration_year == now.year() && card.expiration_month < now.month());
    if expired || card.expiration_year > now.year() + 20 {
        return Err(CoreError::invalid("expiration year", "card is expired or date is implausible"));
    }

    Ok(())
}

fn luhn(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
