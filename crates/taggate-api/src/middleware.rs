use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use taggate_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Validate the bearer JWT and expose its claims to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// First hop of `X-Forwarded-For`, falling back to the peer address.
fn client_ip(req: &Request) -> Option<IpAddr> {
    forwarded_for(req.headers()).or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Hourly per-IP request cap. Addresses are stored only as SHA-256 digests.
pub async fn throttle_by_ip(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(limit) = state.max_requests_per_hour else {
        return Ok(next.run(req).await);
    };
    let Some(ip) = client_ip(&req) else {
        debug!("no client address on request, not throttling");
        return Ok(next.run(req).await);
    };

    let ip_hash = hex::encode(Sha256::digest(ip.to_string().as_bytes()));
    let now = state.service.now();
    if let Some(resets_at) = state
        .db
        .throttle_ip(&ip_hash, now, limit)
        .map_err(ApiError::internal)?
    {
        warn!(ip_hash = %&ip_hash[..12], %resets_at, "request throttled");
        return Err(
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "too many requests").retry_at(resets_at),
        );
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.1"),
        );
        assert_eq!(forwarded_for(&headers), "198.51.100.4".parse().ok());

        headers.insert("x-forwarded-for", HeaderValue::from_static("not an ip"));
        assert_eq!(forwarded_for(&headers), None);
    }
}
