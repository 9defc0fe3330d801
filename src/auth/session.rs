//! Sign-in nonces and the session cookie.

use crate::auth::address::WalletAddress;
use axum::http::{header, HeaderMap};
use cookie::{Cookie, SameSite};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Name of the cookie carrying the signed-in address.
pub const SESSION_COOKIE: &str = "advice_session";

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    address: WalletAddress,
}

/// Generate a sign-in nonce.
///
/// Returns 32 lowercase hex characters from 16 random bytes.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

fn base_cookie(value: String, production: bool) -> Cookie<'static> {
    // Cross-site embedding needs SameSite=None, which browsers only accept with Secure
    let same_site = if production {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(production)
        .same_site(same_site)
        .build()
}

/// `Set-Cookie` value establishing a session for `address`.
pub fn session_cookie(
    address: &WalletAddress,
    max_age_secs: u64,
    production: bool,
) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(&SessionPayload { address: *address })?;
    let mut cookie = base_cookie(payload, production);
    let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
    cookie.set_max_age(cookie::time::Duration::seconds(max_age));
    Ok(cookie.encoded().to_string())
}

/// `Set-Cookie` value that clears the session.
pub fn removal_cookie(production: bool) -> String {
    let mut cookie = base_cookie(String::new(), production);
    cookie.make_removal();
    cookie.to_string()
}

/// Read the signed-in address from the request cookies.
///
/// A missing cookie, an unparseable payload, or a malformed address all
/// count as no session.
pub fn read_session(headers: &HeaderMap) -> Option<WalletAddress> {
    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)?;

    serde_json::from_str::<SessionPayload>(cookie.value())
        .ok()
        .map(|payload| payload.address)
}
