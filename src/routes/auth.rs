//! Auth API endpoints.

use crate::auth::address::WalletAddress;
use crate::auth::middleware::{check_rate_limit, AppState, SessionAddress};
use crate::auth::session::{generate_nonce, removal_cookie, session_cookie};
use crate::auth::siwe::{SiweMessage, VerifyOptions};
use crate::auth::verify::verify_sign_in;
use crate::error::AppError;
use crate::models::{
    MessageRequest, MessageResponse, NonceResponse, SessionResponse, VerifyRequest,
};
use crate::routes::ApiJson;
use crate::storage;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

/// Count a sign-in request against the caller's per-minute budget.
async fn enforce_rate_limit<C>(
    con: &mut C,
    state: &AppState,
    ip: IpAddr,
    endpoint: &'static str,
) -> Result<(), AppError>
where
    C: redis::AsyncCommands,
{
    let rate_limit_key = format!("ratelimit:auth:{}", ip);
    let allowed = check_rate_limit(
        con,
        &rate_limit_key,
        state.config.rate_limit_auth_per_min,
        60,
    )
    .await
    .map_err(|e| AppError::Internal(format!("Rate limit check failed: {}", e)))?;

    if !allowed {
        let mut hasher = std::hash::DefaultHasher::new();
        ip.hash(&mut hasher);
        let ip_hash = format!("{:x}", hasher.finish());
        tracing::warn!(action = "rate_limited", endpoint, ip_hash = %ip_hash, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(())
}

/// GET /api/auth/nonce — Issue a single-use sign-in nonce
pub async fn issue_nonce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = state.connection().await?;
    enforce_rate_limit(&mut con, &state, addr.ip(), "auth/nonce").await?;

    let nonce = generate_nonce();
    storage::nonce::store_nonce(&mut con, &nonce, Utc::now(), state.config.nonce_ttl_secs).await?;

    Ok(Json(NonceResponse { nonce }))
}

/// POST /api/auth/message — Build the canonical sign-in message for a wallet
pub async fn sign_in_message(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let address: WalletAddress = req
        .address
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid address: {}", e)))?;

    let chain_id = req.chain_id.unwrap_or(state.config.chain_id);
    if !state.config.rpc_urls.contains_key(&chain_id) {
        return Err(AppError::BadRequest(format!("Unsupported chain: {}", chain_id)));
    }

    let message = SiweMessage::sign_in(
        address,
        &req.nonce,
        &state.config.app_origin,
        &state.config.app_domain,
        chain_id,
        Utc::now(),
    )
    .map_err(|_| AppError::BadRequest("Invalid nonce".to_string()))?;

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

/// POST /api/auth/verify — Verify a signed message and start a session
pub async fn verify(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Result<ApiJson<VerifyRequest>, AppError>,
) -> Result<Response, AppError> {
    let mut con = state.connection().await?;
    enforce_rate_limit(&mut con, &state, addr.ip(), "auth/verify").await?;

    // Unreadable bodies fail like any other malformed sign-in
    let req = body.map(|ApiJson(req)| req).unwrap_or_else(|e| {
        tracing::warn!(action = "auth_failed", error = %e, "Unreadable sign-in body");
        VerifyRequest {
            message: None,
            signature: None,
        }
    });

    let (Some(message), Some(signature)) = (req.message, req.signature) else {
        tracing::warn!(action = "auth_failed", reason = "missing message or signature", "Sign-in rejected");
        return Err(AppError::invalid_signature());
    };

    let options = VerifyOptions {
        domain: Some(state.config.app_domain.as_str()),
        nonce: None,
        time: Utc::now(),
    };
    let verified = match verify_sign_in(&message, &signature, &options, &state.contracts).await {
        Ok(verified) => verified,
        Err(e) => {
            tracing::warn!(action = "auth_failed", error = %e, "Sign-in rejected");
            return Err(AppError::invalid_signature());
        }
    };

    // Only a nonce this server issued, used once, completes a sign-in
    if !storage::nonce::consume_nonce(&mut con, &verified.nonce).await? {
        tracing::warn!(action = "auth_failed", address = %verified.address, reason = "unknown or used nonce", "Sign-in rejected");
        return Err(AppError::invalid_signature());
    }

    let address = verified.address;
    tracing::info!(action = "auth_success", address = %address, chain_id = verified.chain_id, "Wallet signed in");

    let mut response = Json(SessionResponse {
        address: Some(address),
    })
    .into_response();

    // The signature already checked out; a cookie failure must not turn into an error
    match session_cookie(&address, state.config.session_ttl_secs, state.config.production)
        .map_err(|e| e.to_string())
        .and_then(|cookie| HeaderValue::from_str(&cookie).map_err(|e| e.to_string()))
    {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => {
            tracing::error!(action = "session_cookie_failed", address = %address, error = %e, "Session cookie could not be set");
        }
    }

    Ok(response)
}

/// GET /api/auth/session — Report the signed-in address, if any
pub async fn session(session: Option<SessionAddress>) -> Json<SessionResponse> {
    Json(SessionResponse {
        address: session.map(|s| s.0),
    })
}

/// POST /api/auth/logout — Clear the session cookie
pub async fn logout(
    State(state): State<AppState>,
    session: Option<SessionAddress>,
) -> impl IntoResponse {
    if let Some(SessionAddress(address)) = session {
        tracing::info!(action = "logout", address = %address, "Wallet signed out");
    }

    (
        [(header::SET_COOKIE, removal_cookie(state.config.production))],
        Json(serde_json::json!({ "ok": true })),
    )
}
