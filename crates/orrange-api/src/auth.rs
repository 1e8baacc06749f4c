use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use orrange_db::{Database, is_constraint_violation};
use orrange_gateway::dispatcher::Dispatcher;
use orrange_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::blocking;
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::services::ExternalServices;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub ledger: Ledger,
    pub services: ExternalServices,
    /// Balance credited to every new account
    pub starting_coins: i64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::bad_request("Username must be 3-32 characters"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }

    let lookup = username.clone();
    if blocking(&state, move |db| db.get_user_by_username(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::internal()
    })?
    .map_err(|e| {
        error!("Password hashing failed: {}", e);
        ApiError::internal()
    })?;

    let starting_coins = state.starting_coins;
    let new_name = username.clone();
    let email = req.email;
    // A concurrent signup can still win the race to the UNIQUE constraint.
    let user_id = blocking(&state, move |db| -> anyhow::Result<Option<i64>> {
        match db.create_user(&new_name, email.as_deref(), &password_hash, starting_coins) {
            Ok(id) => Ok(Some(id)),
            Err(e) if is_constraint_violation(&e) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("Username or email already taken".into()))?;

    let token = create_token(&state.jwt_secret, user_id, &username)?;
    info!("Registered {} ({})", username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = req.username.trim().to_string();
    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let password = req.password;
    let stored = user.password.clone();
    let verified = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored)
            .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::internal()
    })?;

    if !verified {
        return Err(ApiError::Unauthorized);
    }

    let token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

/// Sign a 30-day session token.
pub fn create_token(secret: &str, user_id: i64, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::internal()
    })
}
