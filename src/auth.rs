//! Registration, login and bearer-token verification.
//!
//! Tokens are HS256 JWTs carrying the user id, email and name, valid for
//! seven days. Protected handlers receive the verified identity through the
//! [`AuthUser`] extractor; a missing or invalid token is rejected before the
//! handler body runs.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{User, UserPublic},
    state::AppState,
};

const TOKEN_VALIDITY_DAYS: i64 = 7;
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    name: String,
    iat: i64,
    exp: i64,
}

/// The authenticated caller, extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
}

pub fn sign_token(secret: &str, user_id: i64, email: &str, name: &str) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(TOKEN_VALIDITY_DAYS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_token(secret: &str, token: &str) -> AppResult<AuthUser> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    let user_id = data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    Ok(AuthUser {
        user_id,
        email: data.claims.email,
        name: data.claims.name,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Missing Bearer token".into()))?;

        verify_token(&state.config.jwt_secret, token)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub address: Option<String>,
}

impl RegisterRequest {
    fn validate(&self) -> AppResult<()> {
        if self.name.len() < 2 {
            return Err(AppError::Validation("name must be at least 2 characters".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::Validation("email must be a valid email address".into()));
        }
        if let Some(phone) = &self.phone {
            if phone.len() < 6 {
                return Err(AppError::Validation("phone must be at least 6 characters".into()));
            }
        }
        if self.password.len() < 6 {
            return Err(AppError::Validation("password must be at least 6 characters".into()));
        }
        if let Some(address) = &self.address {
            if address.len() < 5 {
                return Err(AppError::Validation("address must be at least 5 characters".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPublic,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT user_id FROM users WHERE email = ?")
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash =
        bcrypt::hash(&payload.password, BCRYPT_COST).map_err(|e| AppError::Internal(e.to_string()))?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, phone, password_hash, address, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&password_hash)
    .bind(&payload.address)
    .bind(Utc::now())
    .execute(&state.pool)
    .await?;
    let user_id = result.last_insert_rowid();

    info!("Registered user {user_id}");

    let user = sqlx::query_as::<_, UserPublic>(
        "SELECT user_id, name, email, phone, address, created_at FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    let token = sign_token(&state.config.jwt_secret, user.user_id, &user.email, &user.name)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if payload.username.len() < 3 {
        return Err(AppError::Validation("username must be at least 3 characters".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("password must not be empty".into()));
    }

    // The login form sends the email in the "username" field.
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&payload.username)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    let ok = bcrypt::verify(&payload.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !ok {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = sign_token(&state.config.jwt_secret, user.user_id, &user.email, &user.name)?;
    let user = UserPublic {
        user_id: user.user_id,
        name: user.name,
        email: user.email,
        phone: user.phone,
        address: user.address,
        created_at: user.created_at,
    };

    Ok(Json(AuthResponse { token, user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = sign_token("test-secret", 42, "a@b.com", "Alice").unwrap();
        let auth = verify_token("test-secret", &token).unwrap();

        assert_eq!(auth.user_id, 42);
        assert_eq!(auth.email, "a@b.com");
        assert_eq!(auth.name, "Alice");
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = sign_token("test-secret", 42, "a@b.com", "Alice").unwrap();
        assert!(matches!(
            verify_token("other-secret", &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn register_validation_bounds() {
        let valid = RegisterRequest {
            name: "Al".into(),
            email: "a@b.com".into(),
            phone: Some("123456".into()),
            password: "secret1".into(),
            address: Some("Main St 5".into()),
        };
        assert!(valid.validate().is_ok());

        let short_name = RegisterRequest {
            name: "A".into(),
            ..valid_clone(&valid)
        };
        assert!(short_name.validate().is_err());

        let bad_email = RegisterRequest {
            email: "nope".into(),
            ..valid_clone(&valid)
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            password: "12345".into(),
            ..valid_clone(&valid)
        };
        assert!(short_password.validate().is_err());
    }

    fn valid_clone(r: &RegisterRequest) -> RegisterRequest {
        RegisterRequest {
            name: r.name.clone(),
            email: r.email.clone(),
            phone: r.phone.clone(),
            password: r.password.clone(),
            address: r.address.clone(),
        }
    }
}
