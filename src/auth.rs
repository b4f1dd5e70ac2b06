use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::models::{Author, Id};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Id,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn author(&self) -> Author {
        Author { id: self.sub, username: self.username.clone(), display_name: self.display_name.clone() }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("JWT_SECRET not set")]
    MissingSecret,
    #[error("invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

fn secret() -> Result<String, AuthError> {
    env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)
}

/// Validate a JWT and return its claims.
pub fn decode_jwt(token: &str) -> Result<Claims, AuthError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

enum Rejection {
    /// No bearer, or a bearer that does not validate.
    Unauthenticated(&'static str),
    /// Tokens cannot be checked at all.
    Unavailable,
}

impl Rejection {
    fn into_error(self) -> Error {
        match self {
            Rejection::Unauthenticated(msg) => actix_web::error::ErrorUnauthorized(msg),
            Rejection::Unavailable => actix_web::error::ErrorInternalServerError("auth unavailable"),
        }
    }
}

fn authenticate(req: &HttpRequest, pl: &mut Payload) -> Result<Author, Rejection> {
    let bearer = BearerAuth::from_request(req, pl)
        .into_inner()
        .map_err(|_| Rejection::Unauthenticated("Authorization required"))?;
    match decode_jwt(bearer.token()) {
        Ok(claims) => Ok(claims.author()),
        Err(AuthError::MissingSecret) => {
            tracing::error!("JWT_SECRET not set; rejecting bearer token");
            Err(Rejection::Unavailable)
        }
        Err(_) => Err(Rejection::Unauthenticated("Invalid JWT")),
    }
}

/// Extractor yielding the authenticated caller; rejects anonymous requests.
#[derive(Debug, Clone)]
pub struct Auth(pub Author);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        ready(authenticate(req, pl).map(Auth).map_err(Rejection::into_error))
    }
}

/// Extractor for handlers that let the service layer decide about anonymous
/// callers. A missing or invalid bearer yields `None`; a server that cannot
/// validate tokens still fails the request.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<Author>);

impl MaybeAuth {
    pub fn author(&self) -> Option<&Author> {
        self.0.as_ref()
    }
}

impl FromRequest for MaybeAuth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        ready(match authenticate(req, pl) {
            Ok(author) => Ok(MaybeAuth(Some(author))),
            Err(Rejection::Unauthenticated(_)) => Ok(MaybeAuth(None)),
            Err(unavailable) => Err(unavailable.into_error()),
        })
    }
}

/// Issue a token for `author`, valid for `ttl`.
pub fn create_jwt(author: &Author, ttl: chrono::Duration) -> Result<String, AuthError> {
    let secret = secret()?;
    let expiration = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;

    let claims = Claims {
        sub: author.id,
        username: author.username.clone(),
        display_name: author.display_name.clone(),
        exp: expiration,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}
