//! Authentication extractor
//!
//! Reads the bearer token from the Authorization header and resolves it with
//! the identity provider.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::AppError;
use crate::external::IdentityUser;
use crate::AppState;

/// Extractor for the authenticated caller
/// Use this in handlers to require a valid bearer token
#[derive(Clone, Debug)]
pub struct CurrentUser(pub IdentityUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Unauthenticated(
                        "Missing or invalid Authorization header".to_string(),
                    )
                })?;

        let user = state.identity.verify_token(bearer.token()).await?;
        Ok(CurrentUser(user))
    }
}
