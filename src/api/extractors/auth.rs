use axum::{
    extract::{FromRequestParts, FromRef},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use crate::state::AppState;
use crate::domain::models::auth::{Actor, Claims};
use std::sync::Arc;
use tower_cookies::Cookies;
use jsonwebtoken::{decode, DecodingKey, Validation, Algorithm};
use tracing::Span;

/// The caller, verified from the identity service's access token.
pub struct AuthUser(pub Actor);

enum TokenSource {
    Cookie,
    Bearer,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts.headers.get(AUTHORIZATION)?
        .to_str().ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookie_token = parts.extensions.get::<Cookies>()
            .and_then(|cookies| cookies.get("access_token"))
            .map(|c| c.value().to_string());

        let (access_token, source) = match cookie_token {
            Some(token) => (token, TokenSource::Cookie),
            None => (bearer_token(parts).ok_or(StatusCode::UNAUTHORIZED)?, TokenSource::Bearer),
        };

        let app_state = <Arc<AppState> as FromRef<S>>::from_ref(state);

        let decoding_key = DecodingKey::from_ed_pem(app_state.config.jwt_public_key.as_bytes())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[app_state.config.auth_audience.as_str()]);
        validation.set_issuer(&[app_state.config.auth_issuer.as_str()]);

        let token_data = decode::<Claims>(&access_token, &decoding_key, &validation)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        // Cookies ride along automatically, so state-changing requests must echo the CSRF token.
        let method = &parts.method;
        if matches!(source, TokenSource::Cookie) && method != "GET" && method != "HEAD" && method != "OPTIONS" {
            let csrf_header_val = parts.headers.get("X-CSRF-Token")
                .ok_or(StatusCode::FORBIDDEN)?
                .to_str()
                .map_err(|_| StatusCode::FORBIDDEN)?;

            if token_data.claims.csrf_token.as_deref() != Some(csrf_header_val) {
                return Err(StatusCode::FORBIDDEN);
            }
        }

        let claims = token_data.claims;
        let actor = Actor::new(&claims.sub, &claims.role, &claims.facility_id);

        Span::current().record("user_id", &actor.user_id);

        Ok(AuthUser(actor))
    }
}
