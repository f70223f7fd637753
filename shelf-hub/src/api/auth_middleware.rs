use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use shelf_hub_core::{HubError, RequestContext};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use super::{ApiError, AppState};

const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Identity of the caller plus the cancellation scope of the request.
///
/// The token is cancelled when the handler future is dropped, so work for a
/// client that went away stops before it commits.
pub struct AuthContext {
    pub ctx: RequestContext,
    _cancel_on_drop: DropGuard,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_TOKEN_COOKIE)
        .map(|(_, token)| token)
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers))
            .filter(|token| !token.is_empty())
            .ok_or(HubError::Unauthenticated)?;
        let claims = state.verifier.verify(token).await.ok_or_else(|| {
            debug!("rejecting access token");
            HubError::WrongAccessToken
        })?;
        let user_id = claims.user_id()?;
        let cancel = CancellationToken::new();
        Ok(Self {
            ctx: RequestContext::with_cancel(user_id, cancel.clone()),
            _cancel_on_drop: cancel.drop_guard(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=def"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        assert_eq!(cookie_token(&headers), Some("def"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=tok; lang=en"),
        );
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(cookie_token(&headers), Some("tok"));
    }
}
