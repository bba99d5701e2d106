use crate::models::api::prelude::*;
use crate::models::client::AuthedClient;
use crate::services::identity::IdentityError;
use crate::services::states::BrewState;
use axum::extract::{FromRequestParts, Request as AxumExtractRequest, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::IntoResponse;
use std::sync::Arc;

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::MissingToken | IdentityError::InvalidToken => unauthorized!(err = e),
            IdentityError::ClientNotFound(_) => unauthorized!(err = e),
            _ => internal!(e, "Identity service unavailable"),
        }
    }
}

impl<S> FromRequestParts<S> for AuthedClient
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> ApiResult<Self> {
        parts
            .extensions
            .get::<AuthedClient>()
            .copied()
            .ok_or_else(|| internal!(
                "Cannot extract authed client info. Is `bearer_auth_checker` enabled?"
            ))
    }
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Result<&str, IdentityError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(IdentityError::MissingToken)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(IdentityError::MissingToken)?;
    let token = token.trim();
    match (scheme.eq_ignore_ascii_case("bearer"), token.is_empty()) {
        (true, false) => Ok(token),
        _ => Err(IdentityError::MissingToken),
    }
}

pub async fn bearer_auth_checker(
    State(state): State<Arc<BrewState>>,
    mut request: AxumExtractRequest,
    next: Next,
) -> ApiResult<impl IntoResponse> {
    let token = bearer_token(request.headers())?.to_owned();
    let client_id = state.identity.authenticate(&token).await?;
    request
        .extensions_mut()
        .insert(AuthedClient::new(client_id));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(v: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static(v));
        h
    }

    #[test]
    fn parses_bearer_scheme() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer  abc ")).unwrap(), "abc");
        for bad in ["Basic abc", "Bearer", "Bearer   ", "abc"] {
            assert!(
                matches!(bearer_token(&headers(bad)), Err(IdentityError::MissingToken)),
                "{bad}"
            );
        }
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(IdentityError::MissingToken)
        ));
    }
}
