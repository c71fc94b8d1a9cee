use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    db::userdb::UserExt,
    error::{ErrorMessage, HttpError},
    models::usermodel::User,
    utils::token,
    AppState,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddeware {
    pub user: User,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

/// Socket handshakes may carry the token in the query string; that wins, then the
/// Authorization header, then the `token` cookie.
pub fn extract_token(query_token: Option<&str>, headers: &HeaderMap, cookie_jar: &CookieJar) -> Option<String> {
    query_token
        .map(str::to_owned)
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
        .or_else(|| cookie_jar.get("token").map(|cookie| cookie.value().to_string()))
}

/// Verifies the token and loads the user it belongs to.
pub async fn authenticate_token(app_state: &AppState, token: String) -> Result<User, HttpError> {
    let token_details = token::decode_token(token, app_state.env.jwt_secret.as_bytes())?;

    let user_id = uuid::Uuid::parse_str(&token_details)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    let user = app_state
        .db_client
        .get_user(user_id)
        .await
        .map_err(|_| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    user.ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get("token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(req.headers()))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let user = authenticate_token(&app_state, token).await?;

    req.extensions_mut().insert(JWTAuthMiddeware { user });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn query_token_takes_priority() {
        let jar = CookieJar::new().add(Cookie::new("token", "from-cookie"));
        let headers = headers_with_bearer("from-header");

        assert_eq!(
            extract_token(Some("from-query"), &headers, &jar).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            extract_token(None, &headers, &jar).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            extract_token(Some(""), &HeaderMap::new(), &jar).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn missing_or_malformed_header_yields_nothing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(None, &headers, &CookieJar::new()).is_none());
        assert!(extract_token(None, &headers_with_bearer(" "), &CookieJar::new()).is_none());
    }
}
