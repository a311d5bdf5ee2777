//! The HTTP binding: reads a session reference from a cookie or an
//! `Authorization: Bearer` header, and writes it back as `Set-Cookie` or
//! through a caller-supplied token sink.
//!
//! This module does not depend on any particular router; it operates on
//! [`HeaderMap`] and [`Cookies`] directly so it composes with whatever axum
//! handler or middleware the application already has.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tower_cookies::{Cookie, Cookies};

use crate::config::AuthType;
use crate::error::{Result, SessionError};
use crate::session::Session;
use crate::session_data::SessData;
use crate::store::Store;

const BEARER_SCHEME: &str = "bearer";

/// `GetSession` failing is the universal "no valid session" signal; this
/// maps the error taxonomy of [`SessionError`] to the status code an axum
/// handler should answer with when used as an extractor rejection.
impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) | Self::Expired(_) | Self::Decrypt(..) => StatusCode::UNAUTHORIZED,
            Self::Invariant(..) => StatusCode::BAD_REQUEST,
            Self::Marshal(..) | Self::Unmarshal(..) | Self::Storage(..) | Self::Config(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Extracts the raw reference string from the request, per the store's
/// configured [`AuthType`]. Returns `Ok(None)` when no reference is present
/// at all (the universal "no session" case, mapped by callers to a 401).
fn extract_reference<D: SessData>(
    store: &Store<D>,
    headers: &HeaderMap,
    cookies: Option<&Cookies>,
) -> Option<String> {
    match store.config().auth_type {
        AuthType::Cookie => cookies
            .and_then(|jar| jar.get(&store.config().cookie_name))
            .map(|c| c.value().to_string()),
        AuthType::Bearer => {
            if let Some(hook) = store.get_token_hook() {
                return hook();
            }
            bearer_from_headers(headers)
        }
    }
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    Some(token.to_string())
}

/// Extracts a reference from the request, decodes/validates it, and loads
/// the live session. `cookies` is required only when the store's `AuthType`
/// is [`AuthType::Cookie`].
#[tracing::instrument(skip(store, headers, cookies), err)]
pub async fn get_session<D: SessData>(
    store: &Arc<Store<D>>,
    headers: &HeaderMap,
    cookies: Option<&Cookies>,
) -> Result<(Session<D>, i64)> {
    let token = extract_reference(store, headers, cookies)
        .ok_or_else(|| SessionError::not_found("http::get_session"))?;

    store.get_token_session(&token).await
}

/// Writes the reference emitted by a just-completed [`Session::save`] back
/// to the client: a `Set-Cookie` for [`AuthType::Cookie`], or the
/// store's `send_token` hook for [`AuthType::Bearer`] (a no-op if unset —
/// the caller is expected to read [`Session::token`] themselves in that
/// case).
pub fn apply_save<D: SessData>(
    store: &Store<D>,
    cookies: Option<&Cookies>,
    token: &str,
    max_age_secs: i64,
) {
    match store.config().auth_type {
        AuthType::Cookie => {
            if let Some(jar) = cookies {
                jar.add(build_cookie(store, token.to_string(), max_age_secs));
            } else {
                tracing::warn!("apply_save: Cookie auth configured but no Cookies extension present");
            }
        }
        AuthType::Bearer => {
            if let Some(hook) = store.send_token_hook() {
                hook(token, max_age_secs);
            }
        }
    }
}

/// Instructs the client to discard its reference: an expiring `Set-Cookie`
/// for [`AuthType::Cookie`], or the store's `delete_token` hook for
/// [`AuthType::Bearer`].
pub fn apply_delete<D: SessData>(store: &Store<D>, cookies: Option<&Cookies>) {
    match store.config().auth_type {
        AuthType::Cookie => {
            if let Some(jar) = cookies {
                let mut expired = build_cookie(store, String::new(), -1);
                expired.set_expires(OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
                jar.add(expired);
            }
        }
        AuthType::Bearer => {
            if let Some(hook) = store.delete_token_hook() {
                hook();
            }
        }
    }
}

fn build_cookie<D: SessData>(store: &Store<D>, value: String, max_age_secs: i64) -> Cookie<'static> {
    let cfg = store.config();
    let mut cookie = Cookie::build((cfg.cookie_name.clone(), value))
        .path(cfg.cookie_path.clone())
        .secure(cfg.cookie_secure)
        .http_only(cfg.cookie_http_only)
        .same_site(cfg.cookie_same_site)
        .max_age(Duration::seconds(max_age_secs))
        .build();

    if let Some(domain) = &cfg.cookie_domain {
        cookie.set_domain(domain.clone());
    }

    cookie
}

/// An axum extractor pulling a live [`Session`] out of the request, given a
/// `Arc<Store<D>>` reachable as a request extension (install it with
/// `axum::Extension`) and, for [`AuthType::Cookie`] stores, `tower_cookies`'
/// `CookieManagerLayer`.
#[derive(Debug)]
pub struct ExtractSession<D: SessData>(pub Session<D>);

#[async_trait]
impl<D, S> FromRequestParts<S> for ExtractSession<D>
where
    D: SessData + 'static,
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let store = parts
            .extensions
            .get::<Arc<Store<D>>>()
            .cloned()
            .ok_or_else(|| {
                SessionError::config(
                    "ExtractSession::from_request_parts",
                    "Arc<Store<D>> missing from request extensions",
                )
            })?;
        let cookies = parts.extensions.get::<Cookies>().cloned();

        let (session, _ttl) = get_session(&store, &parts.headers, cookies.as_ref()).await?;
        Ok(Self(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers).as_deref(), Some("abc.def"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "bearer abc.def".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn non_bearer_scheme_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc.def".parse().unwrap());
        assert!(bearer_from_headers(&headers).is_none());
    }

    #[test]
    fn missing_header_yields_none() {
        assert!(bearer_from_headers(&HeaderMap::new()).is_none());
    }
}
