//! Client id resolution wired to HTTP: pulls the header/cookie/query sources out of an
//! axum request and feeds them through [`okcvm_core::resolve_client_id`], which knows nothing
//! about HTTP itself.

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use std::collections::HashMap;

use okcvm_core::resolve_client_id;

pub const CLIENT_ID_HEADER: &str = "x-okc-client-id";
pub const CLIENT_ID_COOKIE: &str = "okc_client_id";

/// Extractor that resolves to the request's client id per's priority order. Has no
/// "explicit parameter" source of its own — handlers that accept a path/body client id override
/// layer that on top by calling [`okcvm_core::resolve_client_id`] directly instead.
pub struct ClientId(pub String);

fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        (k.trim() == name).then(|| v.trim())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok());

        let cookie = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| cookie_value(raw, CLIENT_ID_COOKIE));

        let Query(query): Query<HashMap<String, String>> =
            Query::from_request_parts(parts, state).await.unwrap_or_default();
        let query = query.get("client_id").map(String::as_str);

        Ok(ClientId(resolve_client_id(None, header, cookie, query)))
    }
}

impl std::ops::Deref for ClientId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_extracts_named_cookie_among_others() {
        let raw = "a=1; okc_client_id=alice; b=2";
        assert_eq!(cookie_value(raw, CLIENT_ID_COOKIE), Some("alice"));
    }

    #[test]
    fn cookie_value_returns_none_when_missing() {
        assert_eq!(cookie_value("a=1", CLIENT_ID_COOKIE), None);
    }
}
