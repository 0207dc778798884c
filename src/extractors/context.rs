//! Build the request context from path params, query string, Host header and JSON body.

use crate::scope::RequestContext;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;

/// Header set by proxies terminating TLS.
pub const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";

#[async_trait]
impl<S> FromRequest<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    /// An empty body yields no payload; a body that is not JSON is answered with an empty 400.
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Path(p)| p)
            .unwrap_or_default();
        let query = Query::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Query(q)| q)
            .unwrap_or_default();
        let base_url = base_url(&parts);

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(IntoResponse::into_response)?;
        let payload = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                tracing::debug!(error = %e, "malformed JSON body");
                StatusCode::BAD_REQUEST.into_response()
            })?;
            Some(value)
        };

        Ok(RequestContext {
            params,
            query,
            payload,
            base_url,
        })
    }
}

fn base_url(parts: &Parts) -> String {
    let header_str = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let scheme = header_str(FORWARDED_PROTO_HEADER)
        .or_else(|| parts.uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    let host = header_str(header::HOST.as_str())
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}://{}", scheme, host)
}
