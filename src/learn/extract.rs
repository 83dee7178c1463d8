//! Request extractors whose rejections use the `{success, error}` envelope.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
};
use serde::de::DeserializeOwned;

use super::error::{LearnError, LearnResult};

/// JSON body; malformed input is a Validation error
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(LearnError))]
pub struct ApiJson<T>(pub T);

/// Path parameters; an unparsable id is a Validation error
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(LearnError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(LearnError))]
pub struct ApiQuery<T>(pub T);

/// Optional JSON body: an empty body yields `T::default()`, anything else
/// must parse
#[derive(Debug)]
pub struct JsonOrDefault<T>(pub T);

pub fn parse_optional_body<T>(body: &[u8]) -> LearnResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| LearnError::validation(format!("Invalid request body: {e}")))
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrDefault<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = LearnError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| LearnError::validation(e.body_text()))?;
        parse_optional_body(&body).map(Self)
    }
}
