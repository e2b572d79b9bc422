//! Authenticated HTTP helpers for the companion backend
//!
//! Every call carries a bearer token. A 401 is surfaced as
//! [`UnauthorizedError`] so the caller can clear the stored credential; it
//! is never retried here.

pub mod models;

use std::fmt;

use crate::api::models::ConversationResponse;
use crate::core::character::CharacterState;
use crate::utils::url::construct_api_url;

/// The backend rejected our bearer token.
#[derive(Debug)]
pub struct UnauthorizedError;

impl fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed (401): token rejected by backend")
    }
}

impl std::error::Error for UnauthorizedError {}

pub fn add_auth_header(request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    request.header("Authorization", format!("Bearer {token}"))
}

async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Box::new(UnauthorizedError));
    }
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("API request failed with status {status}: {error_text}").into());
    }
    Ok(response)
}

/// Fetch up to `limit` recent messages for a character.
pub async fn fetch_conversation(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    character_id: &str,
    limit: usize,
) -> Result<ConversationResponse, Box<dyn std::error::Error>> {
    let url = construct_api_url(base_url, "api/conversation");
    let limit = limit.to_string();
    let request = client
        .get(url)
        .query(&[("character_id", character_id), ("limit", limit.as_str())]);
    let response = add_auth_header(request, token).send().await?;
    let response = check_status(response).await?;
    Ok(response.json::<ConversationResponse>().await?)
}

/// Fetch the character's current structured state. Also doubles as a token
/// validity probe.
pub async fn fetch_status(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    character_id: &str,
) -> Result<CharacterState, Box<dyn std::error::Error>> {
    let url = construct_api_url(base_url, "api/status");
    let request = client.get(url).query(&[("character_id", character_id)]);
    let response = add_auth_header(request, token).send().await?;
    let response = check_status(response).await?;
    Ok(response.json::<CharacterState>().await?)
}

/// True when an error chain bottoms out in a 401.
pub fn is_unauthorized(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(err) = source {
        if err.is::<UnauthorizedError>() {
            return true;
        }
        source = err.source();
    }
    false
}
