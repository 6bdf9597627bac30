use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token material issued by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Returned to the caller after register, login or refresh. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user_id: Uuid,
    pub username: String,
}

impl Session {
    pub fn new(tokens: TokenPair, user_id: Uuid, username: String) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            user_id,
            username,
        }
    }
}
