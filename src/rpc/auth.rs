//! Optional HTTP basic auth for private Ethereum nodes.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

/// Credentials attached to every JSON-RPC request.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) fn build_auth_headers(auth: Option<&BasicAuth>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let Some(auth) = auth else {
        return Ok(headers);
    };

    let encoded = BASE64_STANDARD.encode(format!("{}:{}", auth.user, auth.password));
    let value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .context("failed to build Authorization header")?;
    headers.insert("Authorization", value);
    Ok(headers)
}
