use crate::error::McpError;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Base64 HMAC-SHA256 of `payload` keyed by `secret`.
///
/// # Errors
///
/// Returns `McpError::Internal` if the MAC cannot be keyed.
pub fn sign(payload: &str, secret: &str) -> Result<String, McpError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| McpError::Internal {
        message: format!("Failed to create HMAC: {e}"),
    })?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Canonical signing string: `timestamp + METHOD + path_with_query + body`.
pub fn signing_payload(timestamp: &str, method: &str, path_with_query: &str, body: &str) -> String {
    format!(
        "{timestamp}{}{path_with_query}{body}",
        method.to_ascii_uppercase()
    )
}
