//! Signed resend action links.
//!
//! A resend request must carry a token bound to the notification id. Tokens
//! are HMAC-SHA256 over the id with the site secret, base64url encoded.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{FormboxError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies resend tokens.
#[derive(Debug, Clone)]
pub struct LinkSigner {
    key: Vec<u8>,
}

impl LinkSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("hmac key")
    }

    /// Token authorizing a resend of the given notification.
    pub fn resend_token(&self, notification_id: i64) -> String {
        let mut mac = self.mac();
        mac.update(format!("resend:{notification_id}").as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Verify a resend token. Constant-time; failure is an authorization
    /// error with no partial effect.
    pub fn verify_resend(&self, notification_id: i64, token: &str) -> Result<()> {
        let expected = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| FormboxError::Unauthorized("malformed resend token".into()))?;
        let mut mac = self.mac();
        mac.update(format!("resend:{notification_id}").as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| FormboxError::Unauthorized("invalid resend token".into()))
    }

    /// Full resend URL for a notification.
    pub fn resend_url(&self, base_url: &str, notification_id: i64) -> String {
        format!(
            "{}/notifications/{}/resend?token={}",
            base_url.trim_end_matches('/'),
            notification_id,
            self.resend_token(notification_id)
        )
    }
}

/// Link to an entry's detail view, tagged with the notification that
/// produced it so access can be traced back.
pub fn entry_link(base_url: &str, entry_id: i64, notification_id: i64) -> String {
    format!(
        "{}/entries/{}?notification_id={}",
        base_url.trim_end_matches('/'),
        entry_id,
        notification_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let signer = LinkSigner::new("s3cret");
        let token = signer.resend_token(42);
        assert!(signer.verify_resend(42, &token).is_ok());
    }

    #[test]
    fn test_token_bound_to_id() {
        let signer = LinkSigner::new("s3cret");
        let token = signer.resend_token(42);
        assert!(signer.verify_resend(43, &token).is_err());
    }

    #[test]
    fn test_token_bound_to_secret() {
        let token = LinkSigner::new("one").resend_token(42);
        assert!(LinkSigner::new("two").verify_resend(42, &token).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        let signer = LinkSigner::new("s3cret");
        let err = signer.verify_resend(42, "!!not base64!!").unwrap_err();
        assert!(matches!(err, FormboxError::Unauthorized(_)));
    }

    #[test]
    fn test_entry_link() {
        assert_eq!(
            entry_link("https://x/", 7, 9),
            "https://x/entries/7?notification_id=9"
        );
    }
}
