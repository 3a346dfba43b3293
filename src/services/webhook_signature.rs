use crate::domain::Provider;
use crate::error::{AppError, Result};
use ed25519_dalek::{Signature, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies an inbound webhook's signature against the provider's scheme
/// (§4.G): HMAC-SHA256 for Resend (and the generic `X-Webhook-Signature:
/// sha256={hex}` shape this system also emits outbound), Ed25519 for
/// Telnyx. SES verification happens one layer up, via its SNS envelope's
/// certificate chain rather than a header signature, so it isn't handled
/// here.
///
/// # Errors
/// Returns `AppError::WebhookSignatureInvalid` if the signature does not
/// match, or `AppError::Validation` if the signature header is malformed.
pub fn verify(provider: Provider, body: &[u8], signature_header: &str, secret_or_key: &str) -> Result<()> {
    match provider {
        Provider::Resend => verify_hmac_sha256(body, signature_header, secret_or_key),
        Provider::Telnyx => verify_ed25519(body, signature_header, secret_or_key),
        Provider::Ses => Ok(()),
    }
}

fn verify_hmac_sha256(body: &[u8], signature_header: &str, secret: &str) -> Result<()> {
    let hex_signature = signature_header.strip_prefix("sha256=").unwrap_or(signature_header);
    let expected = hex::decode(hex_signature).map_err(|_| AppError::WebhookSignatureInvalid)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| AppError::Validation(format!("invalid hmac key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| AppError::WebhookSignatureInvalid)
}

fn verify_ed25519(body: &[u8], signature_header: &str, public_key_b64: &str) -> Result<()> {
    use base64::Engine;

    let signature_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature_header)
        .map_err(|_| AppError::WebhookSignatureInvalid)?;
    let signature_bytes: [u8; 64] = signature_bytes.try_into().map_err(|_| AppError::WebhookSignatureInvalid)?;
    let signature = Signature::from_bytes(&signature_bytes);

    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(public_key_b64)
        .map_err(|_| AppError::Validation("invalid telnyx public key encoding".to_string()))?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| AppError::Validation("telnyx public key wrong length".to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| AppError::Validation("invalid telnyx public key".to_string()))?;

    verifying_key.verify_strict(body, &signature).map_err(|_| AppError::WebhookSignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signature_roundtrips() {
        let secret = "top-secret";
        let body = b"{\"event\":\"delivered\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={signature}");

        assert!(verify_hmac_sha256(body, &header, secret).is_ok());
        assert!(verify_hmac_sha256(body, "sha256=deadbeef", secret).is_err());
    }

    #[test]
    fn ses_never_needs_a_header_signature() {
        assert!(verify(Provider::Ses, b"anything", "", "").is_ok());
    }
}
