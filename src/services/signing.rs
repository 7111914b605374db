//! HMAC-signed temporary access URLs
//!
//! VNC and file links are handed to clients as signed URLs: an HMAC-SHA256
//! over the canonicalized path and query, with an expiry capped at 15
//! minutes. Verification recomputes the signature over the same canonical
//! form.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Longest lifetime a signed URL may carry
pub const MAX_EXPIRE_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, canonical: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sorted key=value joining of path and query, the signed form
    fn canonicalize(path: &str, params: &[(String, String)]) -> String {
        let mut sorted: Vec<String> = params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect();
        sorted.sort();
        format!("{path}?{}", sorted.join("&"))
    }

    /// Sign `path` with the given params plus an `expires` timestamp.
    /// `expire_minutes` is clamped to the 15-minute cap.
    pub fn create_signed_url(
        &self,
        path: &str,
        params: &[(String, String)],
        expire_minutes: i64,
    ) -> String {
        let expire_minutes = expire_minutes.clamp(1, MAX_EXPIRE_MINUTES);
        let expires = (Utc::now() + chrono::Duration::minutes(expire_minutes)).timestamp();

        let mut signed_params: Vec<(String, String)> = params.to_vec();
        signed_params.push(("expires".to_string(), expires.to_string()));

        let canonical = Self::canonicalize(path, &signed_params);
        let signature = self.signature(&canonical);

        let query: Vec<String> = signed_params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect();
        format!("{path}?{}&signature={signature}", query.join("&"))
    }

    /// Verify a signature over `path` and its params (which must include
    /// `expires`; the `signature` param itself is excluded from the
    /// canonical form).
    pub fn verify(&self, path: &str, params: &[(String, String)], signature: &str) -> Result<()> {
        let expires = params
            .iter()
            .find(|(key, _)| key == "expires")
            .and_then(|(_, value)| value.parse::<i64>().ok())
            .ok_or_else(|| Error::Unauthorized("Signed URL missing expiry".into()))?;
        if Utc::now().timestamp() > expires {
            return Err(Error::Unauthorized("Signed URL expired".into()));
        }

        let unsigned: Vec<(String, String)> = params
            .iter()
            .filter(|(key, _)| key != "signature")
            .cloned()
            .collect();
        let canonical = Self::canonicalize(path, &unsigned);
        let expected = self.signature(&canonical);
        if expected != signature {
            return Err(Error::Unauthorized("Signed URL signature mismatch".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_of(url: &str) -> (String, Vec<(String, String)>, String) {
        let (path, query) = url.split_once('?').unwrap();
        let mut params = Vec::new();
        let mut signature = String::new();
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap();
            let value = urlencoding::decode(value).unwrap().to_string();
            if key == "signature" {
                signature = value;
            } else {
                params.push((key.to_string(), value));
            }
        }
        (path.to_string(), params, signature)
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = UrlSigner::new("secret");
        let url = signer.create_signed_url(
            "/sessions/s1/vnc",
            &[("session_id".into(), "s1".into())],
            10,
        );
        let (path, mut params, signature) = params_of(&url);
        params.push(("signature".into(), signature.clone()));
        signer.verify(&path, &params, &signature).unwrap();
    }

    #[test]
    fn test_verify_rejects_tamper() {
        let signer = UrlSigner::new("secret");
        let url = signer.create_signed_url(
            "/sessions/s1/vnc",
            &[("session_id".into(), "s1".into())],
            10,
        );
        let (path, mut params, signature) = params_of(&url);
        for param in params.iter_mut() {
            if param.0 == "session_id" {
                param.1 = "s2".into();
            }
        }
        assert!(signer.verify(&path, &params, &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let signer = UrlSigner::new("secret");
        let other = UrlSigner::new("other");
        let url = signer.create_signed_url("/p", &[], 5);
        let (path, params, signature) = params_of(&url);
        assert!(other.verify(&path, &params, &signature).is_err());
    }

    #[test]
    fn test_expiry_is_capped() {
        let signer = UrlSigner::new("secret");
        let url = signer.create_signed_url("/p", &[], 600);
        let (_, params, _) = params_of(&url);
        let expires: i64 = params
            .iter()
            .find(|(key, _)| key == "expires")
            .unwrap()
            .1
            .parse()
            .unwrap();
        let max = (Utc::now() + chrono::Duration::minutes(MAX_EXPIRE_MINUTES + 1)).timestamp();
        assert!(expires < max);
    }
}
