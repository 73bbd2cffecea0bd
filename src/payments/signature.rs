//! Gateway webhook signature verification.
//!
//! The `x-signature` header has the form `ts=<unix seconds>,v1=<hex>`, where the
//! hex digest is HMAC-SHA256 over the manifest
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`. Parts whose value is absent
//! are left out of the manifest.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub fn build_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        manifest.push_str(&format!("id:{};", id.to_ascii_lowercase()));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

pub fn sign(secret: &str, manifest: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(manifest.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(
    secret: &str,
    signature_header: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> bool {
    let mut ts = None;
    let mut v1 = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };

    let expected = sign(secret, &build_manifest(data_id, request_id, ts));
    expected.as_bytes().ct_eq(v1.to_ascii_lowercase().as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn header_for(data_id: &str, request_id: &str, ts: &str) -> String {
        let digest = sign(SECRET, &build_manifest(Some(data_id), Some(request_id), ts));
        format!("ts={},v1={}", ts, digest)
    }

    #[test]
    fn accepts_valid_signature() {
        let header = header_for("123456", "req-1", "1704908010");
        assert!(verify(SECRET, &header, Some("req-1"), Some("123456")));
    }

    #[test]
    fn rejects_signature_for_other_payment() {
        let header = header_for("123456", "req-1", "1704908010");
        assert!(!verify(SECRET, &header, Some("req-1"), Some("999999")));
    }

    #[test]
    fn rejects_wrong_secret() {
        let digest = sign("other", &build_manifest(Some("1"), Some("r"), "10"));
        let header = format!("ts=10,v1={}", digest);
        assert!(!verify(SECRET, &header, Some("r"), Some("1")));
    }

    #[test]
    fn rejects_header_without_digest() {
        assert!(!verify(SECRET, "ts=1704908010", None, Some("1")));
        assert!(!verify(SECRET, "", None, None));
    }

    #[test]
    fn manifest_skips_missing_parts() {
        assert_eq!(build_manifest(Some("ABC"), None, "5"), "id:abc;ts:5;");
        assert_eq!(build_manifest(None, Some("r"), "5"), "request-id:r;ts:5;");
    }
}
