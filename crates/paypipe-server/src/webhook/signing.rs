//! `Stripe-Signature` header verification
//!
//! The header carries a unix timestamp and one or more HMAC-SHA256 digests:
//! `t=1700000000,v1=5257a8...,v1=...`. A digest is computed over
//! `"{t}." + raw_body` with the shared secret.

use hmac::{Hmac, Mac};
use paypipe_common::{checksum, PipelineError, Result};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header name, lower-cased as stored
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parse `t=<ts>,v1=<hex>[,v1=<hex>...]`. Unknown keys and pieces without
    /// `=` are ignored.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for piece in header.split(',') {
            let Some((key, value)) = piece.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    let ts = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| PipelineError::signature("Invalid Stripe-Signature header"))?;
                    timestamp = Some(ts);
                }
                "v1" => signatures.push(value.trim().to_string()),
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Ok(Self { timestamp, signatures }),
            _ => Err(PipelineError::signature("Invalid Stripe-Signature header")),
        }
    }
}

fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PipelineError::config(format!("invalid webhook secret: {e}")))?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(mac)
}

/// Hex digest a sender would put in `v1=` for this payload.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    Ok(hex::encode(mac(secret, timestamp, payload)?.finalize().into_bytes()))
}

/// Verify `header` against `payload`.
///
/// The timestamp must be within `tolerance_seconds` of `now_ts` in either
/// direction, and at least one `v1` digest must match. Digests are compared
/// in constant time.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_seconds: i64,
    now_ts: i64,
) -> Result<()> {
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| PipelineError::signature("Missing Stripe-Signature header"))?;
    let parsed = SignatureHeader::parse(header)?;

    if now_ts.abs_diff(parsed.timestamp) > tolerance_seconds.unsigned_abs() {
        return Err(PipelineError::signature("Signature timestamp outside tolerance"));
    }

    let expected = mac(secret, parsed.timestamp, payload)?;
    let matched = parsed.signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(PipelineError::signature("Invalid signature"))
    }
}

/// The event's own `id` when the body is a JSON object carrying a non-blank
/// string id, otherwise a digest of the raw bytes.
pub fn extract_event_id(payload: &[u8]) -> String {
    serde_json::from_slice::<Value>(payload)
        .ok()
        .and_then(|value| match value.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        })
        .unwrap_or_else(|| checksum::stable_hash_id(payload))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_test_1","type":"charge.succeeded"}"#;
    const NOW: i64 = 1_700_000_000;

    fn header(ts: i64, sigs: &[&str]) -> String {
        let mut parts = vec![format!("t={ts}")];
        parts.extend(sigs.iter().map(|s| format!("v1={s}")));
        parts.join(",")
    }

    #[test]
    fn test_parse_header() {
        let parsed = SignatureHeader::parse("t=1700000000, v1=abc,v0=old,v1=def,junk").unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000);
        assert_eq!(parsed.signatures, vec!["abc", "def"]);
    }

    #[test]
    fn test_parse_header_requires_timestamp_and_v1() {
        assert!(SignatureHeader::parse("v1=abc").is_err());
        assert!(SignatureHeader::parse("t=1700000000").is_err());
        assert!(SignatureHeader::parse("t=soon,v1=abc").is_err());
    }

    #[test]
    fn test_valid_signature_accepted() {
        let sig = compute_signature(SECRET, NOW - 10, BODY).unwrap();
        let h = header(NOW - 10, &["deadbeef", &sig]);
        verify_signature(BODY, Some(&h), SECRET, 300, NOW).unwrap();
    }

    #[test]
    fn test_expired_timestamp_rejected_even_if_hmac_matches() {
        let ts = NOW - 301;
        let sig = compute_signature(SECRET, ts, BODY).unwrap();
        let err = verify_signature(BODY, Some(&header(ts, &[&sig])), SECRET, 300, NOW).unwrap_err();
        assert!(matches!(err, PipelineError::SignatureVerification(ref m) if m.contains("tolerance")));

        // Future timestamps are held to the same bound
        let ts = NOW + 301;
        let sig = compute_signature(SECRET, ts, BODY).unwrap();
        assert!(verify_signature(BODY, Some(&header(ts, &[&sig])), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_mismatch_rejected() {
        let sig = compute_signature("whsec_other", NOW, BODY).unwrap();
        let err = verify_signature(BODY, Some(&header(NOW, &[&sig, "not-hex"])), SECRET, 300, NOW)
            .unwrap_err();
        assert_eq!(err.to_string(), "Signature verification failed: Invalid signature");

        let tampered = br#"{"id":"evt_test_1","type":"charge.refunded"}"#;
        let sig = compute_signature(SECRET, NOW, BODY).unwrap();
        assert!(verify_signature(tampered, Some(&header(NOW, &[&sig])), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(verify_signature(BODY, None, SECRET, 300, NOW).is_err());
        assert!(verify_signature(BODY, Some("  "), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_extract_event_id() {
        assert_eq!(extract_event_id(BODY), "evt_test_1");

        let blank = br#"{"id":"  "}"#;
        assert_eq!(extract_event_id(blank), checksum::sha256_hex(blank));
        assert_eq!(extract_event_id(b"not json"), checksum::sha256_hex(b"not json"));
        assert_eq!(extract_event_id(br#"{"id":42}"#).len(), 64);
    }
}
