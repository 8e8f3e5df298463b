//! Request signing shared by Aster and BingX spot (spec.md §4.3, §6.1).
//!
//! Both exchanges sign the URL-encoded query string — parameters in
//! insertion order, `timestamp` appended before signing — with
//! HMAC-SHA256, then append `&signature=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// One signed-request parameter, in the order it should be encoded.
pub type Params = Vec<(String, String)>;

/// Build the `application/x-www-form-urlencoded` query string for `params`
/// in insertion order (not re-sorted — the exchanges sign whatever order
/// the caller appended them in, and so do we).
pub fn encode_query(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign `query` with HMAC-SHA256 under `secret`, returning lowercase hex.
pub fn sign(secret: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Append `timestamp` (ms since epoch) and a trailing `signature=<hex>` to
/// `params`, returning the fully-signed query string ready to send.
pub fn build_signed_query(mut params: Params, secret: &str, timestamp_ms: u64) -> String {
    params.push(("timestamp".to_string(), timestamp_ms.to_string()));
    let query = encode_query(&params);
    let signature = sign(secret, &query);
    format!("{query}&signature={signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let params = vec![("symbol".to_string(), "BTCUSDT".to_string())];
        let signed = build_signed_query(params.clone(), "secret", 1_700_000_000_000);
        let signed_again = build_signed_query(params, "secret", 1_700_000_000_000);
        assert_eq!(signed, signed_again);
        assert!(signed.contains("&signature="));
        let sig = signed.rsplit("signature=").next().unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn preserves_insertion_order_not_sorted() {
        let params = vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("side".to_string(), "BUY".to_string()),
        ];
        let query = encode_query(&params);
        assert!(query.starts_with("symbol=BTCUSDT&side=BUY"));
    }
}
