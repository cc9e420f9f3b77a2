//! PagStream webhook signature (HMAC-MD5 over the payload's leaf values).
//!
//! The signed text is every scalar leaf of the JSON document, in document
//! order, with `secret` and `signature` fields left out, followed by the
//! decimal UTF-16 length of that concatenation. Arrays contribute nothing,
//! including any objects nested inside them.

use hmac::{Hmac, Mac};
use md5::Md5;
use serde_json::Value;

type HmacMd5 = Hmac<Md5>;

const EXCLUDED_FIELDS: [&str; 2] = ["secret", "signature"];

pub fn signed_text(payload: &Value) -> String {
    let mut text = String::new();
    collect_leaves(payload, &mut text);
    let len = text.encode_utf16().count();
    text.push_str(&len.to_string());
    text
}

fn collect_leaves(node: &Value, out: &mut String) {
    match node {
        Value::Object(fields) => {
            for (name, value) in fields {
                if EXCLUDED_FIELDS.contains(&name.as_str()) {
                    continue;
                }
                collect_leaves(value, out);
            }
        }
        Value::Array(_) => {}
        Value::String(s) => out.push_str(s),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

/// Lowercase hex HMAC-MD5 of `data`.
pub fn hmac_md5_hex(data: &str, key: &[u8]) -> Option<String> {
    let mut mac = HmacMd5::new_from_slice(key).ok()?;
    mac.update(data.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Signature the provider would attach to `payload`.
pub fn sign(payload: &Value, key: &[u8]) -> Option<String> {
    hmac_md5_hex(&signed_text(payload), key)
}

/// Constant-time check of `signature` against the payload.
///
/// The provider sends lowercase hex; any other spelling is rejected.
pub fn verify(payload: &Value, signature: &str, key: &[u8]) -> bool {
    if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacMd5::new_from_slice(key) else {
        return false;
    };
    mac.update(signed_text(payload).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rfc2104_vector() {
        assert_eq!(
            hmac_md5_hex("what do ya want for nothing?", b"Jefe").unwrap(),
            "750c783e6ab0b503eaa86e310a5db738"
        );
    }

    #[test]
    fn leaves_follow_document_order_and_skip_credentials() {
        let payload: Value = serde_json::from_str(
            r#"{"subscription":"S1","secret":"x","status":1,"paid":true,"note":null,
                "items":[{"sku":"A","qty":2},"B"],"signature":"abc"}"#,
        )
        .unwrap();
        assert_eq!(signed_text(&payload), "S11truenull11");
    }

    #[test]
    fn arrays_add_nothing_to_the_signed_text() {
        let with_items = json!({"subscription": "S1", "products": [{"sku": "KIT01", "qty": 2}, "x", 3]});
        let without = json!({"subscription": "S1", "products": []});
        assert_eq!(signed_text(&with_items), "S12");
        assert_eq!(sign(&with_items, b"key"), sign(&without, b"key"));
    }

    #[test]
    fn nested_credential_fields_are_skipped() {
        let payload = json!({"a": {"secret": "s", "b": "c"}});
        assert_eq!(signed_text(&payload), "c1");
    }

    #[test]
    fn length_counts_utf16_units() {
        let payload = json!({"name": "São 😀"});
        // Four BMP units plus one surrogate pair.
        assert_eq!(signed_text(&payload), "São 😀6");
    }

    #[test]
    fn verify_accepts_own_signature() {
        let mut payload = json!({"subscription": "S1", "status": 3, "number_recurrences": 4});
        let signature = sign(&payload, b"key").unwrap();
        payload["signature"] = Value::String(signature.clone());

        assert!(verify(&payload, &signature, b"key"));
        assert!(!verify(&payload, &signature, b"other-key"));
        assert!(!verify(&payload, "not-hex", b"key"));
    }

    #[test]
    fn uppercase_signature_is_rejected() {
        let payload = json!({"subscription": "S1", "status": 3, "number_recurrences": 4});
        let signature = sign(&payload, b"key").unwrap();
        let upper = signature.to_uppercase();
        assert_ne!(upper, signature);
        assert!(!verify(&payload, &upper, b"key"));

        let mut mixed = signature.clone();
        let at = mixed.find(|c: char| c.is_ascii_alphabetic()).unwrap();
        mixed.replace_range(at..at + 1, &mixed[at..at + 1].to_uppercase());
        assert!(!verify(&payload, &mixed, b"key"));
    }

    #[test]
    fn tampering_breaks_the_signature() {
        let payload = json!({"subscription": "S1", "status": 3});
        let signature = sign(&payload, b"key").unwrap();
        let tampered = json!({"subscription": "S1", "status": 1});
        assert!(!verify(&tampered, &signature, b"key"));
    }
}
