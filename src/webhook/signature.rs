//! HMAC-SHA256 signing and verification for webhook payloads.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
// self
use crate::webhook::RejectReason;

type HmacSha256 = Hmac<Sha256>;

const DIGEST_LEN: usize = 32;

/// Computes the lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_hex(secret: &str, payload: &[u8]) -> Result<String, InvalidLength> {
	let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;

	mac.update(payload);

	Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Decodes a signature header into raw digest bytes.
///
/// Accepts `sha256=<hex>`, bare hex, or base64 (standard or URL-safe without padding).
pub fn decode_signature(header: &str) -> Result<Vec<u8>, RejectReason> {
	let header = header.trim();

	if header.is_empty() {
		return Err(RejectReason::MissingSignature);
	}

	let bytes = if let Some(hex) = header.strip_prefix("sha256=") {
		hex::decode(hex).map_err(|_| RejectReason::MalformedSignature)?
	} else if header.len() == DIGEST_LEN * 2 && header.bytes().all(|b| b.is_ascii_hexdigit()) {
		hex::decode(header).map_err(|_| RejectReason::MalformedSignature)?
	} else {
		STANDARD
			.decode(header)
			.or_else(|_| URL_SAFE_NO_PAD.decode(header))
			.map_err(|_| RejectReason::MalformedSignature)?
	};

	if bytes.len() != DIGEST_LEN {
		return Err(RejectReason::MalformedSignature);
	}

	Ok(bytes)
}

/// Checks `signature` against the HMAC-SHA256 of `payload` in constant time.
pub fn verify(secret: &str, payload: &[u8], signature: &[u8]) -> bool {
	let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
		return false;
	};

	mac.update(payload);

	mac.verify_slice(signature).is_ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn all_header_formats_decode_to_the_same_digest() {
		let hex = sign_hex("whsec", b"{}").expect("HMAC accepts any key length.");
		let raw = hex::decode(&hex).expect("Signature should be hex.");

		assert_eq!(decode_signature(&format!("sha256={hex}")), Ok(raw.clone()));
		assert_eq!(decode_signature(&hex), Ok(raw.clone()));
		assert_eq!(decode_signature(&STANDARD.encode(&raw)), Ok(raw.clone()));
		assert_eq!(decode_signature(&URL_SAFE_NO_PAD.encode(&raw)), Ok(raw));
	}

	#[test]
	fn malformed_headers_are_rejected() {
		assert_eq!(decode_signature("  "), Err(RejectReason::MissingSignature));
		assert_eq!(decode_signature("sha256=zz"), Err(RejectReason::MalformedSignature));
		assert_eq!(decode_signature("sha256=abcd"), Err(RejectReason::MalformedSignature));
		assert_eq!(decode_signature("not a signature!"), Err(RejectReason::MalformedSignature));
	}

	#[test]
	fn verification_requires_the_same_secret_and_payload() {
		let raw = hex::decode(sign_hex("whsec", b"payload").expect("HMAC accepts any key length."))
			.expect("Signature should be hex.");

		assert!(verify("whsec", b"payload", &raw));
		assert!(!verify("other", b"payload", &raw));
		assert!(!verify("whsec", b"payload2", &raw));
	}
}
