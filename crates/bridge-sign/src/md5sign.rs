//! MD5 signing schemes for both channels.
//!
//! Both schemes sort keys in ASCII ascending order and drop the `sign`
//! field plus any empty value before hashing; the general scheme also
//! drops `signType`. They differ in how the plaintext is assembled:
//!
//! - game: `k1=v1&k2=v2&...&kn=vn` + `&` + secret
//! - general: `k1v1k2v2...knvn` + secret
//!
//! The digest is lowercase hex; comparison is case-insensitive.

use std::collections::HashMap;

/// Fields excluded from every scheme.
const SIGN_FIELD: &str = "sign";
/// Additionally excluded by the general scheme.
const SIGN_TYPE_FIELD: &str = "signType";

fn sorted_non_empty<'a>(
	params: &'a HashMap<String, String>,
	exclude_sign_type: bool,
) -> Vec<(&'a str, &'a str)> {
	let mut items: Vec<(&str, &str)> = params
		.iter()
		.filter(|(k, v)| {
			k.as_str() != SIGN_FIELD
				&& !(exclude_sign_type && k.as_str() == SIGN_TYPE_FIELD)
				&& !v.is_empty()
		})
		.map(|(k, v)| (k.as_str(), v.as_str()))
		.collect();
	items.sort_by(|a, b| a.0.cmp(b.0));
	items
}

fn md5_hex(plain: &str) -> String {
	format!("{:x}", md5::compute(plain.as_bytes()))
}

/// Computes the game-channel signature over a flat parameter map.
pub fn game_sign(params: &HashMap<String, String>, secret: &str) -> String {
	let items = sorted_non_empty(params, false);
	let joined = items
		.iter()
		.map(|(k, v)| format!("{}={}", k, v))
		.collect::<Vec<_>>()
		.join("&");
	md5_hex(&format!("{}&{}", joined, secret))
}

/// Verifies a game-channel signature.
///
/// An empty secret accepts everything; a missing `sign` field fails.
pub fn verify_game_sign(params: &HashMap<String, String>, secret: &str) -> bool {
	if secret.is_empty() {
		return true;
	}
	let received = match params.get(SIGN_FIELD) {
		Some(s) if !s.is_empty() => s,
		_ => return false,
	};
	game_sign(params, secret).eq_ignore_ascii_case(received)
}

/// Computes the general-channel signature over a flat parameter map.
pub fn general_sign(params: &HashMap<String, String>, secret: &str) -> String {
	let items = sorted_non_empty(params, true);
	let mut plain = String::new();
	for (k, v) in items {
		plain.push_str(k);
		plain.push_str(v);
	}
	plain.push_str(secret);
	md5_hex(&plain)
}

/// Verifies a general-channel signature.
///
/// An empty secret accepts everything; a missing `sign` field fails.
pub fn verify_general_sign(params: &HashMap<String, String>, secret: &str) -> bool {
	if secret.is_empty() {
		return true;
	}
	let received = match params.get(SIGN_FIELD) {
		Some(s) if !s.is_empty() => s,
		_ => return false,
	};
	general_sign(params, secret).eq_ignore_ascii_case(received)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn sign_then_verify_round_trips() {
		let mut p = params(&[("customerId", "C1"), ("data", "abc"), ("timestamp", "20240101000000")]);
		let sign = game_sign(&p, "K");
		p.insert("sign".to_string(), sign);
		assert!(verify_game_sign(&p, "K"));

		let mut q = params(&[("jdOrderNo", "J1"), ("produceStatus", "3")]);
		let sign = general_sign(&q, "K");
		q.insert("sign".to_string(), sign);
		assert!(verify_general_sign(&q, "K"));
	}

	#[test]
	fn tampered_sign_fails() {
		let mut p = params(&[("a", "1")]);
		p.insert("sign".to_string(), "bad".to_string());
		assert!(!verify_game_sign(&p, "K"));
		assert!(!verify_general_sign(&p, "K"));
	}

	#[test]
	fn missing_sign_fails() {
		let p = params(&[("a", "1")]);
		assert!(!verify_game_sign(&p, "K"));
		assert!(!verify_general_sign(&p, "K"));
	}

	#[test]
	fn empty_secret_accepts_everything() {
		let p = params(&[("a", "1")]);
		assert!(verify_game_sign(&p, ""));
		assert!(verify_general_sign(&p, ""));
	}

	#[test]
	fn signing_is_order_insensitive() {
		let p1 = params(&[("a", "1"), ("b", "2")]);
		let p2 = params(&[("b", "2"), ("a", "1")]);
		assert_eq!(game_sign(&p1, "S"), game_sign(&p2, "S"));
		assert_eq!(general_sign(&p1, "S"), general_sign(&p2, "S"));
	}

	#[test]
	fn empty_values_are_excluded() {
		let with_empty = params(&[("a", "1"), ("b", "")]);
		let without = params(&[("a", "1")]);
		assert_eq!(game_sign(&with_empty, "S"), game_sign(&without, "S"));
		assert_eq!(general_sign(&with_empty, "S"), general_sign(&without, "S"));
	}

	#[test]
	fn general_scheme_ignores_sign_type() {
		let with = params(&[("a", "1"), ("signType", "MD5")]);
		let without = params(&[("a", "1")]);
		assert_eq!(general_sign(&with, "S"), general_sign(&without, "S"));
		// The game scheme includes it.
		assert_ne!(game_sign(&with, "S"), game_sign(&without, "S"));
	}

	#[test]
	fn verification_is_case_insensitive() {
		let mut p = params(&[("a", "1")]);
		let sign = game_sign(&p, "K").to_uppercase();
		p.insert("sign".to_string(), sign);
		assert!(verify_game_sign(&p, "K"));
	}

	#[test]
	fn schemes_differ() {
		let p = params(&[("a", "1"), ("b", "2")]);
		assert_ne!(game_sign(&p, "S"), general_sign(&p, "S"));
	}
}
