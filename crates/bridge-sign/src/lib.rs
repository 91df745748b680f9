//! Signature and envelope primitives for the order bridge.
//!
//! Four pure building blocks shared by the inbound handlers and the
//! outbound clients:
//! - the game channel's MD5 scheme (`k1=v1&...&<secret>`),
//! - the general channel's MD5 scheme (`k1v1k2v2...<secret>`),
//! - the game channel's base64-JSON data envelope, and
//! - the general channel's AES-256-ECB card-code cipher.
//!
//! Signing and verification never fail: verification answers `false` on
//! a missing or mismatched signature, and an empty secret is a
//! configuration opt-out that accepts everything.

/// AES-256-ECB cipher for the general channel's card payload.
pub mod cipher;
/// Base64-JSON data envelope of the game channel.
pub mod envelope;
/// MD5 signing schemes for both channels.
pub mod md5sign;

pub use cipher::{aes_ecb_decrypt, aes_ecb_encrypt, CipherError};
pub use envelope::{decode_envelope, encode_envelope, EnvelopeError};
pub use md5sign::{game_sign, general_sign, verify_game_sign, verify_general_sign};
