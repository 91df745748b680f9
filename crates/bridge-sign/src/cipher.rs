//! AES-256-ECB cipher for the general channel's card payload.
//!
//! ECB is mandated by the upstream protocol and must not be swapped for
//! another mode. The key derivation is an upstream quirk preserved
//! bit-exact: the raw secret bytes are truncated or right-padded with
//! NUL to 32 bytes. Padding is PKCS7; ciphertext is standard base64.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const BLOCK: usize = 16;
const KEY_LEN: usize = 32;

/// Errors raised while decrypting a card payload.
#[derive(Debug, Error)]
pub enum CipherError {
	#[error("invalid base64 ciphertext: {0}")]
	Base64(String),
	#[error("ciphertext length {0} is not a multiple of the block size")]
	Length(usize),
	#[error("invalid PKCS7 padding")]
	Padding,
	#[error("plaintext is not valid UTF-8")]
	Utf8,
}

fn derive_key(secret: &str) -> [u8; KEY_LEN] {
	let mut key = [0u8; KEY_LEN];
	let bytes = secret.as_bytes();
	let take = bytes.len().min(KEY_LEN);
	key[..take].copy_from_slice(&bytes[..take]);
	key
}

/// Encrypts a string, returning standard base64 ciphertext.
pub fn aes_ecb_encrypt(plain: &str, secret: &str) -> String {
	let key = derive_key(secret);
	let cipher = Aes256::new(GenericArray::from_slice(&key));

	let mut buf = plain.as_bytes().to_vec();
	let pad = BLOCK - (buf.len() % BLOCK);
	buf.extend(std::iter::repeat(pad as u8).take(pad));

	for chunk in buf.chunks_mut(BLOCK) {
		cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
	}

	STANDARD.encode(&buf)
}

/// Decrypts standard base64 ciphertext back into a string.
pub fn aes_ecb_decrypt(ciphertext: &str, secret: &str) -> Result<String, CipherError> {
	let mut buf = STANDARD
		.decode(ciphertext.as_bytes())
		.map_err(|e| CipherError::Base64(e.to_string()))?;
	if buf.is_empty() || buf.len() % BLOCK != 0 {
		return Err(CipherError::Length(buf.len()));
	}

	let key = derive_key(secret);
	let cipher = Aes256::new(GenericArray::from_slice(&key));
	for chunk in buf.chunks_mut(BLOCK) {
		cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
	}

	let pad = *buf.last().ok_or(CipherError::Padding)? as usize;
	if pad == 0 || pad > BLOCK || pad > buf.len() {
		return Err(CipherError::Padding);
	}
	if buf[buf.len() - pad..].iter().any(|&b| b as usize != pad) {
		return Err(CipherError::Padding);
	}
	buf.truncate(buf.len() - pad);

	String::from_utf8(buf).map_err(|_| CipherError::Utf8)
}
