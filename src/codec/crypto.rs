//! # Decryption
//!
//! AES-CTR decryption try-loop over the configured key list (§4.2, §6.4).
//! The block-cipher plumbing mirrors the base crate's `wmbus::crypto`
//! technique: encrypt the counter block with the raw block cipher and XOR it
//! against the ciphertext, rather than reaching for a streaming-CTR crate.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine};

use super::payload::decode_data;
use super::{envelope::MeshPacket, CodecError, Data};
use crate::constants::MAX_DECRYPTED_BYTES;

enum BlockCipher {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl BlockCipher {
    fn from_key(key: &[u8]) -> Option<Self> {
        match key.len() {
            16 => Aes128::new_from_slice(key).ok().map(|c| BlockCipher::Aes128(Box::new(c))),
            32 => Aes256::new_from_slice(key).ok().map(|c| BlockCipher::Aes256(Box::new(c))),
            _ => None,
        }
    }

    fn encrypt_block(&self, block: &mut [u8; 16]) {
        let mut array = GenericArray::clone_from_slice(block);
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(&mut array),
            BlockCipher::Aes256(c) => c.encrypt_block(&mut array),
        }
        block.copy_from_slice(&array);
    }
}

/// Builds the 16-byte CTR nonce per §4.2: `packet.id` as u64 LE (bytes 0..8),
/// `packet.from` as u32 LE (bytes 8..12), a zero block counter (bytes
/// 12..16).
fn build_nonce(id: u32, from: u32) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[0..8].copy_from_slice(&(id as u64).to_le_bytes());
    nonce[8..12].copy_from_slice(&from.to_le_bytes());
    nonce
}

fn increment_counter(counter: &mut [u8; 16]) {
    for byte in counter[12..16].iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

fn ctr_process(cipher: &BlockCipher, data: &[u8], nonce: [u8; 16]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut counter = nonce;

    for chunk in data.chunks(16) {
        let mut keystream = counter;
        cipher.encrypt_block(&mut keystream);
        for (i, &byte) in chunk.iter().enumerate() {
            result.push(byte ^ keystream[i]);
        }
        increment_counter(&mut counter);
    }

    result
}

/// Tries each configured key (base64-encoded) in order against `ciphertext`.
/// The first key whose decryption both lies in `(0, 65536]` bytes and decodes
/// as a `Data` record wins (§4.2). Returns `NoKeyMatched` if none do — this
/// is an expected, non-error outcome at the call site.
pub fn try_decrypt(ciphertext: &[u8], id: u32, from: u32, keys: &[String]) -> Result<Data, CodecError> {
    let nonce = build_nonce(id, from);

    for encoded_key in keys {
        let Ok(key_bytes) = STANDARD.decode(encoded_key) else {
            continue;
        };
        let Some(cipher) = BlockCipher::from_key(&key_bytes) else {
            continue;
        };

        let plaintext = ctr_process(&cipher, ciphertext, nonce);
        if plaintext.is_empty() || plaintext.len() > MAX_DECRYPTED_BYTES {
            continue;
        }

        if let Ok(data) = decode_data(&plaintext) {
            return Ok(data);
        }
    }

    Err(CodecError::NoKeyMatched)
}

/// Resolves a [`MeshPacket`]'s payload to a [`Data`] record, decrypting with
/// the configured keys if the packet carries `encrypted` bytes rather than
/// an already-decoded payload.
pub fn resolve_payload(packet: &MeshPacket, keys: &[String]) -> Result<Data, CodecError> {
    match &packet.payload {
        super::envelope::PacketPayload::Decoded(data) => Ok(data.clone()),
        super::envelope::PacketPayload::Encrypted(bytes) => {
            try_decrypt(bytes, packet.id, packet.from, keys)
        }
    }
}
