//! XXTEA codec matching the eTRV firmware bit-exactly.
//!
//! The device speaks Corrected Block TEA over 32-bit words with the usual
//! `DELTA` and `6 + 52/n` rounds. Word order is the one quirk worth
//! writing down: the firmware stack byte-reverses every 4-byte chunk
//! around a little-endian cipher core, so on the wire **data words are
//! big-endian while key words are little-endian**. This is a fixed
//! external contract; do not "fix" it.
//!
//! Pure functions, no state, deterministic.

use ecotrv_domain::identity::SecretKey;

use crate::error::CryptoError;

const DELTA: u32 = 0x9E37_79B9;
/// XXTEA operates on at least two words.
const MIN_LEN: usize = 8;

/// Encrypt a payload in place of the device's firmware.
///
/// # Errors
///
/// Returns [`CryptoError`] when the payload is shorter than 8 bytes or not
/// a multiple of 4.
pub fn encrypt(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let mut words = to_words(plaintext)?;
    btea_encrypt(&mut words, &key_words(key));
    Ok(from_words(&words))
}

/// Decrypt a payload read from an encrypted characteristic.
///
/// # Errors
///
/// Returns [`CryptoError`] when the payload is shorter than 8 bytes or not
/// a multiple of 4.
pub fn decrypt(ciphertext: &[u8], key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let mut words = to_words(ciphertext)?;
    btea_decrypt(&mut words, &key_words(key));
    Ok(from_words(&words))
}

/// Key words are little-endian (the firmware copies the key straight into
/// its word buffer without the chunk reversal it applies to data).
fn key_words(key: &SecretKey) -> [u32; 4] {
    let bytes = key.as_bytes();
    [
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
    ]
}

/// Data words are big-endian (chunk reversal around the LE core).
fn to_words(data: &[u8]) -> Result<Vec<u32>, CryptoError> {
    if data.len() < MIN_LEN {
        return Err(CryptoError::TooShort { actual: data.len() });
    }
    if data.len() % 4 != 0 {
        return Err(CryptoError::NotBlockAligned { actual: data.len() });
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn from_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

fn mx(sum: u32, y: u32, z: u32, p: usize, e: u32, key: &[u32; 4]) -> u32 {
    let index = (p & 3) ^ e as usize;
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[index] ^ z))
}

fn btea_encrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let rounds = 6 + 52 / n;
    let mut sum: u32 = 0;
    let mut z = v[n - 1];
    for _ in 0..rounds {
        sum = sum.wrapping_add(DELTA);
        let e = (sum >> 2) & 3;
        for p in 0..n {
            let y = v[(p + 1) % n];
            v[p] = v[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = v[p];
        }
    }
}

fn btea_decrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    let rounds = 6 + 52 / n;
    #[allow(clippy::cast_possible_truncation)]
    let mut sum = (rounds as u32).wrapping_mul(DELTA);
    let mut y = v[0];
    for _ in 0..rounds {
        let e = (sum >> 2) & 3;
        for p in (0..n).rev() {
            let z = v[(p + n - 1) % n];
            v[p] = v[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = v[p];
        }
        sum = sum.wrapping_sub(DELTA);
    }
}
