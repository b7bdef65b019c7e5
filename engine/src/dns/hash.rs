//! Short, deterministic name hashes
//!
//! Record names embed a 6 character hash of the host or cluster name: the
//! SHA-224 digest read as a big-endian integer and written in base 36.

use sha2::{Digest, Sha224};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SHORT_HASH_LEN: usize = 6;

/// Hash `input` down to 6 lowercase base-36 characters
pub fn short_hash(input: &str) -> String {
    let digest = Sha224::digest(input.as_bytes());
    encode_base36(&digest)
        .chars()
        .take(SHORT_HASH_LEN)
        .collect()
}

/// Encode bytes as a base-36 number, most significant digit first.
///
/// Each leading zero byte becomes one leading `'0'`.
fn encode_base36(bytes: &[u8]) -> String {
    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let leading_zeros = bytes.len() - number.len();

    let mut digits = Vec::with_capacity(bytes.len() * 136 / 100 + 1);
    while !number.is_empty() {
        // Long division of the byte string by 36
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());
        for byte in &number {
            let acc = (remainder << 8) | u32::from(*byte);
            let q = acc / 36;
            remainder = acc % 36;
            if !quotient.is_empty() || q != 0 {
                quotient.push(q as u8);
            }
        }
        digits.push(BASE36_ALPHABET[remainder as usize]);
        number = quotient;
    }

    digits.extend(std::iter::repeat(b'0').take(leading_zeros));
    digits.into_iter().rev().map(char::from).collect()
}
