//! Small digest helpers backing entity tag generation.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Folds an arbitrary byte sequence into 16 bytes by XOR-ing each input byte
/// into `out[i % 16]`.
///
/// This is not a cryptographic hash. It is cheap, stable across processes,
/// and adequate for weak entity tags derived from file metadata.
pub fn xor_fold16(input: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, b) in input.iter().enumerate() {
        out[i % 16] ^= b;
    }
    out
}

/// Lowercase hex encoding of a byte slice.
pub fn hex_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len() * 2);
    for b in input {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}
