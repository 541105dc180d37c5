//! An incremental UTF-8 validator.
//!
//! Body streams arrive in arbitrary chunks, so validation has to be able to
//! stop and resume in the middle of a multi-byte sequence. The validator
//! follows the byte ranges from RFC 3629, rejecting overlong encodings,
//! surrogates and code points above U+10FFFF.

/// Streaming UTF-8 validator.
///
/// Feed byte chunks with [`feed`](Utf8Validator::feed); once any invalid byte
/// is seen the validator stays invalid. [`finish`](Utf8Validator::finish)
/// additionally rejects input that ends in the middle of a sequence.
#[derive(Clone, Debug)]
pub struct Utf8Validator {
    /// Continuation bytes still expected for the current sequence.
    remaining: u8,
    /// Allowed range for the next continuation byte; the constrained first
    /// continuation byte after E0/ED/F0/F4 narrows it, all later ones use
    /// the full 0x80..=0xBF range.
    lower: u8,
    upper: u8,
    valid: bool,
}

impl Default for Utf8Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Validator {
    /// Creates a validator in the initial (valid, between sequences) state.
    pub fn new() -> Utf8Validator {
        Utf8Validator {
            remaining: 0,
            lower: 0x80,
            upper: 0xbf,
            valid: true,
        }
    }

    /// Consumes a chunk, returning `false` as soon as the accumulated input
    /// can no longer be a prefix of valid UTF-8.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        if !self.valid {
            return false;
        }

        for &b in bytes {
            if self.remaining > 0 {
                if b < self.lower || b > self.upper {
                    self.valid = false;
                    return false;
                }
                self.remaining -= 1;
                self.lower = 0x80;
                self.upper = 0xbf;
                continue;
            }

            match b {
                0x00..=0x7f => {}
                0xc2..=0xdf => {
                    self.remaining = 1;
                }
                0xe0 => {
                    self.remaining = 2;
                    self.lower = 0xa0;
                }
                0xe1..=0xec | 0xee..=0xef => {
                    self.remaining = 2;
                }
                0xed => {
                    self.remaining = 2;
                    self.upper = 0x9f;
                }
                0xf0 => {
                    self.remaining = 3;
                    self.lower = 0x90;
                }
                0xf1..=0xf3 => {
                    self.remaining = 3;
                }
                0xf4 => {
                    self.remaining = 3;
                    self.upper = 0x8f;
                }
                _ => {
                    self.valid = false;
                    return false;
                }
            }
        }

        true
    }

    /// True if everything consumed so far is valid and no sequence is left
    /// open.
    pub fn finish(&self) -> bool {
        self.valid && self.remaining == 0
    }
}

/// Validates a complete byte slice in one call.
pub fn validate_utf8(bytes: &[u8]) -> bool {
    let mut validator = Utf8Validator::new();
    validator.feed(bytes);
    validator.finish()
}
