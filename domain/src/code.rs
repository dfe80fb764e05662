//! Short-code generation.

use rand::Rng;

use crate::{CodeGenerator, CodePolicy, ShortCode};

/// Case-sensitive ASCII alphanumerics: 0-9, A-Z, a-z.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Returns true if every byte of `s` belongs to [`ALPHABET`].
pub fn in_alphabet(s: &str) -> bool {
    s.bytes().all(|b| ALPHABET.contains(&b))
}

/// Draws each character uniformly from [`ALPHABET`] using the thread-local
/// CSPRNG. With the default length of 6 there are 62^6 (~5.7e10) codes, so a
/// collision is unlikely but possible; callers must check uniqueness.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    /// Generator producing codes of `policy.length`.
    pub fn from_policy(policy: &CodePolicy) -> Self {
        Self::new(policy.length)
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ShortCode {
        let mut rng = rand::thread_rng();
        let s: String = (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        // Non-empty and alphanumeric by construction
        ShortCode(s)
    }
}
