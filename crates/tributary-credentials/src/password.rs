//! Password generation.

use rand::Rng;
use rand::distributions::Alphanumeric;

pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Generates random alphanumeric passwords.
#[derive(Debug, Clone, Copy)]
pub struct PasswordGenerator {
    length: usize,
}

impl Default for PasswordGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PASSWORD_LENGTH)
    }
}

impl PasswordGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length_and_charset() {
        let password = PasswordGenerator::new(24).generate();
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_passwords_differ() {
        let generator = PasswordGenerator::default();
        assert_ne!(generator.generate(), generator.generate());
    }
}
