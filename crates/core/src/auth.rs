//! Password hashing and generation.

use rand::{seq::SliceRandom, Rng};
use sha2::{Digest, Sha256};

use crate::validators::PASSWORD_SPECIALS;

const DIGITS: &str = "0123456789";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of generated passwords, matching the validator minimum.
pub const GENERATED_PASSWORD_LEN: usize = 16;

/// Single SHA-256 digest of the password, lowercase hex.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare a candidate password against a stored digest.
pub fn verify_password(candidate: &str, stored_hash: &str) -> bool {
    hash_password(candidate) == stored_hash
}

/// Generate a password that always satisfies [`crate::validators::validate_password`].
///
/// One character is drawn from each required class, the remainder from the
/// union of the classes, and the result is shuffled. Symbols come only from
/// the validator's accepted set.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let mut chars: Vec<char> = vec![
        pick(&mut rng, DIGITS),
        pick(&mut rng, LOWERCASE),
        pick(&mut rng, UPPERCASE),
        pick(&mut rng, PASSWORD_SPECIALS),
    ];

    let pool: Vec<char> = [DIGITS, LOWERCASE, UPPERCASE, PASSWORD_SPECIALS]
        .concat()
        .chars()
        .collect();
    while chars.len() < GENERATED_PASSWORD_LEN {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

fn pick(rng: &mut impl Rng, class: &str) -> char {
    let chars: Vec<char> = class.chars().collect();
    chars[rng.gen_range(0..chars.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::validate_password;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = hash_password("password");
        assert_eq!(
            hash,
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert!(verify_password("password", &hash));
        assert!(!verify_password("Password", &hash));
    }

    #[test]
    fn generated_passwords_pass_validation() {
        for _ in 0..50 {
            let password = generate_password();
            assert_eq!(password.chars().count(), GENERATED_PASSWORD_LEN);
            assert!(validate_password(&password), "rejected: {password}");
        }
    }
}
