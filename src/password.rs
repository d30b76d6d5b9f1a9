use rand::{Rng, rngs::OsRng, seq::SliceRandom};

use crate::errors::AuthError;

// The four composition classes. SPECIAL matches the characters accepted by the
// strength validator below; the two must stay in sync.
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()-_=+[]{};:,.<>?";

/// Minimum accepted password length.
const MIN_LENGTH: usize = 8;

/// StrengthReport
///
/// The result of a composition check. `errors` lists EVERY violated rule rather than
/// short-circuiting on the first, so a client can render the complete checklist.
#[derive(Debug, Clone)]
pub struct StrengthReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// PasswordPolicy
///
/// Hashes and verifies passwords with bcrypt, enforces the composition rules, and
/// generates random compliant passwords. The work factor is configuration-driven
/// (default 12); tests use the bcrypt minimum to stay fast.
///
/// bcrypt is CPU-bound, so both `hash` and `verify` run under `spawn_blocking` to keep
/// the hash off the async reactor's critical path.
#[derive(Clone)]
pub struct PasswordPolicy {
    cost: u32,
}

impl PasswordPolicy {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// hash
    ///
    /// One-way hashes a plaintext password with the configured cost factor. The only
    /// failure mode is the bcrypt primitive itself erroring, surfaced as
    /// `AuthError::Hashing`; valid UTF-8 input of reasonable length never fails.
    pub async fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// hash_blocking
    ///
    /// Synchronous variant used on startup paths (dummy-hash precomputation, seed
    /// users) where no reactor is being blocked.
    pub fn hash_blocking(&self, plaintext: &str) -> Result<String, AuthError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// verify
    ///
    /// Compares a plaintext candidate against a stored hash. bcrypt's comparison is
    /// constant-time. This function NEVER errors: a malformed stored hash logs a
    /// warning and reads as a mismatch, because from the caller's perspective a
    /// corrupt credential record and a wrong password must look identical.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        match tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "password verification task failed");
                false
            }
        }
    }

    /// validate_strength
    ///
    /// Checks minimum length and presence of all four character classes, reporting
    /// every violated rule.
    pub fn validate_strength(&self, plaintext: &str) -> StrengthReport {
        let mut errors = Vec::new();

        if plaintext.chars().count() < MIN_LENGTH {
            errors.push(format!("must be at least {} characters long", MIN_LENGTH));
        }
        if !plaintext.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("must contain an uppercase letter".to_string());
        }
        if !plaintext.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("must contain a lowercase letter".to_string());
        }
        if !plaintext.chars().any(|c| c.is_ascii_digit()) {
            errors.push("must contain a digit".to_string());
        }
        if !plaintext.bytes().any(|b| SPECIAL.contains(&b)) {
            errors.push("must contain a special character".to_string());
        }

        StrengthReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// generate_random
    ///
    /// Produces a random password that satisfies the composition rules: one character
    /// from each class is guaranteed, the remainder is drawn uniformly from the union
    /// alphabet, and the whole buffer is Fisher-Yates shuffled so class positions are
    /// unpredictable. All randomness comes from the OS entropy source, making the
    /// output safe to use as an actual credential (seed accounts, admin bootstrap).
    ///
    /// Lengths below the four-class minimum are clamped up to it.
    pub fn generate_random(&self, length: usize) -> String {
        let length = length.max(4);
        let mut rng = OsRng;

        let mut chars: Vec<u8> = Vec::with_capacity(length);
        for class in [UPPER, LOWER, DIGITS, SPECIAL] {
            chars.push(class[rng.gen_range(0..class.len())]);
        }

        let union: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
        for _ in chars.len()..length {
            chars.push(union[rng.gen_range(0..union.len())]);
        }

        chars.shuffle(&mut rng);

        // All class alphabets are ASCII, so the buffer is always valid UTF-8.
        String::from_utf8_lossy(&chars).into_owned()
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PasswordPolicy {
        // Minimum bcrypt cost keeps the suite fast.
        PasswordPolicy::new(4)
    }

    #[tokio::test]
    async fn hash_then_verify_round_trips() {
        let policy = policy();
        let hash = policy.hash("Correct-Horse-9").await.unwrap();
        assert!(policy.verify("Correct-Horse-9", &hash).await);
        assert!(!policy.verify("correct-horse-9", &hash).await);
    }

    #[tokio::test]
    async fn verify_returns_false_on_malformed_hash() {
        let policy = policy();
        assert!(!policy.verify("whatever", "not-a-bcrypt-hash").await);
        assert!(!policy.verify("whatever", "").await);
    }

    #[test]
    fn validate_strength_reports_every_violation() {
        let report = policy().validate_strength("abc");
        assert!(!report.valid);
        // "abc" has lowercase, so exactly four rules are violated.
        assert_eq!(report.errors.len(), 4);
    }

    #[test]
    fn validate_strength_accepts_compliant_password() {
        let report = policy().validate_strength("Str0ng!pass");
        assert!(report.valid, "unexpected violations: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn generated_password_is_always_compliant() {
        let policy = policy();
        for _ in 0..50 {
            let password = policy.generate_random(12);
            assert_eq!(password.len(), 12);
            let report = policy.validate_strength(&password);
            assert!(report.valid, "{password:?} violated {:?}", report.errors);
        }
    }

    #[test]
    fn generated_password_clamps_short_lengths() {
        let password = policy().generate_random(1);
        assert_eq!(password.len(), 4);
        assert!(policy().validate_strength(&password).errors.len() <= 1);
    }

    #[test]
    fn generated_class_positions_are_shuffled() {
        // With a fixed class-per-position layout, position 0 would always be
        // uppercase. Across many samples we expect to observe a non-uppercase
        // leading character.
        let policy = policy();
        let saw_non_upper_first = (0..100)
            .map(|_| policy.generate_random(12))
            .any(|p| !p.as_bytes()[0].is_ascii_uppercase());
        assert!(saw_non_upper_first);
    }
}
