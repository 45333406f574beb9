//! Password hashing and credential input validation.

use std::sync::{Arc, OnceLock};

use bcrypt::{hash, verify};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt only looks at the first 72 bytes, so longer passwords are rejected.
pub const MAX_PASSWORD_LENGTH: usize = 72;

const MAX_EMAIL_LENGTH: usize = 254;

/// Checked against when a login names an unknown account.
const DUMMY_PASSWORD: &str = "tokenrelay-dummy-password";

/// Salted, irreversible password hashing with a configurable bcrypt cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Compute the dummy hash up front so the first unknown-account login is not slower.
    pub fn warm_up(&self) {
        self.dummy_hash();
    }

    fn dummy_hash(&self) -> Option<&str> {
        self.dummy_hash
            .get_or_init(|| match hash(DUMMY_PASSWORD, self.cost) {
                Ok(h) => Some(h),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compute dummy password hash");
                    None
                }
            })
            .as_deref()
    }

    /// Spend the same bcrypt work as `verify` for an account that does not exist.
    /// Always a mismatch.
    pub fn verify_missing(&self, password: &str) -> bool {
        if let Some(dummy) = self.dummy_hash() {
            let _ = verify(password, dummy);
        }
        false
    }

    pub fn hash(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        hash(password, self.cost)
    }

    /// Check a password against a stored hash. A malformed hash counts as a mismatch.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        match verify(password, password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be checked");
                false
            }
        }
    }
}

/// Normalize and validate an email address. Returns the lowercase, trimmed form.
pub fn validate_email(email: &str) -> Result<String, &'static str> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err("Email is required");
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err("Email is too long");
    }
    if email.chars().any(char::is_whitespace) {
        return Err("Invalid email format");
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };

    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err("Invalid email format");
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters");
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err("Password must be at most 72 bytes");
    }
    Ok(())
}
