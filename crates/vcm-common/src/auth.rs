//! ---
//! ems_section: "06-security-access-control"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Credential hashing and role definitions for relay users."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every stored password hash.
pub const HASH_SCHEME: &str = "pbkdf2-sha256";
/// PBKDF2 rounds used by [`hash_password`].
pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// Random salt bytes generated per password.
pub const SALT_LEN: usize = 16;

const DERIVED_LEN: usize = 32;

/// Capabilities a relay user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May post new charger status updates.
    Publisher,
    /// May read the latest charger status.
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Viewer => "viewer",
        }
    }
}

/// Decoded `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    iterations: u32,
    salt: Vec<u8>,
    derived: [u8; DERIVED_LEN],
}

impl PasswordHash {
    pub fn parse(encoded: &str) -> Option<Self> {
        let mut parts = encoded.trim().split('$');
        if parts.next()? != HASH_SCHEME {
            return None;
        }
        let iterations: u32 = parts.next()?.parse().ok()?;
        let salt = hex::decode(parts.next()?).ok()?;
        let digest = hex::decode(parts.next()?).ok()?;
        if parts.next().is_some() || iterations == 0 || salt.is_empty() {
            return None;
        }
        let derived: [u8; DERIVED_LEN] = digest.try_into().ok()?;
        Some(Self {
            iterations,
            salt,
            derived,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn encode(&self) -> String {
        format!(
            "{HASH_SCHEME}${}${}${}",
            self.iterations,
            hex::encode(&self.salt),
            hex::encode(self.derived)
        )
    }

    fn matches(&self, password: &str) -> bool {
        let Ok(actual) = pbkdf2_sha256(password.as_bytes(), &self.salt, self.iterations) else {
            return false;
        };
        actual
            .iter()
            .zip(self.derived.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_rounds(password, DEFAULT_ITERATIONS)
}

/// Like [`hash_password`] with a caller chosen round count.
pub fn hash_password_rounds(password: &str, iterations: u32) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_password_with(password, &salt, iterations)
}

/// Hash with an explicit salt and round count.
pub fn hash_password_with(password: &str, salt: &[u8], iterations: u32) -> Result<String> {
    if iterations == 0 {
        return Err(anyhow!("password hash iterations must be greater than zero"));
    }
    if salt.is_empty() {
        return Err(anyhow!("password salt must not be empty"));
    }
    let derived = pbkdf2_sha256(password.as_bytes(), salt, iterations)?;
    Ok(PasswordHash {
        iterations,
        salt: salt.to_vec(),
        derived,
    }
    .encode())
}

/// Check a plaintext password against a stored hash string.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    PasswordHash::parse(encoded).is_some_and(|hash| hash.matches(password))
}

/// Returns true when `value` is a well formed stored hash.
pub fn is_password_hash(value: &str) -> bool {
    PasswordHash::parse(value).is_some()
}

// Single output block: the derived key is exactly one SHA-256 digest long.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; DERIVED_LEN]> {
    let prf = HmacSha256::new_from_slice(password)
        .map_err(|err| anyhow!("unable to key password hmac: {err}"))?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block = [0u8; DERIVED_LEN];
    block.copy_from_slice(&mac.finalize().into_bytes());
    let mut output = block;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&block);
        block.copy_from_slice(&mac.finalize().into_bytes());
        for (out, byte) in output.iter_mut().zip(block.iter()) {
            *out ^= byte;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_known_pbkdf2_outputs() {
        assert_eq!(
            hash_password_with("password", b"vcm-salt", 1).unwrap(),
            "pbkdf2-sha256$1$76636d2d73616c74$7cbf6cd2892e3a937141bbc68e376aab286118f569141d487157071783008264"
        );
        assert_eq!(
            hash_password_with("password", b"vcm-salt", 2).unwrap(),
            "pbkdf2-sha256$2$76636d2d73616c74$3e2477fe2110f32547a6681d636fb9789d919d7e6f6db6bfc23c22038c32dcb0"
        );
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let first = hash_password("view").unwrap();
        let second = hash_password("view").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("view", &first));
        assert!(verify_password("view", &second));
    }

    #[test]
    fn verify_rejects_wrong_password_and_bad_encodings() {
        let stored = hash_password_with("view", b"0123456789abcdef", 1_000).unwrap();
        assert!(verify_password("view", &stored));
        assert!(!verify_password("viewer", &stored));
        assert!(!verify_password("view", "abc"));
        // Bare unsalted sha256 digests are no longer accepted
        assert!(!verify_password(
            "password",
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        ));
    }

    #[test]
    fn recognises_hash_shape() {
        let stored = hash_password_with("x", b"salt", 10).unwrap();
        assert!(is_password_hash(&stored));
        assert_eq!(PasswordHash::parse(&stored).unwrap().iterations(), 10);
        assert!(!is_password_hash("password"));
        assert!(!is_password_hash(&stored.replacen("$10$", "$0$", 1)));
        assert!(!is_password_hash(&format!("{stored}$extra")));
        assert!(!is_password_hash(&stored[..stored.len() - 2]));
        assert!(!is_password_hash(&stored.replace("pbkdf2-sha256", "pbkdf2-sha1")));
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(hash_password_with("x", b"salt", 0).is_err());
        assert!(hash_password_with("x", b"", 10).is_err());
    }
}
