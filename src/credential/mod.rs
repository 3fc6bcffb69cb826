use sha2::{Digest, Sha256};

/// Uppercase hex SHA-256 of the secret's UTF-8 bytes.
///
/// No salt is mixed in, so equal secrets yield equal digests across every
/// wallet and asset. Stored records depend on this exact format.
pub fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Returns true iff `supplied_secret` hashes to `stored_digest`.
pub fn authenticate(stored_digest: &str, supplied_secret: &str) -> bool {
    digest(supplied_secret) == stored_digest
}
