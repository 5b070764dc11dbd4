//! Scoped idempotency keys (spec §3, §4.7 "Idempotency", GLOSSARY "Scoped
//! idempotency key"): `sha256(ownerKey + ":" + userKey)` so two tenants
//! reusing the same client-chosen key never collide.

use sha2::{Digest, Sha256};

pub fn scoped_key(owner_key: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_key.as_bytes());
    hasher.update(b":");
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differs_across_owners_for_the_same_raw_key() {
        let a = scoped_key("tenant-a", "k1");
        let b = scoped_key("tenant-b", "k1");
        assert_ne!(a, b);
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(scoped_key("t", "k"), scoped_key("t", "k"));
    }
}
