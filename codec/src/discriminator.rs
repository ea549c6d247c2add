//! anchor discriminators.

use sha2::{Digest, Sha256};

/// `sha256("account:<TypeName>")[..8]`.
pub fn account_discriminator(type_name: &str) -> [u8; 8] {
    prefix_hash("account", type_name)
}

/// `sha256("global:<snake_name>")[..8]`.
pub fn instruction_discriminator(method: &str) -> [u8; 8] {
    prefix_hash("global", method)
}

fn prefix_hash(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_differ() {
        assert_ne!(
            account_discriminator("RouterData"),
            instruction_discriminator("RouterData")
        );
    }

    #[test]
    fn test_matches_manual_hash() {
        let digest = Sha256::digest(b"account:UserVaultAccount");
        assert_eq!(account_discriminator("UserVaultAccount"), digest[..8]);
    }
}
