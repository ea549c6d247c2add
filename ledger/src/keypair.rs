//! signing key files.

use std::fs;
use std::path::{Path, PathBuf};

use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::read_keypair;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid key file {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// load a keypair from file (JSON array of 64 bytes, or the raw 64 bytes).
pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<Keypair, KeyError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    // try JSON array format: [1,2,3,...,64]
    if let Ok(keypair) = read_keypair(&mut data.as_slice()) {
        return Ok(keypair);
    }

    // try raw 64 bytes
    if data.len() == 64 {
        #[allow(deprecated)]
        return Keypair::from_bytes(&data).map_err(|e| KeyError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        });
    }

    Err(KeyError::Invalid {
        path: path.to_path_buf(),
        reason: format!("expected a JSON byte array or 64 raw bytes, got {} bytes", data.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Signer;
    use std::io::Write;

    #[test]
    fn test_load_json_array() {
        let keypair = Keypair::new();
        let json = format!("{:?}", keypair.to_bytes().to_vec());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = load_keypair(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_raw_bytes() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&keypair.to_bytes()).unwrap();

        let loaded = load_keypair(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_missing_file() {
        let err = load_keypair("/nonexistent/key.json").unwrap_err();
        assert!(matches!(err, KeyError::Io { .. }));
    }

    #[test]
    fn test_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a key").unwrap();
        assert!(matches!(
            load_keypair(file.path()),
            Err(KeyError::Invalid { .. })
        ));
    }
}
