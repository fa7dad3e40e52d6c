//! Management-service configuration.
//!
//! The configuration is a keyed JSON blob; key material arrives as opaque
//! hex strings and is validated into typed keys at the point of use via
//! [`MsConfig::keys`]. Lengths: AES 16 bytes, HMAC 64, SipHash 16,
//! Ed25519 keys 32.

use std::net::IpAddr;
use std::path::Path;

use apna_crypto::cert::{signing_key_from_bytes, verifying_key_from_bytes};
use apna_crypto::{AesKey, CryptoError, HmacKey, SipKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured key has the wrong length or shape.
    #[error("invalid key material: {0}")]
    Key(#[from] CryptoError),

    /// The signing algorithm is not supported.
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedSignAlgo(String),
}

/// Management-service configuration blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsConfig {
    /// Address the service listens on.
    pub ip: IpAddr,
    /// Port the service listens on.
    pub port: u16,
    /// Certificate signature scheme; only `"ed25519"` is supported.
    pub sign_algo: String,
    /// Authority Ed25519 public key.
    #[serde(with = "hex_bytes")]
    pub pubkey: Vec<u8>,
    /// Authority Ed25519 private key seed.
    #[serde(with = "hex_bytes")]
    pub privkey: Vec<u8>,
    /// EphID HMAC key (64 bytes).
    #[serde(with = "hex_bytes")]
    pub hmac_key: Vec<u8>,
    /// EphID AES key (16 bytes).
    #[serde(with = "hex_bytes")]
    pub aes_key: Vec<u8>,
    /// Host-id SipHash key (16 bytes).
    #[serde(with = "hex_bytes")]
    pub siphash_key: Vec<u8>,
}

impl MsConfig {
    /// Load a configuration blob from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Validate the opaque key blobs into typed keys.
    pub fn keys(&self) -> Result<MsKeys, ConfigError> {
        if !self.sign_algo.eq_ignore_ascii_case("ed25519") {
            return Err(ConfigError::UnsupportedSignAlgo(self.sign_algo.clone()));
        }
        Ok(MsKeys {
            signing: signing_key_from_bytes(&self.privkey)?,
            authority: verifying_key_from_bytes(&self.pubkey)?,
            hmac: HmacKey::from_slice(&self.hmac_key)?,
            aes: AesKey::from_slice(&self.aes_key)?,
            siphash: SipKey::from_slice(&self.siphash_key)?,
        })
    }
}

/// Validated key material for the management service and border element.
#[derive(Clone)]
pub struct MsKeys {
    /// Authority certificate-signing key.
    pub signing: SigningKey,
    /// Authority public key endpoints verify certificates against.
    pub authority: VerifyingKey,
    /// EphID HMAC key.
    pub hmac: HmacKey,
    /// EphID AES key.
    pub aes: AesKey,
    /// Host-id SipHash key.
    pub siphash: SipKey,
}

impl std::fmt::Debug for MsKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsKeys").field("authority", &self.authority).finish_non_exhaustive()
    }
}

mod hex_bytes {
    //! Serde adapter: byte blobs as hex strings in config files.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_config() -> MsConfig {
        let signing = SigningKey::from_bytes(&[0x42; 32]);
        MsConfig {
            ip: "127.0.0.1".parse().unwrap(),
            port: 3003,
            sign_algo: "ed25519".to_string(),
            pubkey: signing.verifying_key().to_bytes().to_vec(),
            privkey: signing.to_bytes().to_vec(),
            hmac_key: vec![0x22; 64],
            aes_key: vec![0x11; 16],
            siphash_key: vec![0x33; 16],
        }
    }

    #[test]
    fn json_roundtrip_with_hex_keys() {
        let config = sample_config();
        let json = serde_json::to_string(&config).unwrap();
        // Keys are hex strings on disk, not byte arrays.
        assert!(json.contains(&hex::encode(&config.aes_key)));
        assert!(json.contains("\"signAlgo\":\"ed25519\""));
        let back: MsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, 3003);
        assert_eq!(back.aes_key, config.aes_key);
    }

    #[test]
    fn load_from_file() {
        let config = sample_config();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&config).unwrap().as_bytes()).unwrap();
        let loaded = MsConfig::load(file.path()).unwrap();
        assert_eq!(loaded.hmac_key, config.hmac_key);
        assert!(loaded.keys().is_ok());
    }

    #[test]
    fn bad_key_lengths_rejected() {
        let mut config = sample_config();
        config.aes_key = vec![0x11; 15];
        assert!(matches!(config.keys(), Err(ConfigError::Key(_))));
    }

    #[test]
    fn unsupported_sign_algo_rejected() {
        let mut config = sample_config();
        config.sign_algo = "rsa".to_string();
        assert!(matches!(config.keys(), Err(ConfigError::UnsupportedSignAlgo(_))));
    }
}
