//! userPassword hashing for the set-password operation.
//!
//! Produces RFC 2307-style values: `{SCHEME}` prefix followed by the
//! base64 of the digest, with a random 4-byte salt appended to the
//! digest input and output for the salted schemes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::Md5;
use sha1::{Digest as _, Sha1};

/// Supported userPassword hash schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Store the password as given, no scheme prefix.
    Clear,
    Md5,
    Smd5,
    Sha,
    Ssha,
}

/// Hash `password` into the value stored in the userPassword attribute.
pub fn hash_password(password: &str, algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Clear => password.to_string(),
        HashAlgorithm::Md5 => {
            format!("{{MD5}}{}", STANDARD.encode(Md5::digest(password.as_bytes())))
        }
        HashAlgorithm::Smd5 => smd5(password, &random_salt()),
        HashAlgorithm::Sha => {
            format!("{{SHA}}{}", STANDARD.encode(Sha1::digest(password.as_bytes())))
        }
        HashAlgorithm::Ssha => ssha(password, &random_salt()),
    }
}

fn ssha(password: &str, salt: &[u8; 4]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let hash = hasher.finalize();
    let mut combined = Vec::with_capacity(hash.len() + salt.len());
    combined.extend_from_slice(&hash);
    combined.extend_from_slice(salt);
    format!("{{SSHA}}{}", STANDARD.encode(combined))
}

fn smd5(password: &str, salt: &[u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let hash = hasher.finalize();
    let mut combined = Vec::with_capacity(hash.len() + salt.len());
    combined.extend_from_slice(&hash);
    combined.extend_from_slice(salt);
    format!("{{SMD5}}{}", STANDARD.encode(combined))
}

fn random_salt() -> [u8; 4] {
    let mut salt = [0u8; 4];
    #[cfg(target_family = "unix")]
    {
        use std::io::Read;
        if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
            let _ = f.read_exact(&mut salt);
        }
    }
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(value: &str, prefix: &str) -> Vec<u8> {
        let b64 = value.strip_prefix(prefix).unwrap();
        STANDARD.decode(b64).unwrap()
    }

    #[test]
    fn clear_is_passthrough() {
        assert_eq!(hash_password("secret", HashAlgorithm::Clear), "secret");
    }

    #[test]
    fn sha_produces_20_bytes() {
        let v = hash_password("hello", HashAlgorithm::Sha);
        assert_eq!(decode(&v, "{SHA}").len(), 20);
    }

    #[test]
    fn sha_deterministic() {
        assert_eq!(
            hash_password("hello", HashAlgorithm::Sha),
            hash_password("hello", HashAlgorithm::Sha)
        );
    }

    #[test]
    fn md5_produces_16_bytes() {
        let v = hash_password("hello", HashAlgorithm::Md5);
        assert_eq!(decode(&v, "{MD5}").len(), 16);
    }

    #[test]
    fn ssha_produces_24_bytes() {
        let v = ssha("hello", &[1, 2, 3, 4]);
        assert_eq!(decode(&v, "{SSHA}").len(), 24); // SHA1(20) + salt(4)
    }

    #[test]
    fn ssha_salt_appended() {
        let salt = [0xAA, 0xBB, 0xCC, 0xDD];
        let decoded = decode(&ssha("hello", &salt), "{SSHA}");
        assert_eq!(&decoded[20..], &salt);
    }

    #[test]
    fn smd5_produces_20_bytes() {
        let v = smd5("hello", &[1, 2, 3, 4]);
        assert_eq!(decode(&v, "{SMD5}").len(), 20); // MD5(16) + salt(4)
    }

    #[test]
    fn smd5_salt_appended() {
        let salt = [0x11, 0x22, 0x33, 0x44];
        let decoded = decode(&smd5("hello", &salt), "{SMD5}");
        assert_eq!(&decoded[16..], &salt);
    }

    #[test]
    fn different_passwords_different_hashes() {
        assert_ne!(
            hash_password("hello", HashAlgorithm::Sha),
            hash_password("world", HashAlgorithm::Sha)
        );
        assert_ne!(
            hash_password("hello", HashAlgorithm::Md5),
            hash_password("world", HashAlgorithm::Md5)
        );
    }
}
