//! API key generation and fingerprinting, grounded on `authn/models.py`'s
//! `APIKey.generate`/`_hash_key`: a random urlsafe token is shown to the
//! caller exactly once; the store only ever holds its keyed-HMAC digest.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct GeneratedKey {
    pub raw: String,
    pub prefix: String,
    pub fingerprint: String,
}

/// `server_secret` is the deployment-wide pepper (`config.auth.key_secret`);
/// it never leaves the process and is not derivable from the fingerprint.
pub fn generate_key(server_secret: &[u8]) -> GeneratedKey {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let raw = format!("dr_{}", hex::encode(bytes));
    let prefix = raw.chars().take(8).collect();
    let fingerprint = fingerprint(server_secret, &raw);
    GeneratedKey { raw, prefix, fingerprint }
}

pub fn fingerprint(server_secret: &[u8], raw_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(server_secret).expect("HMAC accepts keys of any length");
    mac.update(raw_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_keyed() {
        let a = fingerprint(b"secret-a", "dr_abc");
        let b = fingerprint(b"secret-a", "dr_abc");
        let c = fingerprint(b"secret-b", "dr_abc");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn generated_key_fingerprint_matches_recomputation() {
        let generated = generate_key(b"pepper");
        assert_eq!(fingerprint(b"pepper", &generated.raw), generated.fingerprint);
        assert_eq!(generated.prefix.len(), 8);
    }
}
