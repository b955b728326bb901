//! Time-boxed share-link tokens.
//!
//! A token is `nonce_hex.mac_hex` where the MAC is HMAC-SHA256 over
//! `kind || secret id || nonce` under the deployment's signing key. The
//! minted token is stored on the secret record together with its expiry;
//! redemption requires the presented token to match the stored one, so
//! issuing a new link atomically invalidates the previous one.
//!
//! Verification failures are deliberately indistinguishable: a forged
//! MAC, a superseded token, and an expired link all surface as the same
//! invalid-link outcome.

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use lockbox_storage::models::SecretKind;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Random token nonce length in bytes.
const NONCE_LEN: usize = 16;

/// How long a minted link stays redeemable.
#[must_use]
pub fn link_ttl() -> Duration {
    Duration::hours(1)
}

fn mac_for(signing_key: &[u8], kind: SecretKind, secret_id: Uuid, nonce: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts any key length per RFC 2104, so new_from_slice
    // will never fail here.
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(signing_key).unwrap();
    mac.update(kind.as_str().as_bytes());
    mac.update(secret_id.as_bytes());
    mac.update(nonce);
    mac.finalize().into_bytes().to_vec()
}

/// Mint a fresh token for a secret.
///
/// Each call embeds a new random nonce, so reissuing always produces a
/// different token.
#[must_use]
pub fn mint_token(signing_key: &[u8], kind: SecretKind, secret_id: Uuid) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let mac = mac_for(signing_key, kind, secret_id, &nonce);
    format!("{}.{}", hex::encode(nonce), hex::encode(mac))
}

/// Verify a presented token against the secret's stored link state.
///
/// All three checks must pass: the MAC binds the token to this secret,
/// the token equals the currently stored one, and the stored expiry is
/// in the future. Comparisons are constant-time.
#[must_use]
pub fn verify_token(
    signing_key: &[u8],
    kind: SecretKind,
    secret_id: Uuid,
    presented: &str,
    stored: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let Some((nonce_hex, mac_hex)) = presented.split_once('.') else {
        return false;
    };
    let (Ok(nonce), Ok(mac)) = (hex::decode(nonce_hex), hex::decode(mac_hex)) else {
        return false;
    };

    let expected = mac_for(signing_key, kind, secret_id, &nonce);
    let mac_ok = mac.ct_eq(&expected).into();
    let current: bool = presented.as_bytes().ct_eq(stored.as_bytes()).into();

    mac_ok && current && now < expires_at
}
