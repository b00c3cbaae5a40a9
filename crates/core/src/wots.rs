//! Winternitz one-time signatures over 32-byte digests.
//!
//! A key pair is `T` hash chains. The secret key holds the chain starts, the
//! public key the chain tips reached after `MAX_STEPS` hashes. Signing a
//! digest splits it into w-bit values and reveals, for chain `i`, the point
//! `value_i` steps along the chain. The verifier walks the remaining
//! `MAX_STEPS - value_i` steps and compares against the public tip.
//!
//! Two extra checksum chains carry `Σ (CHAIN_LEN - value_i)`, so raising any
//! message value lowers the checksum, which a forger cannot do without
//! inverting the hash.
//!
//! A key pair must sign exactly one digest.

use crate::crypto::CryptoError;
use crate::hash::{hash_concat, Hash, HASH_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Winternitz parameter: bits signed per chain.
pub const W: u32 = 8;

/// Number of points on a chain (`2^W`).
pub const CHAIN_LEN: u32 = 1 << W;

/// Hashes from a secret to its public tip.
pub const MAX_STEPS: u32 = CHAIN_LEN - 1;

/// Chains covering the digest itself.
pub const MSG_CHAINS: usize = HASH_LEN * 8 / W as usize;

/// Chains covering the checksum (high half, then low half).
pub const CHECKSUM_CHAINS: usize = 2;

/// Total chain count.
pub const T: usize = MSG_CHAINS + CHECKSUM_CHAINS;

const VALUE_MASK: u32 = CHAIN_LEN - 1;

// The largest checksum must fit in the two checksum chains.
const _: () =
    assert!((MSG_CHAINS as u64) * (CHAIN_LEN as u64) < 1u64 << (W * CHECKSUM_CHAINS as u32));
const _: () = assert!(8 % W == 0 || W % 8 == 0);

/// A WOTS key pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct OneTimeSig {
    secret: Vec<Hash>,
    public: Vec<Hash>,
}

impl OneTimeSig {
    /// Draw `T` random secrets and derive their public tips.
    pub fn generate() -> Self {
        let secret: Vec<Hash> = (0..T)
            .map(|_| {
                let mut seed = [0u8; HASH_LEN];
                OsRng.fill_bytes(&mut seed);
                Hash(seed)
            })
            .collect();
        let public = secret.iter().map(|s| walk(*s, MAX_STEPS)).collect();
        Self { secret, public }
    }

    /// The public chain tips.
    pub fn public_key(&self) -> &[Hash] {
        &self.public
    }

    /// Digest of the concatenated public tips (an MSS leaf).
    pub fn public_key_digest(&self) -> Hash {
        public_key_digest(&self.public)
    }

    /// Sign a digest. Callers guarantee this key pair is never used twice.
    pub fn sign(&self, digest: &Hash) -> Vec<Hash> {
        chain_values(digest)
            .iter()
            .zip(&self.secret)
            .map(|(value, secret)| walk(*secret, *value))
            .collect()
    }

    /// Both halves have the expected number of chains.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.secret.len() == T && self.public.len() == T
    }
}

impl fmt::Debug for OneTimeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeSig")
            .field("public", &self.public_key_digest())
            .finish_non_exhaustive()
    }
}

/// Verify a WOTS signature against the public chain tips.
///
/// Every chain must land exactly on its tip; one mismatch rejects.
pub fn verify(signature: &[Hash], public_key: &[Hash], digest: &Hash) -> Result<(), CryptoError> {
    if signature.len() != T {
        return Err(CryptoError::MalformedSignature("wrong number of WOTS chains"));
    }
    if public_key.len() != T {
        return Err(CryptoError::MalformedSignature("wrong number of WOTS public tips"));
    }

    let values = chain_values(digest);
    let all_match = values
        .iter()
        .zip(signature.iter().zip(public_key))
        .all(|(value, (sig, tip))| walk(*sig, MAX_STEPS - value) == *tip);

    if all_match {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature)
    }
}

/// Digest of a concatenated list of public tips.
pub fn public_key_digest(public_key: &[Hash]) -> Hash {
    let parts: Vec<&[u8]> = public_key.iter().map(|h| h.as_ref()).collect();
    hash_concat(&parts)
}

/// Hash `start` forward `steps` times.
fn walk(start: Hash, steps: u32) -> Hash {
    (0..steps).fold(start, |h, _| h.rehash())
}

/// Split a digest into `MSG_CHAINS` w-bit values followed by the checksum.
fn chain_values(digest: &Hash) -> [u32; T] {
    let mut values = [0u32; T];
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut i = 0;

    for &byte in digest.as_bytes() {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= W {
            bits -= W;
            values[i] = (acc >> bits) & VALUE_MASK;
            i += 1;
        }
        acc &= (1 << bits) - 1;
    }
    debug_assert_eq!(i, MSG_CHAINS);

    let checksum: u32 = values[..MSG_CHAINS].iter().map(|v| CHAIN_LEN - v).sum();
    values[MSG_CHAINS] = (checksum >> W) & VALUE_MASK;
    values[MSG_CHAINS + 1] = checksum & VALUE_MASK;
    values
}
