use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::secp256k1::rand::RngCore as _;
use bitcoin::secp256k1::rand::thread_rng;
use bitcoin::secp256k1::{Keypair, PublicKey, Secp256k1, SecretKey, Signing};

use crate::error::SwapError;

/// Per-swap secrets: the payment preimage and the ephemeral claim key.
///
/// Both are generated fresh for every swap and never sent to the provider.
pub struct SwapSecrets {
    preimage: [u8; 32],
    keypair: Keypair,
}

impl SwapSecrets {
    pub fn generate<C: Signing>(secp: &Secp256k1<C>) -> Self {
        let mut rng = thread_rng();
        let mut preimage = [0u8; 32];
        rng.fill_bytes(&mut preimage);
        let keypair = Keypair::new(secp, &mut rng);
        Self { preimage, keypair }
    }

    pub fn preimage(&self) -> &[u8; 32] {
        &self.preimage
    }

    pub fn preimage_hash(&self) -> [u8; 32] {
        sha256_preimage(&self.preimage)
    }

    pub fn claim_pubkey(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn preimage_hex(&self) -> String {
        hex::encode(self.preimage)
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.keypair.secret_key().secret_bytes())
    }
}

impl std::fmt::Debug for SwapSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapSecrets")
            .field("claim_pubkey", &self.claim_pubkey())
            .finish_non_exhaustive()
    }
}

pub fn sha256_preimage(preimage: &[u8; 32]) -> [u8; 32] {
    sha256::Hash::hash(preimage).to_byte_array()
}

pub fn decode_preimage(preimage_hex: &str) -> Result<[u8; 32], SwapError> {
    let bytes = hex::decode(preimage_hex)
        .map_err(|e| SwapError::InvalidInput(format!("decode preimage hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| SwapError::InvalidInput("preimage must be 32 bytes".to_string()))
}

pub fn decode_secret_key(secret_key_hex: &str) -> Result<SecretKey, SwapError> {
    let bytes = hex::decode(secret_key_hex)
        .map_err(|e| SwapError::InvalidInput(format!("decode private key hex: {e}")))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| SwapError::InvalidInput(format!("invalid private key: {e}")))
}
