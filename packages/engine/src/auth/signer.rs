// packages/engine/src/auth/signer.rs
//! Wallet derived from an identity's mnemonic
//!
//! Uses the first account of the standard Ethereum derivation path
//! (`m/44'/60'/0'/0/0`) and EIP-191 personal-message signatures, which is
//! what the platform's login challenge expects.

use crate::identity::SecretSeed;
use crate::utils::errors::AuthError;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use alloy::signers::SignerSync;

/// Signing wallet for one identity
pub struct WalletSigner {
    signer: PrivateKeySigner,
}

impl WalletSigner {
    /// Derive the wallet from a mnemonic
    pub fn from_seed(seed: &SecretSeed) -> Result<Self, AuthError> {
        if seed.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let signer = MnemonicBuilder::<English>::default()
            .phrase(seed.expose().trim())
            .build()
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;

        Ok(Self { signer })
    }

    /// EIP-55 checksummed address
    pub fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }

    /// Sign `message` as a personal message; returns `0x`-prefixed r‖s‖v hex
    pub fn sign_message(&self, message: &str) -> Result<String, AuthError> {
        let signature = self
            .signer
            .sign_message_sync(message.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::TEST_MNEMONIC;

    #[test]
    fn test_derives_first_account() {
        let wallet = WalletSigner::from_seed(&SecretSeed::new(TEST_MNEMONIC)).unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let wallet = WalletSigner::from_seed(&SecretSeed::new(TEST_MNEMONIC)).unwrap();
        let first = wallet.sign_message("nonce-123").unwrap();
        let second = wallet.sign_message("nonce-123").unwrap();
        let other = wallet.sign_message("nonce-124").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        // 0x + 65 bytes
        assert_eq!(first.len(), 2 + 130);
        assert!(first.ends_with("1b") || first.ends_with("1c"));
    }

    #[test]
    fn test_whitespace_around_phrase_is_ignored() {
        let padded = format!("  {}\n", TEST_MNEMONIC);
        let wallet = WalletSigner::from_seed(&SecretSeed::new(padded)).unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_rejects_missing_and_invalid_seeds() {
        assert!(matches!(
            WalletSigner::from_seed(&SecretSeed::new("   ")),
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            WalletSigner::from_seed(&SecretSeed::new("not a real mnemonic phrase")),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_debug_shows_address_only() {
        let wallet = WalletSigner::from_seed(&SecretSeed::new(TEST_MNEMONIC)).unwrap();
        let rendered = format!("{:?}", wallet);
        assert!(rendered.contains("0xf39F"));
        assert!(!rendered.contains("junk"));
    }
}
