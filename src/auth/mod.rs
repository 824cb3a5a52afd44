//! Nonce + Session Authenticator (C1, spec §4.1): issues single-use nonces,
//! verifies wallet signatures over them, and mints stateless bearer session
//! tokens on success.

pub mod nonce;
pub mod session;
pub mod signature;

use crate::db::Db;
use crate::domain::Wallet;

pub use nonce::{NonceError, NonceStore};
pub use session::{Claims, SessionAuthenticator, SessionError};
pub use signature::{SignatureVerifyError, nonce_message};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid_signature")]
    InvalidSignature,
    #[error("nonce_expired")]
    NonceExpired,
    #[error("nonce_unknown")]
    NonceUnknown,
}

/// The C1 service: wires the nonce store, signature recovery, and session
/// minting into the two operations `spec.md` names.
pub struct Authenticator {
    nonces: NonceStore,
    sessions: SessionAuthenticator,
}

impl Authenticator {
    pub fn new(db: Db, jwt_secret: String) -> Self {
        Authenticator {
            nonces: NonceStore::new(db),
            sessions: SessionAuthenticator::new(jwt_secret),
        }
    }

    pub async fn request_nonce(&self, wallet: &Wallet) -> anyhow::Result<String> {
        self.nonces.request(wallet).await
    }

    /// Recovers the signer, checks it against `wallet`, and only then
    /// consumes the nonce — `missing_fields`/`invalid_signature` failures
    /// must never burn a legitimate nonce (spec §4.1).
    pub async fn verify_and_mint(
        &self,
        wallet: &Wallet,
        submitted_nonce: &str,
        signature_hex: &str,
    ) -> Result<String, AuthError> {
        let message = nonce_message(wallet.as_str(), submitted_nonce);
        signature::verify(&message, signature_hex, wallet.as_str())
            .map_err(|_| AuthError::InvalidSignature)?;

        self.nonces
            .consume(wallet, submitted_nonce)
            .await
            .map_err(|e| match e {
                NonceError::Expired => AuthError::NonceExpired,
                NonceError::Unknown => AuthError::NonceUnknown,
            })?;

        Ok(self.sessions.mint(wallet))
    }

    pub fn verify_session(&self, token: &str) -> Result<Wallet, SessionError> {
        self.sessions.verify(token)
    }
}
