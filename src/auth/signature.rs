//! Wallet signature verification. The system treats the *outer* wallet
//! cryptography as the one piece of real crypto C1 must perform (unlike the
//! payment gate's opaque signature, spec §4.4): recover the EIP-191 signer
//! of a nonce challenge and compare against the claimed wallet.

use alloy::primitives::{Address, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureVerifyError {
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("recovered signer does not match claimed wallet")]
    Mismatch,
}

/// The message a client signs to prove control of `wallet` for `nonce`.
/// EIP-191 personal-sign framing is applied by `recover_address_from_msg`.
pub fn nonce_message(wallet: &str, nonce: &str) -> String {
    format!("Sign in to Voice Control Plane\nwallet: {wallet}\nnonce: {nonce}")
}

/// Recovers the signer of `message` from a hex-encoded 65-byte signature and
/// checks it against `expected_wallet` (already normalised lowercase hex).
pub fn verify(
    message: &str,
    signature_hex: &str,
    expected_wallet: &str,
) -> Result<(), SignatureVerifyError> {
    let sig_bytes = decode_hex(signature_hex)
        .map_err(|e| SignatureVerifyError::Malformed(e.to_string()))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| SignatureVerifyError::Malformed(e.to_string()))?;

    let recovered: Address = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| SignatureVerifyError::Malformed(e.to_string()))?;

    let recovered_hex = format!("{recovered:?}").to_lowercase();
    if recovered_hex != expected_wallet.to_lowercase() {
        return Err(SignatureVerifyError::Mismatch);
    }
    Ok(())
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

/// The typed-data message a song-registry controller wallet signs over
/// `{upstream_ip_id, payout_chain, payout_address, upstream_royalty_bps}`
/// (spec §3 "Song Registry Entry"). Represented as an EIP-191 personal-sign
/// message rather than full EIP-712 typed data, consistent with the nonce
/// message above.
pub fn song_attestation_message(
    upstream_ip_id: &str,
    payout_chain: &str,
    payout_address: &str,
    upstream_royalty_bps: u16,
) -> String {
    format!(
        "Voice Control Plane Song Registry Attestation\nupstream_ip_id: {upstream_ip_id}\npayout_chain: {payout_chain}\npayout_address: {payout_address}\nupstream_royalty_bps: {upstream_royalty_bps}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::{Signer, local::PrivateKeySigner};

    #[tokio::test]
    async fn recovers_matching_wallet() {
        let signer = PrivateKeySigner::random();
        let wallet = format!("{:?}", signer.address()).to_lowercase();
        let message = nonce_message(&wallet, "abc123");

        let sig = signer.sign_message(message.as_bytes()).await.unwrap();
        let sig_hex = format!("0x{}", hex::encode(sig.as_bytes()));

        verify(&message, &sig_hex, &wallet).expect("should verify");
    }

    #[tokio::test]
    async fn rejects_wrong_wallet() {
        let signer = PrivateKeySigner::random();
        let wallet = format!("{:?}", signer.address()).to_lowercase();
        let message = nonce_message(&wallet, "abc123");
        let sig = signer.sign_message(message.as_bytes()).await.unwrap();
        let sig_hex = format!("0x{}", hex::encode(sig.as_bytes()));

        let other = PrivateKeySigner::random();
        let other_wallet = format!("{:?}", other.address()).to_lowercase();

        let err = verify(&message, &sig_hex, &other_wallet).unwrap_err();
        assert!(matches!(err, SignatureVerifyError::Mismatch));
    }
}
