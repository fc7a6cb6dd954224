use data_encoding::BASE64;
use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

use crate::transaction::Transaction;

/// Generate a new secp256k1 keypair and return (priv_hex, pub_hex_compressed, address).
pub fn generate_keypair_hex() -> (String, String, String) {
    let secp = Secp256k1::new();
    let (sk, pk) = secp.generate_keypair(&mut OsRng);
    let sk_hex = hex::encode(sk.secret_bytes());
    let pk_hex = hex::encode(pk.serialize()); // compressed (33 bytes)
    let address = address_from_pubkey(&pk);
    (sk_hex, pk_hex, address)
}

/// Address = first 40 hex chars of SHA-256(compressed public key).
pub fn address_from_pubkey(pk: &PublicKey) -> String {
    let digest = Sha256::digest(pk.serialize());
    hex::encode(digest)[..40].to_string()
}

/// Derive the address for a hex-encoded public key.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(address_from_pubkey(&pk))
}

/// Sign the canonical encoding of `tx` and return the base64 compact signature.
pub fn sign_transaction(secret_key_hex: &str, tx: &Transaction) -> Result<String, &'static str> {
    let secp = Secp256k1::signing_only();
    let sk_bytes = hex::decode(secret_key_hex).map_err(|_| "invalid secret key hex")?;
    let sk = SecretKey::from_slice(&sk_bytes).map_err(|_| "invalid secret key bytes")?;
    let msg = Message::from_digest_slice(&tx.sighash()).map_err(|_| "invalid message length")?;
    let sig = secp.sign_ecdsa(&msg, &sk);
    Ok(BASE64.encode(&sig.serialize_compact()))
}

/// Fill in sender public key and signature for `tx` using the given secret key.
pub fn sign_in_place(secret_key_hex: &str, tx: &mut Transaction) -> Result<(), &'static str> {
    let secp = Secp256k1::signing_only();
    let sk_bytes = hex::decode(secret_key_hex).map_err(|_| "invalid secret key hex")?;
    let sk = SecretKey::from_slice(&sk_bytes).map_err(|_| "invalid secret key bytes")?;
    tx.sender_public_key = Some(hex::encode(PublicKey::from_secret_key(&secp, &sk).serialize()));
    tx.signature = Some(sign_transaction(secret_key_hex, tx)?);
    Ok(())
}

/// Verify the signature carried by `tx` against `pubkey_hex`. Any decoding
/// failure counts as an invalid signature.
pub fn verify_transaction(tx: &Transaction, pubkey_hex: &str) -> bool {
    let Some(signature) = tx.signature.as_deref() else {
        return false;
    };
    match verify_signature_b64(pubkey_hex, signature, tx.sighash()) {
        Ok(ok) => ok,
        Err(e) => {
            log::debug!("signature check failed for {}: {}", tx.compute_id(), e);
            false
        }
    }
}

/// Verify a base64 compact signature against the given pubkey (hex) and 32-byte digest.
pub fn verify_signature_b64(
    pubkey_hex: &str,
    sig_b64: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = BASE64
        .decode(sig_b64.as_bytes())
        .map_err(|_| "invalid signature base64")?;
    let sig = Signature::from_compact(&sig_bytes).map_err(|_| "invalid compact signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_digest_slice(&msg32).map_err(|_| "invalid message length")?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_transaction_verifies() {
        let (sk, pk, addr) = generate_keypair_hex();
        let mut tx = Transaction::new(addr, "bob", 3.0);
        sign_in_place(&sk, &mut tx).unwrap();
        assert_eq!(tx.sender_public_key.as_deref(), Some(pk.as_str()));
        assert!(verify_transaction(&tx, &pk));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let (sk, pk, addr) = generate_keypair_hex();
        let mut tx = Transaction::new(addr, "bob", 3.0);
        sign_in_place(&sk, &mut tx).unwrap();
        tx.amount = 30.0;
        assert!(!verify_transaction(&tx, &pk));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let (sk, _pk, addr) = generate_keypair_hex();
        let (_, other_pk, _) = generate_keypair_hex();
        let mut tx = Transaction::new(addr, "bob", 1.0);
        sign_in_place(&sk, &mut tx).unwrap();
        assert!(!verify_transaction(&tx, &other_pk));
    }

    #[test]
    fn garbage_signature_is_rejected_not_panicking() {
        let (_, pk, addr) = generate_keypair_hex();
        let mut tx = Transaction::new(addr, "bob", 1.0);
        tx.signature = Some("not base64 at all!".into());
        assert!(!verify_transaction(&tx, &pk));
        tx.signature = None;
        assert!(!verify_transaction(&tx, &pk));
    }

    #[test]
    fn address_matches_pubkey_derivation() {
        let (_, pk, addr) = generate_keypair_hex();
        assert_eq!(addr.len(), 40);
        assert_eq!(pubkey_to_address_hex(&pk).unwrap(), addr);
    }
}
