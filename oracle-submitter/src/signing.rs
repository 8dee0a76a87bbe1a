use oracle_common::error::CoreError;
use secp256k1::{ecdsa::Signature, Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// A single `CalledByEntry`-scoped transaction witness (spec §4.9): the raw
/// ECDSA signature bytes plus the public key that verifies it, hex-encoded
/// the way the teacher's `kembridge-auth` chain adapters hex-encode
/// signature material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub signer_address: String,
    pub signature_hex: String,
    pub public_key_hex: String,
}

/// Decodes a WIF-encoded private key into a secp256k1 `SecretKey`. WIF is
/// base58check: `[version=0x80][32-byte key][compressed-flag?][4-byte
/// checksum]`, the same shape `kembridge-auth::chains` decodes with `bs58`.
pub fn decode_wif(wif: &str) -> Result<SecretKey, CoreError> {
    let raw = bs58::decode(wif)
        .into_vec()
        .map_err(|e| CoreError::Credentials(format!("invalid WIF encoding: {e}")))?;
    if raw.len() < 1 + 32 + 4 {
        return Err(CoreError::Credentials("WIF payload too short".to_string()));
    }
    let (body, checksum) = raw.split_at(raw.len() - 4);
    let digest1 = Sha256::digest(body);
    let digest2 = Sha256::digest(digest1);
    if &digest2[..4] != checksum {
        return Err(CoreError::Credentials("WIF checksum mismatch".to_string()));
    }
    if body[0] != 0x80 {
        return Err(CoreError::Credentials("unexpected WIF version byte".to_string()));
    }
    let key_bytes = &body[1..33];
    SecretKey::from_slice(key_bytes)
        .map_err(|e| CoreError::Credentials(format!("invalid secret key bytes: {e}")))
}

/// Signs `message` (the canonical payload bytes of an update call, spec
/// §4.9) with `secret_key`, returning a witness tagged with `signer_address`.
pub fn sign(signer_address: &str, secret_key: &SecretKey, message: &[u8]) -> Witness {
    let secp = Secp256k1::signing_only();
    let digest: [u8; 32] = Sha256::digest(message).into();
    let msg = Message::from_digest(digest);
    let signature: Signature = secp.sign_ecdsa(&msg, secret_key);
    let public_key = secp256k1::PublicKey::from_secret_key(&secp, secret_key);
    Witness {
        signer_address: signer_address.to_string(),
        signature_hex: hex::encode(signature.serialize_compact()),
        public_key_hex: hex::encode(public_key.serialize()),
    }
}

/// Produces the two required witnesses for a batch submission: the
/// attester (oracle) key and the fee-payer (TEE account) key both sign the
/// same payload (spec §4.9). Either key missing is a credentials error, not
/// a silent single-witness submission.
pub fn dual_sign(
    attester_address: &str,
    attester_wif: &str,
    fee_payer_address: &str,
    fee_payer_wif: &str,
    payload: &[u8],
) -> Result<(Witness, Witness), CoreError> {
    let attester_key = decode_wif(attester_wif)?;
    let fee_payer_key = decode_wif(fee_payer_wif)?;
    let attester_witness = sign(attester_address, &attester_key, payload);
    let fee_payer_witness = sign(fee_payer_address, &fee_payer_key, payload);
    Ok((attester_witness, fee_payer_witness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand::rngs::OsRng;

    fn encode_wif(secret_key: &SecretKey) -> String {
        let mut body = vec![0x80u8];
        body.extend_from_slice(&secret_key.secret_bytes());
        let digest1 = Sha256::digest(&body);
        let digest2 = Sha256::digest(digest1);
        body.extend_from_slice(&digest2[..4]);
        bs58::encode(body).into_string()
    }

    #[test]
    fn wif_round_trips_through_decode() {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut OsRng);
        let wif = encode_wif(&secret_key);
        let decoded = decode_wif(&wif).expect("valid wif");
        assert_eq!(decoded.secret_bytes(), secret_key.secret_bytes());
    }

    #[test]
    fn decode_wif_rejects_bad_checksum() {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut OsRng);
        let mut wif = encode_wif(&secret_key);
        wif.pop();
        wif.push(if wif.ends_with('1') { '2' } else { '1' });
        assert!(decode_wif(&wif).is_err());
    }

    #[test]
    fn dual_sign_produces_two_distinct_witnesses_for_same_payload() {
        let secp = Secp256k1::new();
        let (sk1, _) = secp.generate_keypair(&mut OsRng);
        let (sk2, _) = secp.generate_keypair(&mut OsRng);
        let wif1 = encode_wif(&sk1);
        let wif2 = encode_wif(&sk2);
        let (w1, w2) = dual_sign("oracle1", &wif1, "tee1", &wif2, b"payload").unwrap();
        assert_eq!(w1.signer_address, "oracle1");
        assert_eq!(w2.signer_address, "tee1");
        assert_ne!(w1.signature_hex, w2.signature_hex);
    }

    #[test]
    fn dual_sign_rejects_malformed_key() {
        let result = dual_sign("oracle1", "not-a-wif-key", "tee1", "also-not-a-wif", b"payload");
        assert!(result.is_err());
    }
}
