//! Sealed boxes for returning decrypted values to a single requester.
//!
//! An X25519 integrated encryption scheme: the sender generates a one-off
//! keypair, derives an AES-256-GCM key from the Diffie-Hellman shared secret
//! with HKDF-SHA256, and prepends its public key and the nonce to the ciphertext.
//!
//! Wire format: `ephemeral public key (32) || nonce (12) || ciphertext`.

use crate::*;
use aes_gcm::aead::{generic_array::GenericArray, Aead, NewAead, Payload};
use aes_gcm::Aes256Gcm;
use hkdf::Hkdf;
use rand::{rngs::OsRng, Rng};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

const PUBLIC_KEY_LENGTH: usize = 32;
const AES_IV_LENGTH: usize = 12;

type AesKey = [u8; 32];

/// Seal a message so that only the holder of `receiver`'s secret can open it.
///
/// `aad` is authenticated but not encrypted.
pub fn seal(receiver: &PublicKey, aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
    let ephemeral_sk = StaticSecret::new(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral_sk);

    let aes_key = derive_key(&ephemeral_sk, receiver, &ephemeral_pk)?;
    let encrypted = aes_encrypt(&aes_key, aad, msg)?;

    let mut sealed = Vec::with_capacity(PUBLIC_KEY_LENGTH + encrypted.len());
    sealed.extend_from_slice(ephemeral_pk.as_bytes());
    sealed.extend(encrypted);

    Ok(sealed)
}

/// Open a sealed message with the receiver's secret.
pub fn open(receiver_sk: &StaticSecret, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, Error> {
    if sealed.len() < PUBLIC_KEY_LENGTH + AES_IV_LENGTH {
        return Err(Error::BadLength {
            kind: "sealed value",
            expected: PUBLIC_KEY_LENGTH + AES_IV_LENGTH,
            found: sealed.len(),
        });
    }

    let mut ephemeral_pk = [0u8; PUBLIC_KEY_LENGTH];
    ephemeral_pk.copy_from_slice(&sealed[..PUBLIC_KEY_LENGTH]);
    let ephemeral_pk = PublicKey::from(ephemeral_pk);

    let aes_key = derive_key(receiver_sk, &ephemeral_pk, &ephemeral_pk)?;
    aes_decrypt(&aes_key, aad, &sealed[PUBLIC_KEY_LENGTH..])
}

// Both sides feed the sender's ephemeral public key and the shared secret into HKDF.
fn derive_key(
    secret: &StaticSecret,
    peer: &PublicKey,
    ephemeral_pk: &PublicKey,
) -> Result<AesKey, Error> {
    let shared = secret.diffie_hellman(peer);

    let mut master = Vec::with_capacity(PUBLIC_KEY_LENGTH * 2);
    master.extend_from_slice(ephemeral_pk.as_bytes());
    master.extend_from_slice(shared.as_bytes());

    let h = Hkdf::<Sha256>::new(None, &master);
    let mut out = [0u8; 32];
    h.expand(&[], &mut out)
        .map_err(|_| Error::EncodeError("seal: key derivation failed".to_owned()))?;
    Ok(out)
}

fn aes_encrypt(key: &AesKey, aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; AES_IV_LENGTH];
    OsRng.fill(&mut nonce);
    let nonce = GenericArray::from_slice(&nonce);

    let ciphertext = aead
        .encrypt(nonce, Payload { msg, aad })
        .map_err(|_| Error::EncodeError("seal: encryption failure".to_owned()))?;

    let mut output = Vec::with_capacity(AES_IV_LENGTH + ciphertext.len());
    output.extend_from_slice(nonce);
    output.extend(ciphertext);

    Ok(output)
}

fn aes_decrypt(key: &AesKey, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let nonce = GenericArray::from_slice(&ciphertext[..AES_IV_LENGTH]);
    let msg = &ciphertext[AES_IV_LENGTH..];

    aead.decrypt(nonce, Payload { msg, aad })
        .map_err(|_| Error::TransportError("sealed value failed to open".to_owned()))
}
