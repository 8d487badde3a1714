//! Backend operations for algorithms that SAML peers still negotiate.
//!
//! **WARNING**: RSA-SHA1 and DSA are not CNSA 2.0 compliant. They exist for
//! interoperability with existing IdPs/SPs only.
//!
//! aws-lc-rs handles RSA PKCS#1 v1.5 with SHA-2. OpenSSL handles RSA-SHA1
//! and both DSA variants, which aws-lc-rs does not sign.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, RsaKeyPair, UnparsedPublicKey},
};
use openssl::{
    hash::MessageDigest,
    pkey::{PKey, Private},
    sign::{Signer, Verifier},
};

use crate::algorithm::{HashAlgorithm, SignatureAlgorithm};
use crate::signature::SignatureError;

fn message_digest(algorithm: SignatureAlgorithm) -> MessageDigest {
    match algorithm.hash_algorithm() {
        HashAlgorithm::Sha1 => MessageDigest::sha1(),
        HashAlgorithm::Sha256 => MessageDigest::sha256(),
        HashAlgorithm::Sha384 => MessageDigest::sha384(),
        HashAlgorithm::Sha512 => MessageDigest::sha512(),
    }
}

/// Signs data with RSA PKCS#1 v1.5 over SHA-256/384/512.
///
/// # Arguments
///
/// * `key_der` - RSA private key in PKCS#8 DER format
/// * `data` - Data to sign
/// * `algorithm` - One of the RSA SHA-2 algorithms
///
/// # Errors
///
/// Returns an error if the key is invalid or the algorithm is not RSA SHA-2.
pub fn rsa_sign(
    key_der: &[u8],
    data: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<Vec<u8>, SignatureError> {
    let padding = match algorithm {
        SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
        SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
        SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
        other => {
            return Err(SignatureError::UnsupportedAlgorithm(
                other.xml_dsig_uri().to_string(),
            ))
        }
    };

    let key_pair = RsaKeyPair::from_pkcs8(key_der)
        .or_else(|_| RsaKeyPair::from_der(key_der))
        .map_err(|e| SignatureError::InvalidKey(format!("Invalid RSA key: {e}")))?;

    let rng = SystemRandom::new();
    let mut sig = vec![0u8; key_pair.public_modulus_len()];

    key_pair
        .sign(padding, &rng, data, &mut sig)
        .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

    Ok(sig)
}

/// Verifies an RSA PKCS#1 v1.5 signature over SHA-256/384/512.
///
/// `public_key_der` is a PKCS#1 `RSAPublicKey`.
///
/// # Errors
///
/// Returns an error if the algorithm is not RSA SHA-2.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<bool, SignatureError> {
    use aws_lc_rs::signature::{
        RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512,
    };

    let verification_alg: &dyn signature::VerificationAlgorithm = match algorithm {
        SignatureAlgorithm::RsaSha256 => &RSA_PKCS1_2048_8192_SHA256,
        SignatureAlgorithm::RsaSha384 => &RSA_PKCS1_2048_8192_SHA384,
        SignatureAlgorithm::RsaSha512 => &RSA_PKCS1_2048_8192_SHA512,
        other => {
            return Err(SignatureError::UnsupportedAlgorithm(
                other.xml_dsig_uri().to_string(),
            ))
        }
    };

    let public_key = UnparsedPublicKey::new(verification_alg, public_key_der);

    match public_key.verify(data, sig) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Converts a `SubjectPublicKeyInfo` holding an RSA key to PKCS#1 form.
///
/// # Errors
///
/// Returns an error if the SPKI does not contain an RSA key.
pub fn rsa_public_key_pkcs1(spki_der: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let pkey = PKey::public_key_from_der(spki_der)
        .map_err(|e| SignatureError::InvalidCertificate(format!("public key: {e}")))?;
    let rsa = pkey
        .rsa()
        .map_err(|e| SignatureError::InvalidCertificate(format!("not an RSA key: {e}")))?;
    rsa.public_key_to_der_pkcs1()
        .map_err(|e| SignatureError::InvalidCertificate(e.to_string()))
}

/// Signs data through OpenSSL (RSA-SHA1, DSA-SHA1, DSA-SHA256).
///
/// # Errors
///
/// Returns an error if OpenSSL rejects the key or the digest.
pub fn openssl_sign(
    key: &PKey<Private>,
    data: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<Vec<u8>, SignatureError> {
    let mut signer = Signer::new(message_digest(algorithm), key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Verifies a signature through OpenSSL.
///
/// A signature that OpenSSL cannot decode counts as a mismatch.
///
/// # Errors
///
/// Returns an error if the public key cannot be loaded.
pub fn openssl_verify(
    spki_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<bool, SignatureError> {
    let pkey = PKey::public_key_from_der(spki_der)
        .map_err(|e| SignatureError::InvalidCertificate(format!("public key: {e}")))?;
    let mut verifier = Verifier::new(message_digest(algorithm), &pkey)
        .map_err(|e| SignatureError::Verification(e.to_string()))?;
    verifier
        .update(data)
        .map_err(|e| SignatureError::Verification(e.to_string()))?;

    match verifier.verify(sig) {
        Ok(valid) => Ok(valid),
        Err(_) => Ok(false),
    }
}
