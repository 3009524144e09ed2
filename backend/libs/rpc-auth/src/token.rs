//! Access token signing and the low-level verification passes
//!
//! Tokens this server issues are RS256 JWTs signed with a single RSA key
//! that is fixed for the lifetime of the server. Verification is split into
//! an unverified peek (to learn the credential type, and with it the key and
//! claims shape) and a verified decode with the resolved key.

use crate::claims::RpcClaims;
use crate::credentials::CredentialsType;
use crate::error::{AuthError, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde_json::{Map, Value};
use tonic::Status;

/// Algorithm used for self-issued tokens
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claim carrying the credential type
pub const CREDENTIALS_TYPE_CLAIM: &str = "rpc_creds_type";

/// Default size of a generated signing key
pub const DEFAULT_KEY_BITS: usize = 2048;

/// The server's RSA key pair in signing and verification form
#[derive(Clone)]
pub struct SigningKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKeys {
    /// Build from an RSA private key
    pub fn from_rsa_key(private_key: &RsaPrivateKey) -> Result<Self> {
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| AuthError::InvalidSigningKey(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| AuthError::InvalidSigningKey(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::InvalidSigningKey(format!("Failed to parse RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::InvalidSigningKey(format!("Failed to parse RSA public key: {e}")))?;

        Ok(Self {
            encoding_key,
            decoding_key,
        })
    }

    /// Parse a PEM private key (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`)
    pub fn from_pem(private_key_pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| AuthError::InvalidSigningKey(e.to_string()))?;
        Self::from_rsa_key(&private_key)
    }

    /// Generate a fresh key pair
    pub fn generate(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| AuthError::InvalidSigningKey(e.to_string()))?;
        Self::from_rsa_key(&private_key)
    }

    /// Sign claims into a compact JWT
    pub fn sign(&self, claims: &RpcClaims) -> Result<String> {
        Ok(encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)?)
    }

    /// Public half, for tokens this server issued
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Whether `algorithm` belongs to the family the server signs with
pub fn is_self_signing_algorithm(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
    )
}

/// Read header and claims without checking signature or claims
///
/// The result MUST NOT be trusted beyond picking the verification key.
pub fn peek_unverified(token: &str) -> std::result::Result<(Header, Map<String, Value>), Status> {
    let mut validation = claimless_validation(vec![SIGNING_ALGORITHM]);
    validation.insecure_disable_signature_validation();

    let data = decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| Status::unauthenticated(format!("unauthenticated: {e}")))?;

    Ok((data.header, data.claims))
}

/// Verify the signature with `key` and return the raw payload
///
/// Registered time claims are left to the claims' own validation.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithms: Vec<Algorithm>,
) -> std::result::Result<Value, Status> {
    let validation = claimless_validation(algorithms);
    decode::<Value>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| Status::unauthenticated(format!("unauthenticated: {e}")))
}

/// Extract the credential type claim from an unverified payload
pub fn credentials_type_from_claims(
    claims: &Map<String, Value>,
) -> std::result::Result<CredentialsType, Status> {
    match claims.get(CREDENTIALS_TYPE_CLAIM) {
        None => Err(Status::unauthenticated(
            "invalid claims, missing rpc_creds_type",
        )),
        Some(Value::String(value)) => Ok(CredentialsType::new(value.as_str())),
        Some(_) => Err(Status::unauthenticated(
            "invalid claims, invalid rpc_creds_type",
        )),
    }
}

fn claimless_validation(algorithms: Vec<Algorithm>) -> Validation {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.algorithms = algorithms;
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation
}
