//! Device identity material for mTLS.
//!
//! A `CredentialBundle` holds the identity certificate chain, its private
//! key, and an optional set of trust anchors for the broker. It is built
//! once at startup and never mutated.

use rustls::SignatureScheme;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, SignatureVerificationAlgorithm};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// How the broker's certificate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Present our identity and chain the broker certificate to a trust anchor.
    PeerAndChain,
    /// Present our identity and accept whatever chain the broker sends.
    PeerOnly,
}

/// Signature schemes offered when proving the key belongs to the certificate.
const CHALLENGE_SCHEMES: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ED25519,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
];

const CHALLENGE_MESSAGE: &[u8] = b"open-tls key pair challenge";

/// Identity certificate, private key, and optional broker trust anchors.
#[derive(Debug)]
pub struct CredentialBundle {
    certificate_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
    trust_anchors: Option<Vec<CertificateDer<'static>>>,
}

impl CredentialBundle {
    /// Build a bundle from PEM-encoded material.
    ///
    /// Fails if the certificate or key cannot be parsed or if they are not
    /// a matching pair. A missing or unusable trust-anchor blob is not an
    /// error; the bundle falls back to [`VerifyMode::PeerOnly`].
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], ca_pem: Option<&[u8]>) -> MqttResult<Self> {
        let certificate_chain = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MqttError::Credentials(format!("unreadable certificate PEM: {e}")))?;
        let Some(identity) = certificate_chain.first() else {
            return Err(MqttError::Credentials(
                "no certificate found in identity PEM".into(),
            ));
        };

        let private_key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| MqttError::Credentials(format!("unreadable private key PEM: {e}")))?
            .ok_or_else(|| MqttError::Credentials("no private key found in key PEM".into()))?;

        verify_key_pair(identity, &private_key)?;

        let trust_anchors = ca_pem.and_then(parse_trust_anchors);

        Ok(Self {
            certificate_chain,
            private_key,
            trust_anchors,
        })
    }

    /// Read PEM files named in the config and build a bundle.
    ///
    /// An unreadable CA file degrades to [`VerifyMode::PeerOnly`].
    pub fn load(config: &MqttConfig) -> MqttResult<Self> {
        let cert = std::fs::read(&config.client_cert_path).map_err(|e| {
            MqttError::Credentials(format!(
                "failed to read client cert '{}': {e}",
                config.client_cert_path
            ))
        })?;

        let key = std::fs::read(&config.client_key_path).map_err(|e| {
            MqttError::Credentials(format!(
                "failed to read client key '{}': {e}",
                config.client_key_path
            ))
        })?;

        let ca = match &config.ca_cert_path {
            Some(path) => match std::fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "unable to load root CA");
                    None
                }
            },
            None => None,
        };

        Self::from_pem(&cert, &key, ca.as_deref())
    }

    pub fn verify_mode(&self) -> VerifyMode {
        if self.trust_anchors.is_some() {
            VerifyMode::PeerAndChain
        } else {
            VerifyMode::PeerOnly
        }
    }

    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.certificate_chain
    }

    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.private_key
    }

    pub fn trust_anchors(&self) -> Option<&[CertificateDer<'static>]> {
        self.trust_anchors.as_deref()
    }
}

/// Parse a CA bundle, keeping only certificates usable as trust anchors.
///
/// Returns `None` if nothing usable remains.
fn parse_trust_anchors(ca_pem: &[u8]) -> Option<Vec<CertificateDer<'static>>> {
    let parsed = match rustls_pemfile::certs(&mut &ca_pem[..]).collect::<Result<Vec<_>, _>>() {
        Ok(certs) => certs,
        Err(e) => {
            tracing::warn!(error = %e, "root CA is not valid PEM");
            return None;
        }
    };

    let anchors: Vec<_> = parsed
        .into_iter()
        .filter(|cert| webpki::anchor_from_trusted_cert(cert).is_ok())
        .collect();

    if anchors.is_empty() {
        tracing::warn!("root CA contains no usable trust anchor");
        None
    } else {
        Some(anchors)
    }
}

/// Sign a challenge with the private key and verify it with the certificate.
fn verify_key_pair(cert: &CertificateDer<'_>, key: &PrivateKeyDer<'_>) -> MqttResult<()> {
    let signing_key = rustls::crypto::ring::sign::any_supported_type(key)
        .map_err(|e| MqttError::Credentials(format!("unsupported private key: {e}")))?;

    let signer = signing_key
        .choose_scheme(CHALLENGE_SCHEMES)
        .ok_or_else(|| MqttError::Credentials("private key type is not supported".into()))?;

    let algorithm = verification_algorithm(signer.scheme())
        .ok_or_else(|| MqttError::Credentials("private key type is not supported".into()))?;

    let signature = signer
        .sign(CHALLENGE_MESSAGE)
        .map_err(|e| MqttError::Credentials(format!("private key cannot sign: {e}")))?;

    let end_entity = webpki::EndEntityCert::try_from(cert)
        .map_err(|e| MqttError::Credentials(format!("malformed identity certificate: {e:?}")))?;

    end_entity
        .verify_signature(algorithm, CHALLENGE_MESSAGE, &signature)
        .map_err(|_| MqttError::KeyMismatch)
}

fn verification_algorithm(
    scheme: SignatureScheme,
) -> Option<&'static dyn SignatureVerificationAlgorithm> {
    match scheme {
        SignatureScheme::ECDSA_NISTP256_SHA256 => Some(webpki::ring::ECDSA_P256_SHA256),
        SignatureScheme::ECDSA_NISTP384_SHA384 => Some(webpki::ring::ECDSA_P384_SHA384),
        SignatureScheme::ED25519 => Some(webpki::ring::ED25519),
        SignatureScheme::RSA_PSS_SHA256 => Some(webpki::ring::RSA_PSS_2048_8192_SHA256_LEGACY_KEY),
        SignatureScheme::RSA_PKCS1_SHA256 => Some(webpki::ring::RSA_PKCS1_2048_8192_SHA256),
        _ => None,
    }
}
