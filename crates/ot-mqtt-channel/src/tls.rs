//! TLS configuration for mTLS connections to the broker.
//!
//! Turns a [`CredentialBundle`] into rumqttc's TLS transport. With trust
//! anchors the broker chain is verified; without them the client still
//! presents its identity but accepts any broker chain.

use std::sync::Arc;

use rumqttc::{TlsConfiguration, Transport};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::credentials::{CredentialBundle, VerifyMode};
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport presenting the bundle's identity.
pub fn build_transport(bundle: &CredentialBundle) -> MqttResult<Transport> {
    let config = client_config(bundle)?;
    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(config),
    )))
}

/// Build the rustls client configuration for a bundle.
pub fn client_config(bundle: &CredentialBundle) -> MqttResult<ClientConfig> {
    let chain = bundle.certificate_chain().to_vec();
    let key = bundle.private_key().clone_key();
    let builder = ClientConfig::builder();

    let config = match (bundle.verify_mode(), bundle.trust_anchors()) {
        (VerifyMode::PeerAndChain, Some(anchors)) => {
            let mut roots = RootCertStore::empty();
            let (added, ignored) = roots.add_parsable_certificates(anchors.iter().cloned());
            tracing::info!(added, ignored, "root CA will be verified");
            builder
                .with_root_certificates(roots)
                .with_client_auth_cert(chain, key)
        }
        _ => {
            tracing::warn!("no root CA, skipping broker chain verification");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
                .with_client_auth_cert(chain, key)
        }
    };

    config.map_err(|e| MqttError::Tls(e.to_string()))
}

/// Accepts any broker certificate chain, but still checks handshake
/// signatures so the broker must hold the key for the certificate it sent.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
