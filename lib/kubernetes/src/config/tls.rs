use std::sync::Arc;

use rustls::client::WantsClientCert;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, ConfigBuilder, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_native_certs::CertificateResult;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from Rustls
#[derive(Debug, Error)]
pub enum Error {
    /// Identity PEM is invalid
    #[error("identity PEM is invalid: {0}")]
    InvalidIdentityPem(#[source] rustls::pki_types::pem::Error),

    /// Identity PEM is missing a private key: the key must be PKCS8 or RSA/PKCS1
    #[error("identity PEM is missing a private key: the key must be PKCS8 or RSA/PKCS1")]
    MissingPrivateKey,

    /// Identity PEM is missing certificate
    #[error("identity PEM is missing certificate")]
    MissingCertificate,

    /// Invalid private key
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(#[source] rustls::Error),

    /// Unknown private key format
    #[error("unknown private key format")]
    UnknownPrivateKeyFormat,

    /// Failed to parse PEM-encoded certificates
    #[error("failed to parse PEM-encoded certificates: {0}")]
    ParseCertificates(#[source] pem::PemError),

    /// Failed to add a root certificate
    #[error("failed to add a root certificate: {0}")]
    AddRootCertificate(#[source] rustls::Error),

    /// Load native certificates failed
    #[error("load native certificates: {0:?}")]
    LoadNativeCertificates(Vec<rustls_native_certs::Error>),

    /// The crypto provider does not support the default protocol versions
    #[error("unsupported protocol versions: {0}")]
    ProtocolVersions(#[source] rustls::Error),
}

/// Split a PEM bundle holding a private key and its certificate chain.
pub fn client_auth(
    data: &[u8],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), Error> {
    use rustls::pki_types::pem::{self, SectionKind};

    let mut cert_chain = Vec::new();
    let mut pkcs8_key = None;
    let mut pkcs1_key = None;
    let mut sec1_key = None;
    let mut reader = std::io::Cursor::new(data);
    while let Some((kind, der)) = pem::from_buf(&mut reader).map_err(Error::InvalidIdentityPem)? {
        match kind {
            SectionKind::Certificate => cert_chain.push(der.into()),
            SectionKind::PrivateKey => pkcs8_key = Some(PrivateKeyDer::Pkcs8(der.into())),
            SectionKind::RsaPrivateKey => pkcs1_key = Some(PrivateKeyDer::Pkcs1(der.into())),
            SectionKind::EcPrivateKey => sec1_key = Some(PrivateKeyDer::Sec1(der.into())),
            _ => return Err(Error::UnknownPrivateKeyFormat),
        }
    }

    let private_key = pkcs8_key
        .or(pkcs1_key)
        .or(sec1_key)
        .ok_or(Error::MissingPrivateKey)?;

    if cert_chain.is_empty() {
        return Err(Error::MissingCertificate);
    }

    Ok((cert_chain, private_key))
}

/// Root store holding every `CERTIFICATE` block of a PEM bundle.
pub fn root_store(pem_data: &[u8]) -> Result<RootCertStore, Error> {
    let certs = pem::parse_many(pem_data)
        .map_err(Error::ParseCertificates)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(|p| CertificateDer::from(p.into_contents()));

    let mut root_store = RootCertStore::empty();
    for cert in certs {
        root_store.add(cert).map_err(Error::AddRootCertificate)?;
    }

    Ok(root_store)
}

/// Root store built from the platform's trusted certificates.
pub fn native_root_store() -> Result<RootCertStore, Error> {
    let CertificateResult { certs, errors, .. } = rustls_native_certs::load_native_certs();
    if certs.is_empty() && !errors.is_empty() {
        return Err(Error::LoadNativeCertificates(errors));
    }

    let mut root_store = RootCertStore::empty();
    for cert in certs {
        if let Err(err) = root_store.add(cert) {
            debug!(
                message = "certificate parse failed",
                %err
            );
        }
    }

    if root_store.is_empty() {
        debug!(message = "no valid native root CA certificates found");
    }

    Ok(root_store)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// A client config builder trusting `root_store`.
pub fn builder(
    root_store: RootCertStore,
) -> Result<ConfigBuilder<ClientConfig, WantsClientCert>, Error> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(Error::ProtocolVersions)?
        .with_root_certificates(root_store);

    Ok(builder)
}

/// Accepts any server certificate, `insecure-skip-tls-verify` in kubeconfig.
#[derive(Debug)]
pub struct NoCertificateVerification {
    algorithms: WebPkiSupportedAlgorithms,
}

impl Default for NoCertificateVerification {
    fn default() -> Self {
        Self {
            algorithms: provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer,
        _intermediates: &[CertificateDer],
        server_name: &ServerName,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        warn!(
            message = "server certificate verification bypassed",
            server = ?server_name
        );

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
