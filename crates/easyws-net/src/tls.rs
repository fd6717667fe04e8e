//! TLS configuration for both roles.
//!
//! Everything runs on the `aws-lc-rs` provider. Server identities come in
//! as PEM; clients trust configured roots, else the platform store.

use std::fmt;
use std::sync::Arc;

use tokio_rustls::rustls::client::WebPkiServerVerifier;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    CryptoProvider, aws_lc_rs, verify_tls12_signature, verify_tls13_signature,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    self, CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig,
    SignatureScheme,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, warn};

use crate::error::{NetError, Result};

/// A PEM certificate chain and private key.
#[derive(Clone)]
pub struct TlsIdentity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsIdentity {
    /// Wrap PEM bytes. Nothing is parsed until a config is built.
    pub fn from_pem(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Read both PEM files.
    pub fn from_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        Ok(Self::from_pem(
            std::fs::read(cert_path)?,
            std::fs::read(key_path)?,
        ))
    }

    /// Certificate chain PEM.
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    /// Private key PEM.
    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    /// Build a rustls server config. Fails on an unusable key pair.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let certs = parse_certs(&self.cert_pem)?;
        if certs.is_empty() {
            return Err(NetError::Tls("no certificate found in PEM".into()));
        }
        let key = parse_private_key(&self.key_pem)?;
        ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(tls_err)?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(tls_err)
    }

    /// Build an acceptor for the listener.
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        Ok(TlsAcceptor::from(Arc::new(self.server_config()?)))
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Generate a self-signed identity for `common_name`.
///
/// The name is also the only subject alternative name.
pub fn generate_self_signed(common_name: &str) -> Result<TlsIdentity> {
    let mut params = rcgen::CertificateParams::new(vec![common_name.to_owned()])
        .map_err(|e| NetError::Tls(format!("certificate params: {e}")))?;
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    let key_pair =
        rcgen::KeyPair::generate().map_err(|e| NetError::Tls(format!("key generation: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| NetError::Tls(format!("self-signing: {e}")))?;
    Ok(TlsIdentity::from_pem(cert.pem(), key_pair.serialize_pem()))
}

/// Client-side trust settings.
#[derive(Clone, Debug, Default)]
pub struct ClientTlsOptions {
    /// Accept any server certificate.
    pub skip_verify: bool,
    /// Validate the chain but ignore a hostname mismatch.
    pub skip_hostname_check: bool,
    /// Extra trusted roots. When empty the platform store is used.
    pub roots: Vec<CertificateDer<'static>>,
}

/// Build a rustls client config.
pub fn client_config(options: &ClientTlsOptions) -> Result<ClientConfig> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(tls_err)?;

    if options.skip_verify {
        warn!("tls certificate verification disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth());
    }

    let roots = Arc::new(root_store(&options.roots)?);
    if options.skip_hostname_check {
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| NetError::Tls(e.to_string()))?;
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(IgnoreHostname { inner }))
            .with_no_client_auth());
    }

    Ok(builder
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Build a connector for the dialer.
pub fn connector(options: &ClientTlsOptions) -> Result<TlsConnector> {
    Ok(TlsConnector::from(Arc::new(client_config(options)?)))
}

/// Server name for SNI and verification.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_owned()).map_err(|e| NetError::Tls(format!("{host}: {e}")))
}

/// Parse every certificate in a PEM buffer.
pub fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NetError::Tls(format!("invalid certificate PEM: {e}")))
}

/// Parse the first private key in a PEM buffer.
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| NetError::Tls(format!("invalid key PEM: {e}")))?
        .ok_or_else(|| NetError::Tls("no private key found in PEM".into()))
}

fn root_store(extra: &[CertificateDer<'static>]) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    if extra.is_empty() {
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            debug!(error = %e, "skipping unreadable platform certificate");
        }
        let (added, ignored) = store.add_parsable_certificates(native.certs);
        debug!(added, ignored, "loaded platform trust store");
    } else {
        let (added, ignored) = store.add_parsable_certificates(extra.iter().cloned());
        debug!(added, ignored, "loaded configured roots");
    }
    if store.is_empty() {
        return Err(NetError::Tls("no trusted root certificates".into()));
    }
    Ok(store)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(aws_lc_rs::default_provider())
}

#[allow(clippy::needless_pass_by_value)]
fn tls_err(e: rustls::Error) -> NetError {
    NetError::Tls(e.to_string())
}

/// Verifier that accepts any certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Chain validation with the hostname mismatch error suppressed.
#[derive(Debug)]
struct IgnoreHostname {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
