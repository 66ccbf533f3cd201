use rustls::pki_types::PrivateKeyDer;
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::fs::File;
use std::io::BufReader;

/// Load a PEM certificate chain and PKCS#8 key into a rustls server config.
/// Panics when the material is missing or malformed; runs once at startup.
pub fn load_rustls_config(cert_path: &str, key_path: &str) -> ServerConfig {
    let cert_file =
        File::open(cert_path).unwrap_or_else(|e| panic!("Cannot open {}: {}", cert_path, e));
    let key_file =
        File::open(key_path).unwrap_or_else(|e| panic!("Cannot open {}: {}", key_path, e));

    let cert_chain = certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .expect("Failed to parse certificate chain");

    let key = pkcs8_private_keys(&mut BufReader::new(key_file))
        .next()
        .unwrap_or_else(|| panic!("No PKCS#8 private key found in {}", key_path))
        .map(PrivateKeyDer::Pkcs8)
        .expect("Failed to parse private key");

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .expect("bad certificate/key")
}
