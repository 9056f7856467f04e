//! Principal connectors

pub mod crypto_transient;

pub use crypto_transient::CryptoTransientIdPrincipalConnector;
