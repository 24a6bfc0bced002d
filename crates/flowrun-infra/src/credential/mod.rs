//! Credential provider implementations.

pub mod env;

pub use env::EnvCredentialProvider;
