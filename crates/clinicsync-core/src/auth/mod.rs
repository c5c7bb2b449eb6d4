//! Authentication state for outgoing requests.
//!
//! This module provides:
//! - `Credential`/`Scheme`: an opaque token and the header schemes to try
//! - `CredentialStore`: the single shared slot holding the current credential
//! - `Keychain`: optional OS-level storage for a remembered credential
//!
//! Credentials are issued by the backend; nothing here signs anyone in.

pub mod credential;
pub mod keychain;
pub mod store;

pub use credential::{Credential, ParseSchemeError, Scheme};
pub use keychain::Keychain;
pub use store::CredentialStore;
