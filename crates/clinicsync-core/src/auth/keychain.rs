use anyhow::{Context, Result};
use keyring::Entry;

use super::Credential;

const SERVICE_NAME: &str = "clinicsync";

/// Remembers a signed-in credential in the OS keychain, keyed by account
/// name, so an operator does not have to paste a token on every start.
pub struct Keychain;

impl Keychain {
    /// Store a credential (token and scheme order) for an account
    pub fn remember(account: &str, credential: &Credential) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        let encoded = serde_json::to_string(credential)?;
        entry
            .set_password(&encoded)
            .context("Failed to store credential in keychain")?;
        Ok(())
    }

    /// Retrieve the credential remembered for an account
    pub fn recall(account: &str) -> Result<Credential> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        let encoded = entry
            .get_password()
            .context("Failed to retrieve credential from keychain")?;
        serde_json::from_str(&encoded).context("Keychain entry is not a credential")
    }

    pub fn forget(account: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, account)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    pub fn has_credential(account: &str) -> bool {
        Self::recall(account).is_ok()
    }
}
