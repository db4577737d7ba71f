//! Access credentials for a provisioned Windows VM.

use std::fmt;

/// Address and Administrator password of the VM created for this run.
///
/// Created once by the provisioner and read-only afterward.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    address: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
        }
    }

    /// Public IP address (or DNS name) of the VM.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Administrator password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}
