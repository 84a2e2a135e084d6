//! The OS account performing updates.

use nix::unistd::{Uid, User};
use thiserror::Error;

/// Identity of the user driving updates. Output lines are tagged with it.
///
/// Obtaining one through [`Operator::require`] is the precondition for
/// running the installer: installs should be owned by the service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    name: String,
}

impl Operator {
    /// The user this process runs as.
    pub fn current() -> Result<Self, AccountError> {
        let uid = Uid::current();
        let user = User::from_uid(uid)
            .map_err(|e| AccountError::Lookup(std::io::Error::from(e)))?
            .ok_or(AccountError::Unknown(uid.as_raw()))?;
        Ok(Self { name: user.name })
    }

    /// The current user, but only if it is `account`.
    pub fn require(account: &str) -> Result<Self, AccountError> {
        let current = Self::current()?;
        if current.name != account {
            return Err(AccountError::WrongAccount {
                required: account.to_string(),
                actual: current.name,
            });
        }
        Ok(current)
    }

    /// Operator with a given name, skipping the account lookup.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Must be user '{required}' to manage SteamCMD applications. You are '{actual}'")]
    WrongAccount { required: String, actual: String },
    #[error("No account name for uid {0}")]
    Unknown(u32),
    #[error("Failed to look up current user: {0}")]
    Lookup(#[source] std::io::Error),
}
