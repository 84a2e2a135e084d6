//! Acceptance rules for server names and app ids.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^*&%\s/\\]+$").unwrap());
static APP_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{2,12}$").unwrap());

/// Pattern shown to the user when a name is rejected.
pub const NAME_RULE: &str = "no whitespace and none of * & % / \\";
/// Pattern shown to the user when an app id is rejected.
pub const APP_ID_RULE: &str = "2 to 12 decimal digits";

const APP_ID_MIN: u64 = 10;
const APP_ID_MAX: u64 = 999_999_999_999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid server name '{0}' ({rule})", rule = NAME_RULE)]
    Name(String),
    #[error("invalid app id '{0}' ({rule})", rule = APP_ID_RULE)]
    AppId(String),
}

/// Check a server name. The name doubles as a directory under the install root.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if !NAME_RE.is_match(name) || name == "." || name == ".." {
        return Err(ValidationError::Name(name.to_string()));
    }
    Ok(())
}

/// Parse user input into an app id.
pub fn parse_app_id(input: &str) -> Result<u64, ValidationError> {
    let input = input.trim();
    if !APP_ID_RE.is_match(input) {
        return Err(ValidationError::AppId(input.to_string()));
    }
    let id: u64 = input
        .parse()
        .map_err(|_| ValidationError::AppId(input.to_string()))?;
    validate_app_id(id)?;
    Ok(id)
}

/// Range check for an already-numeric app id.
pub fn validate_app_id(id: u64) -> Result<(), ValidationError> {
    if (APP_ID_MIN..=APP_ID_MAX).contains(&id) {
        Ok(())
    } else {
        Err(ValidationError::AppId(id.to_string()))
    }
}
