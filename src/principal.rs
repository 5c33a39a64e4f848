//! Textual principal validation
//!
//! Only the shape of the textual form is checked (lowercase base32 groups of
//! up to five characters separated by dashes). The CRC32 checksum embedded in
//! real principals is not verified.

use crate::error::VaultError;

/// Anonymous caller principal.
pub const ANONYMOUS: &str = "2vxsx-fae";

/// Counterparty recorded for mint and burn entries.
pub const MINTING_ACCOUNT: &str = "minting-account";

const MAX_TEXT_LEN: usize = 63;
const GROUP_LEN: usize = 5;

/// Validate a textual principal, returning it trimmed.
pub fn parse(text: &str) -> Result<String, VaultError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(VaultError::InvalidArgument("principal is empty".into()));
    }
    if text.len() > MAX_TEXT_LEN {
        return Err(VaultError::InvalidArgument(format!(
            "principal '{}' is longer than {} characters",
            text, MAX_TEXT_LEN
        )));
    }

    for group in text.split('-') {
        if group.is_empty() || group.len() > GROUP_LEN {
            return Err(VaultError::InvalidArgument(format!(
                "principal '{}' has a malformed group '{}'",
                text, group
            )));
        }
        if !group
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(VaultError::InvalidArgument(format!(
                "principal '{}' contains characters outside [a-z0-9-]",
                text
            )));
        }
    }

    Ok(text.to_string())
}
