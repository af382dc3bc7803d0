//! Syntactic email address validation

use lettre::{message::Mailbox, Address};
use validator::ValidationError;

/// True when `address` parses as a mailbox, either bare (`user@example.com`)
/// or with a display name (`User <user@example.com>`). Never panics.
pub fn is_valid(address: &str) -> bool {
    !address.trim().is_empty() && address.parse::<Mailbox>().is_ok()
}

/// True when `address` is a bare `local@domain` address, the form judges
/// supply and every transport expects. Display-name forms are rejected.
pub fn is_bare_address(address: &str) -> bool {
    address.parse::<Address>().is_ok()
}

/// `validator` hook for recipient address fields; requires a bare address
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if is_bare_address(address) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some("invalid email address".into());
        Err(err)
    }
}
