//! Payment reference and validation code generation.

use chrono::{DateTime, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;

/// Prefix for deposit references
pub const DEPOSIT_PREFIX: &str = "PRL";

/// Prefix for withdrawal references
pub const WITHDRAWAL_PREFIX: &str = "WDR";

/// Random suffix length
pub const SUFFIX_LEN: usize = 8;

/// Bytes of entropy in a validation code
pub const VALIDATION_CODE_BYTES: usize = 16;

/// Upper-case letters and digits without the easily confused `I`, `O`, `0`, `1`
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a human-readable reference: `PREFIX-YYYYMMDD-XXXXXXXX`
///
/// # Arguments
///
/// * `prefix` - Code family, e.g. [`DEPOSIT_PREFIX`]
/// * `now` - Date component of the code
pub fn generate_reference_code(prefix: &str, now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}

/// Generate an opaque validation code (hex)
pub fn generate_validation_code() -> String {
    let mut bytes = [0u8; VALIDATION_CODE_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Whether `code` has the shape produced by [`generate_reference_code`]
pub fn is_well_formed(code: &str) -> bool {
    let mut parts = code.split('-');
    let (Some(prefix), Some(date), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    !prefix.is_empty()
        && prefix.bytes().all(|b| b.is_ascii_uppercase())
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == SUFFIX_LEN
        && suffix.bytes().all(|b| ALPHABET.contains(&b))
}

/// Compare validation codes in constant time
pub fn validation_codes_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
