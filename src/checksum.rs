//! National identity number (NIN) validation.
//!
//! A NIN is a string of decimal digits whose last digit is a weighted
//! modulo-10 check digit over the preceding digits. Starting from the digit
//! next to the check digit and moving left, every other digit is doubled
//! (subtracting 9 when the result exceeds 9) before summing.

/// Exact length of a valid identity number, check digit included.
pub const NIN_LENGTH: usize = 12;

/// Returns `true` when `raw` consists only of ASCII digits and its last
/// digit matches the check digit computed over the rest.
///
/// Length is deliberately not enforced here; the import driver reports a
/// wrong length as a separate failure (see [`has_valid_length`]).
pub fn validate_identity_number(raw: &str) -> bool {
    let digits: Option<Vec<u32>> = raw.chars().map(|c| c.to_digit(10)).collect();
    let Some(digits) = digits else {
        return false;
    };
    match digits.split_last() {
        Some((&check, payload)) => check_digit(payload) == check,
        None => false,
    }
}

/// Returns `true` when `raw` has exactly [`NIN_LENGTH`] characters.
pub fn has_valid_length(raw: &str) -> bool {
    raw.chars().count() == NIN_LENGTH
}

/// Computes the check digit for a payload of decimal digits.
pub fn check_digit(payload: &[u32]) -> u32 {
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10
}
