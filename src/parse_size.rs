// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Strict decimal parser for protocol payloads (task ids, timeout seconds).
// Pure and allocation-free; every numeric command argument goes through it.

use thiserror::Error;

/// Reasons a payload failed to parse as an unsigned decimal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseSizeError {
    /// A leading `-` is rejected outright instead of wrapping around.
    #[error("value cannot be negative")]
    Negative,
    #[error("invalid character '{0}'")]
    InvalidChar(char),
    #[error("no digits found")]
    NoDigits,
    #[error("value could not be represented by a size type")]
    OutOfRange,
}

/// Parse an unsigned decimal from `input`.
///
/// Leading and trailing ASCII whitespace is skipped. The digit run must be
/// contiguous; any other character before or after it is an
/// [`ParseSizeError::InvalidChar`] naming the offender. Overflow is detected
/// during accumulation rather than wrapped.
pub fn parse_size(input: &[u8]) -> Result<u64, ParseSizeError> {
    let mut i = 0;
    while i < input.len() && input[i].is_ascii_whitespace() {
        i += 1;
    }
    if i == input.len() {
        return Err(ParseSizeError::NoDigits);
    }
    if input[i] == b'-' {
        return Err(ParseSizeError::Negative);
    }
    if !input[i].is_ascii_digit() {
        return Err(ParseSizeError::InvalidChar(input[i] as char));
    }

    let mut value: u64 = 0;
    while i < input.len() && input[i].is_ascii_digit() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(input[i] - b'0')))
            .ok_or(ParseSizeError::OutOfRange)?;
        i += 1;
    }

    while i < input.len() && input[i].is_ascii_whitespace() {
        i += 1;
    }
    if i != input.len() {
        return Err(ParseSizeError::InvalidChar(input[i] as char));
    }
    Ok(value)
}
