// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors

use argus::parse_size::{parse_size, ParseSizeError};

#[test]
fn accepts_surrounding_whitespace() {
    assert_eq!(parse_size(b"  42 "), Ok(42));
    assert_eq!(parse_size(b"\t7\n"), Ok(7));
    assert_eq!(parse_size(b"0"), Ok(0));
}

#[test]
fn rejects_negative_values() {
    assert_eq!(parse_size(b"-1"), Err(ParseSizeError::Negative));
    assert_eq!(parse_size(b"  -42"), Err(ParseSizeError::Negative));
}

#[test]
fn rejects_trailing_garbage() {
    assert_eq!(parse_size(b"4x"), Err(ParseSizeError::InvalidChar('x')));
    assert_eq!(parse_size(b"12 34"), Err(ParseSizeError::InvalidChar('3')));
}

#[test]
fn rejects_digitless_input() {
    assert_eq!(parse_size(b""), Err(ParseSizeError::NoDigits));
    assert_eq!(parse_size(b"   "), Err(ParseSizeError::NoDigits));
    assert_eq!(parse_size(b"x"), Err(ParseSizeError::InvalidChar('x')));
}

#[test]
fn rejects_overflow() {
    // Twenty nines does not fit in 64 bits.
    assert_eq!(
        parse_size(b"99999999999999999999"),
        Err(ParseSizeError::OutOfRange)
    );
    assert_eq!(parse_size(b"18446744073709551615"), Ok(u64::MAX));
    assert_eq!(
        parse_size(b"18446744073709551616"),
        Err(ParseSizeError::OutOfRange)
    );
}
