//! Currency codes and exact decimal amounts.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are `rust_decimal::Decimal` from the wire to the database column.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of fractional digits the ledger stores (`NUMERIC(19, 4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// Largest absolute amount or balance a `NUMERIC(19, 4)` column holds:
/// `999_999_999_999_999.9999`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, AMOUNT_SCALE);

/// ISO 4217-style currency code: exactly three ASCII letters, upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

/// Error returned when a currency code is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid currency code '{0}': expected three ASCII letters")]
pub struct CurrencyCodeError(pub String);

impl CurrencyCode {
    /// US Dollar.
    pub const USD: Self = Self(*b"USD");
    /// Euro.
    pub const EUR: Self = Self(*b"EUR");

    /// Parses and normalizes a currency code.
    pub fn new(code: &str) -> Result<Self, CurrencyCodeError> {
        let trimmed = code.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(CurrencyCodeError(code.to_string()));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

/// Error returned by [`parse_amount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    /// The input was empty.
    #[error("Amount is empty")]
    Empty,

    /// The input is not a plain decimal literal.
    #[error("Amount '{0}' is not an exact decimal")]
    NotExact(String),
}

/// Parses an amount from its decimal string form without any float detour.
///
/// Scientific notation is rejected, as is any literal that cannot be represented
/// exactly by `Decimal`.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if s.contains(['e', 'E']) {
        return Err(AmountParseError::NotExact(s.to_string()));
    }
    Decimal::from_str_exact(s).map_err(|_| AmountParseError::NotExact(s.to_string()))
}
