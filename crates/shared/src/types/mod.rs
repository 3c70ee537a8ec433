//! Common types used across the application.

pub mod id;
pub mod money;
pub mod pagination;

#[cfg(test)]
mod money_tests;
#[cfg(test)]
mod pagination_tests;

pub use id::*;
pub use money::{AMOUNT_SCALE, AmountParseError, CurrencyCode, MAX_AMOUNT, parse_amount};
pub use pagination::{MAX_PER_PAGE, PageMeta, PageRequest, PageResponse};
