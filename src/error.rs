//! Typed failures surfaced by the simulation core.
//!
//! Degenerate arithmetic (zero reserves, zero collateral value) never shows up
//! here: those cases resolve locally to documented values. Only conditions
//! that make a run meaningless abort it.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// A configuration parameter is outside its permitted range.
    #[error("invalid config: {field}={value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: u64,
        reason: &'static str,
    },

    /// Initial reserves must both be positive.
    #[error("invalid reserves: base={base} quote={quote}")]
    InvalidReserves { base: u128, quote: u128 },

    /// A borrower position cannot be admitted to the book.
    #[error("invalid position: {reason}")]
    InvalidPosition { reason: &'static str },

    /// Price observations must be strictly positive.
    #[error("malformed tick at ts={timestamp}: price={price}")]
    MalformedTick { timestamp: i64, price: u128 },
}

pub type SimResult<T> = Result<T, SimError>;
