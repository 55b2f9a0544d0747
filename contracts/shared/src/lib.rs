//! Shared utilities for the Arena contracts.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::contracterror;

/// Common error codes for the arithmetic helpers.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    InvalidAmount = 1,
    InvalidShare = 2,
    Overflow = 3,
}

/// Constant for basis points divisor.
pub const BASIS_POINTS_DIVISOR: u32 = 10_000;

/// Compute the portion of `amount` represented by `bps` basis points,
/// rounding toward zero. Callers account the rounding remainder explicitly.
pub fn split_amount(amount: i128, bps: u32) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    if bps > BASIS_POINTS_DIVISOR {
        return Err(Error::InvalidShare);
    }
    amount
        .checked_mul(bps as i128)
        .and_then(|v| v.checked_div(BASIS_POINTS_DIVISOR as i128))
        .ok_or(Error::Overflow)
}
