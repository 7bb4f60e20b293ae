// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! EUR amount parsing shared by property and offer endpoints.

use crate::error::ApiError;

/// Parse a positive EUR decimal string, returning `(normalized, minor_units)`.
///
/// At most 2 decimal places; rejects zero, negatives, and non-numeric input.
pub(crate) fn parse_amount_eur(amount: &str) -> Result<(String, u64), ApiError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("amount is too large"))?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) || fraction_part.len() > 2 {
        return Err(ApiError::bad_request(
            "amount must have at most 2 decimal places",
        ));
    }

    let fraction = if fraction_part.is_empty() {
        0
    } else if fraction_part.len() == 1 {
        fraction_part
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request("amount must be a valid positive number"))?
            * 10
    } else {
        fraction_part
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request("amount must be a valid positive number"))?
    };

    let minor = whole
        .checked_mul(100)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| ApiError::bad_request("amount is too large"))?;

    if minor == 0 {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let normalized = format!("{whole}.{fraction:02}");
    Ok((normalized, minor))
}
