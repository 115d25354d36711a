/// Amount Arithmetic
///
/// All amounts are unsigned 256-bit integers. No wrapping, no saturation:
/// every operation that could leave the range is checked and reported.

use alloy_primitives::U256;

use crate::error::LedgerError;

/// Token amount. One storage word wide.
pub type Amount = U256;

/// Checked amount addition.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount, LedgerError> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::InvalidAmount(format!("overflow: {} + {}", a, b)))
}

/// Checked amount subtraction.
pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount, LedgerError> {
    a.checked_sub(b)
        .ok_or_else(|| LedgerError::InvalidAmount(format!("underflow: {} - {}", a, b)))
}

/// Reject zero amounts for operations that must move value.
pub fn require_positive(amount: Amount) -> Result<Amount, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(amount)
}

/// Parse a decimal (or `0x`-prefixed hex) amount string.
pub fn parse_amount(text: &str) -> Result<Amount, LedgerError> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|e| LedgerError::InvalidAmount(format!("malformed amount {:?}: {}", text, e)))
}

/// Serde adapter: amounts as decimal strings, parsed with `parse_amount`.
pub mod amount_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_amount, Amount};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_amount(&text).map_err(serde::de::Error::custom)
    }
}
