//! Fixed-point amount arithmetic.
//!
//! Amounts are unsigned integers in the smallest unit (18 implied decimals by
//! default). Balances are signed: positive means owed, negative means owing.

use crate::error::{LedgerError, LedgerResult};

/// Unsigned fixed-point amount in the smallest unit.
pub type Amount = u128;

/// Signed net position in the smallest unit.
pub type Balance = i128;

/// Default number of implied decimals.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Convert an unsigned amount to a signed balance delta.
pub fn to_balance(amount: Amount) -> LedgerResult<Balance> {
    Balance::try_from(amount)
        .map_err(|_| LedgerError::ArithmeticOverflow(format!("amount {amount} exceeds i128")))
}

/// Checked `balance + delta`.
pub fn checked_add(balance: Balance, delta: Balance) -> LedgerResult<Balance> {
    balance
        .checked_add(delta)
        .ok_or_else(|| LedgerError::ArithmeticOverflow(format!("{balance} + {delta}")))
}

/// Checked sum of a slice of amounts.
pub fn checked_sum(amounts: &[Amount]) -> LedgerResult<Amount> {
    amounts.iter().try_fold(0u128, |acc, a| {
        acc.checked_add(*a)
            .ok_or_else(|| LedgerError::ArithmeticOverflow("sum of amounts".to_string()))
    })
}

/// Render an amount with `decimals` implied decimal places, trimming trailing zeros.
///
/// Used for human-readable log output only; never parsed back.
pub fn format_amount(amount: Amount, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let Some(scale) = 10u128.checked_pow(u32::from(decimals)) else {
        return amount.to_string();
    };
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = usize::from(decimals));
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fixed_point_amounts() {
        assert_eq!(format_amount(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_amount(2_000_000_000_000_000_000, 18), "2");
        assert_eq!(format_amount(1, 18), "0.000000000000000001");
        assert_eq!(format_amount(1234, 2), "12.34");
        assert_eq!(format_amount(99, 0), "99");
    }

    #[test]
    fn rejects_amounts_outside_signed_range() {
        assert_eq!(to_balance(10).unwrap(), 10);
        assert!(matches!(
            to_balance(u128::MAX),
            Err(LedgerError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn checked_helpers_detect_overflow() {
        assert!(checked_add(i128::MAX, 1).is_err());
        assert_eq!(checked_add(-5, 5).unwrap(), 0);
        assert!(checked_sum(&[u128::MAX, 1]).is_err());
        assert_eq!(checked_sum(&[1, 2, 3]).unwrap(), 6);
    }
}
