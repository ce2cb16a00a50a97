//! pt-BR money strings: thousands separator `.`, decimal separator `,`.
//!
//! Statements write amounts like `1.234,56`, `-50,00` or `50,00 D`.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::record::Direction;

/// Split an optional trailing `C`/`D` marker (case-insensitive) off an amount.
pub fn split_direction_marker(raw: &str) -> (&str, Option<Direction>) {
    let s = raw.trim();
    let Some(last) = s.chars().last() else {
        return (s, None);
    };
    match last.to_ascii_uppercase() {
        'C' => (s[..s.len() - 1].trim_end(), Some(Direction::Credit)),
        'D' => (s[..s.len() - 1].trim_end(), Some(Direction::Debit)),
        _ => (s, None),
    }
}

/// Parse a localized amount into a signed decimal.
///
/// A trailing direction marker is ignored here; use
/// [`parse_amount_with_direction`] when the marker matters.
pub fn parse_br_amount(raw: &str) -> Result<Decimal> {
    let (number, _) = split_direction_marker(raw);
    let number = number.trim();
    if number.is_empty() {
        return Err(Error::Amount(raw.to_string()));
    }
    let canonical = number.replace('.', "").replace(',', ".");
    Decimal::from_str(&canonical).map_err(|_| Error::Amount(raw.to_string()))
}

/// Parse an amount into its magnitude and direction.
///
/// Debit is signalled by a trailing `D` or a leading minus sign; everything
/// else is a credit.
pub fn parse_amount_with_direction(raw: &str) -> Result<(Decimal, Direction)> {
    let (number, marker) = split_direction_marker(raw);
    let value = parse_br_amount(number)?;
    let direction = match marker {
        Some(Direction::Debit) => Direction::Debit,
        _ if number.trim_start().starts_with('-') => Direction::Debit,
        _ => Direction::Credit,
    };
    Ok((value.abs(), direction))
}

/// Format a decimal back into the localized layout (`1.234,56`).
pub fn format_br_amount(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped},{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_parse_thousands_and_decimals() {
        assert_eq!(parse_br_amount("1.234,56").unwrap(), Decimal::new(123456, 2));
        assert_eq!(parse_br_amount("150,00").unwrap(), Decimal::new(15000, 2));
        assert_eq!(parse_br_amount("-1.000.000,01").unwrap(), Decimal::new(-100000001, 2));
    }

    #[test]
    fn test_parse_with_debit_marker() {
        let (value, dir) = parse_amount_with_direction("50,00 D").unwrap();
        assert_eq!(value, Decimal::new(5000, 2));
        assert_eq!(dir, Direction::Debit);

        let (value, dir) = parse_amount_with_direction("-12,30").unwrap();
        assert_eq!(value, Decimal::new(1230, 2));
        assert_eq!(dir, Direction::Debit);

        let (_, dir) = parse_amount_with_direction("12,30 c").unwrap();
        assert_eq!(dir, Direction::Credit);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_br_amount("").is_err());
        assert!(parse_br_amount("abc").is_err());
        assert!(parse_br_amount("D").is_err());
    }

    #[test]
    fn test_format_round_trips() {
        for s in ["0,00", "5,82", "999,99", "1.000,00", "1.234,56", "12.345.678,90", "-1.234,56"] {
            let parsed = parse_br_amount(s).unwrap();
            assert_eq!(format_br_amount(parsed), s);
        }
    }
}
