//! One-line-per-movement layout written by the merger.

use conciliar_core::{Direction, TransactionRecord};
use conciliar_core::money::split_direction_marker;

use super::{EMPTY_FIELD, StatementParser, field, with_hint};

/// Fields: date, branch, lot, narration, document, amount [, D].
pub(crate) fn parse_line(parser: &StatementParser, parts: &[&str]) -> TransactionRecord {
    let raw_amount = field(parts, 5);
    let (amount, marker) = split_direction_marker(&raw_amount);
    // "- C" / "- D": an empty amount that still carries its direction
    let amount = if amount == EMPTY_FIELD { "" } else { amount };
    let trailing_debit = parts.get(6).is_some_and(|p| p.trim().eq_ignore_ascii_case("D"));

    let direction = if marker == Some(Direction::Debit) || amount.starts_with('-') || trailing_debit {
        Direction::Debit
    } else {
        Direction::Credit
    };

    let narration = field(parts, 3);
    let hint = parser.identity_hint(&narration);
    with_hint(
        TransactionRecord {
            movement_date: field(parts, 0),
            origin_branch: field(parts, 1),
            lot: field(parts, 2),
            narration,
            document_ref: field(parts, 4),
            amount: amount.to_string(),
            direction,
            tax_id: None,
            tax_id_kind: None,
            counterparty_name_guess: None,
        },
        hint,
    )
}
