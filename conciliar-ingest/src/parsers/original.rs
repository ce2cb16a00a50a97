//! Bank export layout: a data line followed by a narration line.

use conciliar_core::money::split_direction_marker;
use conciliar_core::{Direction, TransactionRecord};

use super::{StatementParser, field, is_separator, is_terminator, with_hint};
use crate::types::AmountColumn;

/// Next non-blank, non-separator line after a data line, with its index.
///
/// When there is none (or the next line is another movement or the
/// future-entries marker) the narration is
/// empty and the returned index is `start - 1`, so nothing gets consumed.
pub(crate) fn narration_after(parser: &StatementParser, lines: &[&str], start: usize) -> (String, usize) {
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let line = line.trim();
        if line.is_empty() || is_separator(line) {
            continue;
        }
        if parser.is_data_line(line) || is_terminator(line) {
            break;
        }
        return (line.to_string(), idx);
    }
    (String::new(), start.saturating_sub(1))
}

/// Fields: date, balance date, branch, lot, document; the amount is taken from
/// the currency-shaped tokens on the line.
pub(crate) fn parse_line(
    parser: &StatementParser,
    line: &str,
    parts: &[&str],
    narration: String,
) -> TransactionRecord {
    let matches: Vec<&str> = parser.currency_re.find_iter(line).map(|m| m.as_str()).collect();
    let picked = match parser.options().amount_column {
        AmountColumn::Last => matches.last().copied(),
        AmountColumn::FromEnd(n) => {
            let n = n.max(1);
            if matches.len() >= n {
                Some(matches[matches.len() - n])
            } else {
                matches.first().copied()
            }
        }
    };
    let raw_amount = picked.map(str::to_string).unwrap_or_else(|| field(parts, 5));

    let (amount, marker) = split_direction_marker(&raw_amount);
    let direction = if marker == Some(Direction::Debit) || amount.starts_with('-') {
        Direction::Debit
    } else {
        Direction::Credit
    };

    let hint = parser.identity_hint(&narration);
    with_hint(
        TransactionRecord {
            movement_date: field(parts, 0),
            origin_branch: field(parts, 2),
            lot: field(parts, 3),
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

#[cfg(test)]
mod tests {
    use crate::parsers::{StatementParser, parse_statement_text};
    use crate::types::{AmountColumn, ParserOptions};
    use conciliar_core::{Direction, TaxIdKind};

    const EXPORT: &str = r#"
BANCO DO BRASIL  Extrato de conta corrente
Agencia 1234-5  Conta 99999-9

Dt. balancete  Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$
----------------------------------------------------------------------------
01/03/2024  01/03/2024  0000  00000  000  0  1.000,00 C
            Saldo Anterior
02/03/2024  02/03/2024  0000  00000  000  0  1.000,00 C
            S A L D O
04/03/2024  04/03/2024  0001  14397  9903  150,00 C
            04/03 10:15 12345678901 JOAO DA SILVA
05/03/2024  05/03/2024  0001  13105  1  1.234,56 D

            Pagamento Boleto
06/03/2024  06/03/2024  0001  99015  77  50,00 D
07/03/2024  07/03/2024  0001  14397  78  20,00 C
            Maria Souza Lima
Lançamentos futuros
08/03/2024  08/03/2024  0001  14397  79  999,00 C
            Futuro
"#;

    #[test]
    fn test_two_line_records() {
        let records = parse_statement_text(EXPORT, &ParserOptions::default()).unwrap();
        assert_eq!(records.len(), 4);

        let joao = &records[0];
        assert_eq!(joao.movement_date, "04/03/2024");
        assert_eq!(joao.origin_branch, "0001");
        assert_eq!(joao.lot, "14397");
        assert_eq!(joao.document_ref, "9903");
        assert_eq!(joao.amount, "150,00");
        assert_eq!(joao.direction, Direction::Credit);
        assert_eq!(joao.narration, "04/03 10:15 12345678901 JOAO DA SILVA");
        assert_eq!(joao.tax_id.as_deref(), Some("12345678901"));
        assert_eq!(joao.tax_id_kind, Some(TaxIdKind::Cpf));

        let boleto = &records[1];
        assert_eq!(boleto.amount, "1.234,56");
        assert_eq!(boleto.direction, Direction::Debit);
        assert_eq!(boleto.narration, "Pagamento Boleto");
        assert!(boleto.counterparty_name_guess.is_none());

        // no narration line: the next movement is not swallowed
        assert_eq!(records[2].narration, "");
        assert_eq!(records[2].direction, Direction::Debit);
        assert_eq!(records[3].narration, "Maria Souza Lima");
    }

    #[test]
    fn test_amount_column_from_end() {
        let text = "Dt. balancete  Dt. movimento  Ag. origem  Lote  Histórico  Documento  Valor R$  Saldo\n\
                    04/03/2024  04/03/2024  0001  14397  9903  150,00 C  1.150,00 C\n\
                    Pix recebido\n";
        let last = parse_statement_text(text, &ParserOptions::default()).unwrap();
        assert_eq!(last[0].amount, "1.150,00");

        let options = ParserOptions { amount_column: AmountColumn::FromEnd(2) };
        let second = StatementParser::new(options).unwrap().parse(text);
        assert_eq!(second[0].amount, "150,00");

        let options = ParserOptions { amount_column: AmountColumn::FromEnd(5) };
        let fallback = StatementParser::new(options).unwrap().parse(text);
        assert_eq!(fallback[0].amount, "150,00");
    }
}
