//! Identity-hint extractor: CPF/CNPJ and payer/payee names from narration text.
//!
//! Typical narrations after the bank's own timestamp prefix:
//!   12/03 14:22 12345678901 JOAO DA SILVA
//!   12.345.678/0001-90 PAPELARIA CENTRAL LTDA
//!   Maria Souza Lima

use conciliar_core::{Result, TaxIdKind, digits_only, normalize_field};
use regex::Regex;

use crate::types::IdentityHint;

/// Leading words that mark a narration as a bank description, not a name.
const DESCRIPTIVE_PREFIXES: [&str; 7] = [
    "tar.",
    "rende",
    "tarifa",
    "pagamento",
    "transferencia",
    "saldo",
    "lancamento",
];

pub struct IdentityExtractor {
    full_timestamp_re: Regex,
    short_timestamp_re: Regex,
    raw_digits_re: Regex,
    punctuated_re: Regex,
    name_re: Regex,
}

impl IdentityExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            full_timestamp_re: compile(r"^\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}(?::\d{2})?\s+")?,
            short_timestamp_re: compile(r"^\d{2}/\d{2}\s+\d{2}:\d{2}\s+")?,
            raw_digits_re: compile(r"^(?P<digits>[0-9]{11,14})\s+(?P<name>.+)$")?,
            punctuated_re: compile(r"^(?P<token>[\d./\-]+)\s+(?P<name>\p{Lu}.+)$")?,
            name_re: compile(r"^\p{Lu}\p{L}+(?:\s+\p{Lu}[\p{L}.]*)+$")?,
        })
    }

    pub fn extract(&self, narration: &str) -> IdentityHint {
        let text = self.full_timestamp_re.replace(narration.trim(), "");
        let text = self.short_timestamp_re.replace(&text, "");
        let text = text.trim();

        if let Some(caps) = self.raw_digits_re.captures(text) {
            let digits = &caps["digits"];
            let name = Some(caps["name"].trim().to_string());
            if is_cnpj(digits) {
                return hint(digits.to_string(), TaxIdKind::Cnpj, name);
            }
            return hint(last_eleven(digits), TaxIdKind::Cpf, name);
        }

        if let Some(caps) = self.punctuated_re.captures(text) {
            let token = &caps["token"];
            let name = Some(caps["name"].trim().to_string());
            let digits = digits_only(token);
            return match digits.len() {
                14 if is_cnpj(&digits) => hint(token.to_string(), TaxIdKind::Cnpj, name),
                14 => hint(last_eleven(&digits), TaxIdKind::Cpf, name),
                11 => hint(token.to_string(), TaxIdKind::Cpf, name),
                _ => IdentityHint { name, ..Default::default() },
            };
        }

        if self.name_re.is_match(text) && !is_descriptive(text) {
            return IdentityHint {
                name: Some(text.to_string()),
                ..Default::default()
            };
        }

        IdentityHint::default()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| conciliar_core::Error::Parse(e.to_string()))
}

fn hint(tax_id: String, kind: TaxIdKind, name: Option<String>) -> IdentityHint {
    IdentityHint {
        tax_id: Some(tax_id),
        tax_id_kind: Some(kind),
        name,
    }
}

/// 14 digits whose 9th-11th digits are the `000` branch block.
fn is_cnpj(digits: &str) -> bool {
    digits.len() == 14 && digits.get(8..11) == Some("000")
}

fn last_eleven(digits: &str) -> String {
    let skip = digits.len().saturating_sub(11);
    digits[skip..].to_string()
}

fn is_descriptive(text: &str) -> bool {
    let folded = normalize_field(text);
    DESCRIPTIVE_PREFIXES.iter().any(|p| folded.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(s: &str) -> IdentityHint {
        IdentityExtractor::new().unwrap().extract(s)
    }

    #[test]
    fn test_raw_cpf() {
        let h = extract("12345678901 JOAO DA SILVA");
        assert_eq!(h.tax_id.as_deref(), Some("12345678901"));
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cpf));
        assert_eq!(h.name.as_deref(), Some("JOAO DA SILVA"));
    }

    #[test]
    fn test_raw_cnpj_needs_000_block() {
        let h = extract("12345678000190 PAPELARIA CENTRAL");
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cnpj));
        assert_eq!(h.tax_id.as_deref(), Some("12345678000190"));

        // 14 digits without the block: CPF, last 11 kept
        let h = extract("00012345678901 JOAO DA SILVA");
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cpf));
        assert_eq!(h.tax_id.as_deref(), Some("12345678901"));
    }

    #[test]
    fn test_longer_runs_truncate_from_left() {
        for prefix in ["9", "98", "987"] {
            let h = extract(&format!("{prefix}12345678901 MARIA"));
            assert_eq!(h.tax_id.as_deref(), Some("12345678901"), "prefix {prefix}");
            assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cpf));
        }
    }

    #[test]
    fn test_timestamp_prefix_is_stripped() {
        let h = extract("12/03 14:22 12345678901 JOAO");
        assert_eq!(h.tax_id.as_deref(), Some("12345678901"));

        let h = extract("12/03/2024 14:22:10 12345678000190 EMPRESA X");
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cnpj));
    }

    #[test]
    fn test_punctuated_ids_keep_original_text() {
        let h = extract("12.345.678/0001-90 PAPELARIA CENTRAL");
        assert_eq!(h.tax_id.as_deref(), Some("12.345.678/0001-90"));
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cnpj));

        let h = extract("123.456.789-01 João Silva");
        assert_eq!(h.tax_id.as_deref(), Some("123.456.789-01"));
        assert_eq!(h.tax_id_kind, Some(TaxIdKind::Cpf));
        assert_eq!(h.name.as_deref(), Some("João Silva"));
    }

    #[test]
    fn test_punctuated_unknown_length_is_name_only() {
        let h = extract("05/02 MERCADINHO BOM PRECO");
        assert_eq!(h.tax_id, None);
        assert_eq!(h.name.as_deref(), Some("MERCADINHO BOM PRECO"));
    }

    #[test]
    fn test_bare_names() {
        let h = extract("Maria Souza Lima");
        assert_eq!(h.name.as_deref(), Some("Maria Souza Lima"));
        assert_eq!(h.tax_id, None);

        assert!(extract("Tarifa Pacote Servicos").is_empty());
        assert!(extract("Transferência Recebida").is_empty());
        assert!(extract("Pagamento Boleto").is_empty());
        assert!(extract("pix recebido").is_empty());
        assert!(extract("Juros").is_empty());
    }
}
