//! Cell value coercion for Brazilian back-office spreadsheets.
//!
//! Every coercion is total: a value that cannot be read as the target kind
//! becomes JSON `null`, and the required-field check decides whether that
//! rejects the row.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

use crate::sheet::Cell;

/// How a target field interprets its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed text.
    Text,
    /// `sim`/`não`, `1`/`0`, `x`, `true`/`false`, …
    Boolean,
    /// Amount such as `R$ 1.234,56`, stored with two decimals.
    Currency,
    Integer,
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// Digits only: CPF/CNPJ, CEP, CNJ case numbers.
    Digits,
}

/// Excel's day zero (serial 1 is 1899-12-31 in the 1900 leap-bug system,
/// so counting from the 30th lines serials up with real dates after March
/// 1900).
fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Largest serial Excel accepts (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

fn day_first_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2}|\d{4})$").ok())
        .as_ref()
}

fn year_first_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})$").ok())
        .as_ref()
}

/// Coerce one cell to `kind`. Empty cells and unreadable values give `null`.
pub fn coerce(kind: FieldKind, cell: &Cell) -> JsonValue {
    if cell.is_empty() {
        return JsonValue::Null;
    }
    match kind {
        FieldKind::Text => cell
            .as_text()
            .map(|t| JsonValue::String(t.into_owned()))
            .unwrap_or(JsonValue::Null),
        FieldKind::Boolean => match cell {
            Cell::Bool(b) => JsonValue::Bool(*b),
            _ => cell
                .as_text()
                .and_then(|t| parse_bool(&t))
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
        },
        FieldKind::Currency => match cell {
            Cell::Number(n) => money(*n),
            _ => cell
                .as_text()
                .and_then(|t| parse_currency(&t))
                .map(money)
                .unwrap_or(JsonValue::Null),
        },
        FieldKind::Integer => match cell {
            Cell::Number(n) if n.fract() == 0.0 => JsonValue::from(*n as i64),
            Cell::Number(_) => JsonValue::Null,
            _ => cell
                .as_text()
                .and_then(|t| parse_integer(&t))
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        },
        FieldKind::Date => {
            let date = match cell {
                Cell::Number(n) => from_excel_serial(*n),
                _ => cell.as_text().and_then(|t| parse_date(&t)),
            };
            date.map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::Null)
        }
        FieldKind::Digits => cell
            .as_text()
            .map(|t| digits_only(&t))
            .filter(|d| !d.is_empty())
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

fn money(n: f64) -> JsonValue {
    Number::from_f64((n * 100.0).round() / 100.0)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Keep ASCII digits only.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Portuguese and English yes/no words.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "sim" | "s" | "1" | "true" | "yes" | "y" | "x" | "verdadeiro" | "ativo" => Some(true),
        "nao" | "não" | "n" | "0" | "false" | "no" | "falso" | "inativo" => Some(false),
        _ => None,
    }
}

/// Parse an amount written the Brazilian way (`R$ 1.234,56`), the English
/// way (`1234.56`) or with thousands dots only (`1.234.567`). Parentheses or
/// a leading `-` make it negative.
pub fn parse_currency(s: &str) -> Option<f64> {
    let mut t: String = s
        .trim()
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let mut negative = false;
    if t.starts_with('(') && t.ends_with(')') && t.len() > 2 {
        negative = true;
        t = t[1..t.len() - 1].to_string();
    }
    if let Some(rest) = t.strip_prefix('-') {
        negative = !negative;
        t = rest.to_string();
    }
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let normalized = if t.contains(',') {
        // Comma is the decimal separator; dots group thousands.
        if t.matches(',').count() > 1 {
            return None;
        }
        t.replace('.', "").replace(',', ".")
    } else if t.matches('.').count() > 1 || thousands_only(&t) {
        t.replace('.', "")
    } else {
        t
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// `1.234` reads as one thousand two hundred thirty-four: a single dot
/// followed by exactly three digits, not preceded by a lone zero.
fn thousands_only(t: &str) -> bool {
    match t.split_once('.') {
        Some((int, frac)) => frac.len() == 3 && !int.is_empty() && int != "0",
        None => false,
    }
}

/// Integer with optional thousands dots; `12,0`/`12.0` are accepted.
pub fn parse_integer(s: &str) -> Option<i64> {
    let t = s.trim();
    if let Ok(n) = t.parse::<i64>() {
        return Some(n);
    }
    let value = parse_currency(t)?;
    (value.fract() == 0.0).then_some(value as i64)
}

/// Excel serial date (days since 1899-12-30). Time of day is dropped.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    excel_epoch()?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year <= 68 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

/// Parse the date layouts found in exported spreadsheets: `dd/mm/yyyy`
/// (also with `-` or `.`, and two-digit years), `yyyy-mm-dd`, RFC 3339, an
/// optional trailing time, or a bare Excel serial.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.date_naive());
    }

    // Drop a trailing time ("31/12/2023 14:00", "2023-12-31T14:00").
    let date_part = t
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(t);

    if let Some(caps) = day_first_pattern().and_then(|re| re.captures(date_part)) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = year_first_pattern().and_then(|re| re.captures(date_part)) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if !date_part.is_empty() && date_part.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return date_part.parse::<f64>().ok().and_then(from_excel_serial);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_excel_serial_epoch() {
        assert_eq!(from_excel_serial(44562.0), Some(ymd(2022, 1, 1)));
        assert_eq!(from_excel_serial(44562.75), Some(ymd(2022, 1, 1)));
        assert_eq!(from_excel_serial(61.0), Some(ymd(1900, 3, 1)));
        assert_eq!(from_excel_serial(0.0), None);
        assert_eq!(from_excel_serial(-3.0), None);
    }

    #[test]
    fn test_date_cells() {
        assert_eq!(coerce(FieldKind::Date, &Cell::Number(44562.0)), json!("2022-01-01"));
        assert_eq!(coerce(FieldKind::Date, &Cell::text("44562")), json!("2022-01-01"));
        assert_eq!(coerce(FieldKind::Date, &Cell::text("31/12/2023")), json!("2023-12-31"));
        assert_eq!(coerce(FieldKind::Date, &Cell::text("não sei")), JsonValue::Null);
    }

    #[test]
    fn test_parse_date_layouts() {
        assert_eq!(parse_date("05/03/2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("5-3-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05.03.24"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("01/01/85"), Some(ymd(1985, 1, 1)));
        assert_eq!(parse_date("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05T10:00:00-03:00"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("05/03/2024 14:30"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("ontem"), None);
    }

    #[test]
    fn test_currency() {
        assert_eq!(parse_currency("R$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_currency("1234.56"), Some(1234.56));
        assert_eq!(parse_currency("1.234.567"), Some(1234567.0));
        assert_eq!(parse_currency("1.234"), Some(1234.0));
        assert_eq!(parse_currency("0.125"), Some(0.125));
        assert_eq!(parse_currency("-R$ 50,00"), Some(-50.0));
        assert_eq!(parse_currency("(10,5)"), Some(-10.5));
        assert_eq!(parse_currency("abc"), None);
        assert_eq!(parse_currency("1,2,3"), None);
        assert_eq!(coerce(FieldKind::Currency, &Cell::text("R$ 10,499")), json!(10.5));
    }

    #[test]
    fn test_booleans() {
        for yes in ["Sim", "S", "1", "true", "x"] {
            assert_eq!(coerce(FieldKind::Boolean, &Cell::text(yes)), json!(true), "{}", yes);
        }
        for no in ["não", "NAO", "n", "0", "false"] {
            assert_eq!(coerce(FieldKind::Boolean, &Cell::text(no)), json!(false), "{}", no);
        }
        assert_eq!(coerce(FieldKind::Boolean, &Cell::text("talvez")), JsonValue::Null);
    }

    #[test]
    fn test_integers_and_digits() {
        assert_eq!(coerce(FieldKind::Integer, &Cell::text("1.200")), json!(1200));
        assert_eq!(coerce(FieldKind::Integer, &Cell::Number(3.0)), json!(3));
        assert_eq!(coerce(FieldKind::Integer, &Cell::text("2,5")), JsonValue::Null);
        assert_eq!(
            coerce(FieldKind::Digits, &Cell::text("123.456.789-01")),
            json!("12345678901")
        );
        assert_eq!(coerce(FieldKind::Digits, &Cell::text("--")), JsonValue::Null);
    }

    #[test]
    fn test_text_trims_and_empty_is_null() {
        assert_eq!(coerce(FieldKind::Text, &Cell::text("  Ana ")), json!("Ana"));
        assert_eq!(coerce(FieldKind::Text, &Cell::Empty), JsonValue::Null);
        assert_eq!(coerce(FieldKind::Text, &Cell::Number(7.0)), json!("7"));
    }
}
