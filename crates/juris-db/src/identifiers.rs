//! SQL identifier validation.
//!
//! Table and column names reach SQL text (they cannot be bound as
//! parameters), so every name the store interpolates must pass
//! [`validate_identifier`] first.

use juris_core::{Error, Result};

/// PostgreSQL's identifier length limit.
const MAX_IDENTIFIER_LEN: usize = 63;

const RESERVED: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "table", "from", "where", "union", "grant",
    "pg_catalog", "information_schema",
];

/// Validate a table or column name for interpolation into SQL.
///
/// Names must be 1-63 characters of lowercase ASCII letters, digits and
/// underscores, must not start with a digit, and must not be a keyword.
///
/// ```
/// use juris_db::validate_identifier;
///
/// assert!(validate_identifier("etiqueta_vinculos").is_ok());
/// assert!(validate_identifier("1contatos").is_err());
/// assert!(validate_identifier("contatos; drop table x").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("Identifier cannot be empty".to_string()));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Identifier exceeds {} character limit: {}",
            MAX_IDENTIFIER_LEN,
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_lowercase() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier must start with a lowercase letter or underscore: '{}'",
                name
            )));
        }
    }

    if let Some(ch) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '_')
    {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' contains invalid character '{}'",
            name, ch
        )));
    }

    if RESERVED.contains(&name) {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' is a reserved word",
            name
        )));
    }

    Ok(())
}

/// Validate several identifiers, failing on the first bad one.
pub fn validate_identifiers<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    names.into_iter().try_for_each(validate_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["contatos", "cpf_cnpj", "_interno", "campo2", "etiqueta_vinculos"] {
            assert!(validate_identifier(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in ["", "Contatos", "2campo", "nome-fantasia", "a b", "x\"y", "select"] {
            assert!(validate_identifier(name).is_err(), "{} should be invalid", name);
        }
    }

    #[test]
    fn test_length_limit() {
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_identifiers_stops_on_first_error() {
        assert!(validate_identifiers(["nome", "email"]).is_ok());
        assert!(validate_identifiers(["nome", "e-mail"]).is_err());
    }
}
