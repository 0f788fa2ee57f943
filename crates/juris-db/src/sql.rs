//! SQL generation for the PostgreSQL record store.
//!
//! Predicates render to parameterized WHERE fragments; values are always
//! bound, never interpolated. UUID predicates bind `uuid` parameters against
//! the bare column so the tenant and link indexes apply. Generic `Eq`/`In`
//! compare through a `::text` cast, matching [`Predicate::matches`] in
//! memory; on `text` columns the cast is a no-op for the planner.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use juris_core::{Predicate, Result};

use crate::identifiers::{validate_identifier, validate_identifiers};

/// Type-safe parameter binding for generated statements.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Single text parameter.
    Text(String),
    /// Array of text values (for `= ANY(...)`).
    TextArray(Vec<String>),
    /// Single UUID parameter.
    Uuid(Uuid),
    /// Array of UUIDs (for `= ANY(...)`).
    UuidArray(Vec<Uuid>),
}

fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Renders a [`Predicate`] into a WHERE fragment over alias `t`.
pub struct PredicateSqlBuilder<'a> {
    predicate: &'a Predicate,
    param_offset: usize,
}

impl<'a> PredicateSqlBuilder<'a> {
    /// `param_offset` is the number of parameters already in the statement.
    pub fn new(predicate: &'a Predicate, param_offset: usize) -> Self {
        Self {
            predicate,
            param_offset,
        }
    }

    /// Build the fragment and its parameters in placeholder order.
    pub fn build(&self) -> Result<(String, Vec<QueryParam>)> {
        validate_identifiers(self.predicate.fields())?;
        let mut params = Vec::new();
        let sql = self.render(self.predicate, &mut params);
        Ok((sql, params))
    }

    fn render(&self, predicate: &Predicate, params: &mut Vec<QueryParam>) -> String {
        match predicate {
            Predicate::All => "TRUE".to_string(),
            Predicate::Eq(field, value) => match as_text(value) {
                Some(text) => {
                    params.push(QueryParam::Text(text));
                    format!("t.{}::text = ${}", field, self.param_offset + params.len())
                }
                None => "FALSE".to_string(),
            },
            Predicate::In(field, values) => {
                let texts: Vec<String> = values.iter().filter_map(as_text).collect();
                if texts.is_empty() {
                    return "FALSE".to_string();
                }
                params.push(QueryParam::TextArray(texts));
                format!(
                    "t.{}::text = ANY(${}::text[])",
                    field,
                    self.param_offset + params.len()
                )
            }
            Predicate::IdEq(field, id) => {
                params.push(QueryParam::Uuid(*id));
                format!("t.{} = ${}", field, self.param_offset + params.len())
            }
            Predicate::IdIn(field, ids) => {
                if ids.is_empty() {
                    return "FALSE".to_string();
                }
                params.push(QueryParam::UuidArray(ids.clone()));
                format!(
                    "t.{} = ANY(${}::uuid[])",
                    field,
                    self.param_offset + params.len()
                )
            }
            Predicate::And(parts) if parts.is_empty() => "TRUE".to_string(),
            Predicate::And(parts) => {
                let clauses: Vec<String> =
                    parts.iter().map(|p| self.render(p, params)).collect();
                format!("({})", clauses.join(" AND "))
            }
        }
    }
}

/// `SELECT to_jsonb(t) ...` for `table` filtered by `predicate`.
pub fn select_statement(table: &str, predicate: &Predicate) -> Result<(String, Vec<QueryParam>)> {
    validate_identifier(table)?;
    let (clause, params) = PredicateSqlBuilder::new(predicate, 0).build()?;
    Ok((
        format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE {}",
            table, clause
        ),
        params,
    ))
}

/// `DELETE ...` for `table` filtered by `predicate`.
pub fn delete_statement(table: &str, predicate: &Predicate) -> Result<(String, Vec<QueryParam>)> {
    validate_identifier(table)?;
    let (clause, params) = PredicateSqlBuilder::new(predicate, 0).build()?;
    Ok((format!("DELETE FROM {} t WHERE {}", table, clause), params))
}

/// Bulk insert from a JSON array bound as `$1`. Only `columns` are written,
/// so table defaults apply to everything else.
pub fn insert_statement(table: &str, columns: &[String]) -> Result<String> {
    validate_identifier(table)?;
    validate_identifiers(columns.iter().map(String::as_str))?;
    let cols = columns.join(", ");
    Ok(format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM jsonb_populate_recordset(NULL::{table}, $1)",
        table = table,
        cols = cols
    ))
}

/// Overwrite `columns` of the row whose id is `$2` from the JSON object `$1`.
pub fn replace_statement(table: &str, columns: &[String]) -> Result<String> {
    validate_identifier(table)?;
    validate_identifiers(columns.iter().map(String::as_str))?;
    let cols = columns.join(", ");
    Ok(format!(
        "UPDATE {table} SET ({cols}) = (SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1)) WHERE id = $2",
        table = table,
        cols = cols
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_renders_true() {
        let (sql, params) = PredicateSqlBuilder::new(&Predicate::All, 0).build().unwrap();
        assert_eq!(sql, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_and_numbers_placeholders_in_order() {
        let p = Predicate::eq("tenant_id", "t1").and(Predicate::is_in("referencia_id", ["a", "b"]));
        let (sql, params) = PredicateSqlBuilder::new(&p, 1).build().unwrap();
        assert_eq!(
            sql,
            "(t.tenant_id::text = $2 AND t.referencia_id::text = ANY($3::text[]))"
        );
        assert_eq!(
            params,
            vec![
                QueryParam::Text("t1".into()),
                QueryParam::TextArray(vec!["a".into(), "b".into()])
            ]
        );
    }

    #[test]
    fn test_id_predicates_bind_uuids_without_casting_the_column() {
        let tenant = Uuid::new_v4();
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let p = Predicate::id_eq("tenant_id", tenant)
            .and(Predicate::eq("referencia_tipo", "contato"))
            .and(Predicate::id_in("referencia_id", &ids));
        let (sql, params) = PredicateSqlBuilder::new(&p, 0).build().unwrap();
        assert_eq!(
            sql,
            "(t.tenant_id = $1 AND t.referencia_tipo::text = $2 AND t.referencia_id = ANY($3::uuid[]))"
        );
        assert_eq!(
            params,
            vec![
                QueryParam::Uuid(tenant),
                QueryParam::Text("contato".into()),
                QueryParam::UuidArray(ids)
            ]
        );
        assert!(!sql.contains("_id::text"));
    }

    #[test]
    fn test_null_and_empty_in_render_false() {
        let p = Predicate::Eq("cpf_cnpj".into(), JsonValue::Null);
        assert_eq!(PredicateSqlBuilder::new(&p, 0).build().unwrap().0, "FALSE");
        let p = Predicate::In("id".into(), vec![]);
        assert_eq!(PredicateSqlBuilder::new(&p, 0).build().unwrap().0, "FALSE");
        let p = Predicate::IdIn("id".into(), vec![]);
        assert_eq!(PredicateSqlBuilder::new(&p, 0).build().unwrap().0, "FALSE");
    }

    #[test]
    fn test_numbers_bind_as_text() {
        let p = Predicate::eq("codigo", json!(42));
        let (_, params) = PredicateSqlBuilder::new(&p, 0).build().unwrap();
        assert_eq!(params, vec![QueryParam::Text("42".into())]);
    }

    #[test]
    fn test_rejects_bad_column() {
        let p = Predicate::eq("nome; drop table etiquetas", "x");
        assert!(PredicateSqlBuilder::new(&p, 0).build().is_err());
    }

    #[test]
    fn test_statements() {
        let (sql, _) = select_statement("etiquetas", &Predicate::All).unwrap();
        assert_eq!(sql, "SELECT to_jsonb(t) AS row FROM etiquetas t WHERE TRUE");

        let (sql, _) = delete_statement(
            "etiqueta_vinculos",
            &Predicate::id_eq("etiqueta_id", Uuid::nil()),
        )
        .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM etiqueta_vinculos t WHERE t.etiqueta_id = $1"
        );

        let sql = insert_statement("contatos", &["id".to_string(), "nome".to_string()]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO contatos (id, nome) SELECT id, nome FROM jsonb_populate_recordset(NULL::contatos, $1)"
        );

        assert!(insert_statement("Contatos", &[]).is_err());
    }
}
