//! Import target schemas.
//!
//! A [`TargetSchema`] names the table a spreadsheet is imported into, the
//! fields a column can be mapped to and how each field's cells are coerced,
//! the name-equivalent field every mapping must cover, the natural key used
//! for duplicate detection, and defaults for unset fields.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use juris_core::{EntityKind, Error, Record, Result};
use juris_db::validate_identifier;

use crate::coerce::FieldKind;

/// One importable column of the target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetField {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSchema {
    /// Table the records are inserted into.
    pub table: String,
    /// Kind used when attaching tags to the inserted records.
    pub entity_kind: EntityKind,
    /// Field every mapping must cover; rows without it are rejected.
    pub name_field: String,
    /// Field compared (digits only) against existing records.
    pub natural_key: Option<String>,
    pub fields: Vec<TargetField>,
    /// Values applied to fields the row left unset.
    #[serde(default)]
    pub defaults: Record,
}

impl TargetSchema {
    /// Start a schema whose name-equivalent field is a text column.
    pub fn new(table: impl Into<String>, entity_kind: EntityKind, name_field: &str) -> Self {
        Self {
            table: table.into(),
            entity_kind,
            name_field: name_field.to_string(),
            natural_key: None,
            fields: vec![TargetField {
                name: name_field.to_string(),
                kind: FieldKind::Text,
            }],
            defaults: Record::new(),
        }
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.fields.push(TargetField {
                name: name.to_string(),
                kind,
            }),
        }
        self
    }

    /// Declare the duplicate-detection key (added as a digits field).
    pub fn natural_key(mut self, name: &str) -> Self {
        self = self.field(name, FieldKind::Digits);
        self.natural_key = Some(name.to_string());
        self
    }

    pub fn default_value(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.defaults.insert(name.to_string(), value.into());
        self
    }

    /// Contacts: clients, counterparts and suppliers.
    pub fn contatos() -> Self {
        Self::new("contatos", EntityKind::Contato, "nome")
            .field("nome_fantasia", FieldKind::Text)
            .natural_key("cpf_cnpj")
            .field("email", FieldKind::Text)
            .field("telefone", FieldKind::Text)
            .field("celular", FieldKind::Text)
            .field("data_nascimento", FieldKind::Date)
            .field("endereco", FieldKind::Text)
            .field("cidade", FieldKind::Text)
            .field("estado", FieldKind::Text)
            .field("cep", FieldKind::Digits)
            .field("observacoes", FieldKind::Text)
            .field("ativo", FieldKind::Boolean)
            .default_value("ativo", true)
    }

    /// Legal cases, keyed by their CNJ number.
    pub fn processos() -> Self {
        Self::new("processos", EntityKind::Processo, "titulo")
            .natural_key("numero_processo")
            .field("cliente_nome", FieldKind::Text)
            .field("vara", FieldKind::Text)
            .field("comarca", FieldKind::Text)
            .field("area", FieldKind::Text)
            .field("status", FieldKind::Text)
            .field("valor_causa", FieldKind::Currency)
            .field("data_distribuicao", FieldKind::Date)
            .field("observacoes", FieldKind::Text)
            .default_value("status", "ativo")
    }

    /// Financial transactions. No natural key: repeated lines are legitimate.
    pub fn transacoes() -> Self {
        Self::new("transacoes", EntityKind::Transacao, "descricao")
            .field("tipo", FieldKind::Text)
            .field("valor", FieldKind::Currency)
            .field("categoria", FieldKind::Text)
            .field("cpf_cnpj", FieldKind::Digits)
            .field("parcelas", FieldKind::Integer)
            .field("data_vencimento", FieldKind::Date)
            .field("data_pagamento", FieldKind::Date)
            .field("pago", FieldKind::Boolean)
            .field("observacoes", FieldKind::Text)
            .default_value("tipo", "receita")
            .default_value("pago", false)
    }

    /// Built-in schema for `table`.
    pub fn for_table(table: &str) -> Result<Self> {
        match table.trim().to_lowercase().as_str() {
            "contatos" => Ok(Self::contatos()),
            "processos" => Ok(Self::processos()),
            "transacoes" | "financeiro" => Ok(Self::transacoes()),
            other => Err(Error::InvalidInput(format!(
                "No import schema for table '{}' (expected contatos, processos or transacoes)",
                other
            ))),
        }
    }

    /// Field names in declaration order, as offered to the mapping UI.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Check that every name is a valid identifier and that the name field,
    /// natural key and defaults refer to declared fields.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        for f in &self.fields {
            validate_identifier(&f.name)?;
        }
        let declared = |name: &str| self.fields.iter().any(|f| f.name == name);
        if !declared(&self.name_field) {
            return Err(Error::Config(format!(
                "name field '{}' is not a field of {}",
                self.name_field, self.table
            )));
        }
        if let Some(key) = self.natural_key.as_deref().filter(|k| !declared(k)) {
            return Err(Error::Config(format!(
                "natural key '{}' is not a field of {}",
                key, self.table
            )));
        }
        if let Some(name) = self.defaults.keys().find(|k| !declared(k)) {
            return Err(Error::Config(format!(
                "default for unknown field '{}' in {}",
                name, self.table
            )));
        }
        Ok(())
    }
}
