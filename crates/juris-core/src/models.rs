//! Tag ("etiqueta") data model.
//!
//! Tags classify heterogeneous back-office entities through a single
//! polymorphic association table. The association's discriminator is the
//! [`EntityKind`] enum, so a typo in an entity kind is a compile error rather
//! than an empty result set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::store::Record;

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// Kind of entity a tag can be attached to (`referencia_tipo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Contact (client, counterpart, supplier).
    #[serde(rename = "contato")]
    Contato,
    /// Legal case.
    #[serde(rename = "processo")]
    Processo,
    /// Calendar event.
    #[serde(rename = "agendas")]
    Agenda,
    /// Financial transaction.
    #[serde(rename = "transacao")]
    Transacao,
    /// Inventory item.
    #[serde(rename = "produto")]
    Produto,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Contato,
        EntityKind::Processo,
        EntityKind::Agenda,
        EntityKind::Transacao,
        EntityKind::Produto,
    ];

    /// Discriminator string persisted in `referencia_tipo`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contato => "contato",
            Self::Processo => "processo",
            Self::Agenda => "agendas",
            Self::Transacao => "transacao",
            Self::Produto => "produto",
        }
    }

    /// Functional module whose screens list this kind of entity.
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::Contato => "contatos",
            Self::Processo => "processos",
            Self::Agenda => "agenda",
            Self::Transacao => "financeiro",
            Self::Produto => "estoque",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    /// Accepts the stored name or the module name (`"contatos"`, `"agenda"`).
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name || k.module_name() == name)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity kind: {}", s)))
    }
}

// =============================================================================
// OWNERSHIP
// =============================================================================

/// Tenant and acting user an operation is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
}

impl Owner {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

// =============================================================================
// TAGS
// =============================================================================

/// A named, coloured, optionally module-scoped label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Etiqueta {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub nome: String,
    pub cor: String,
    pub icone: String,
    #[serde(default)]
    pub descricao: Option<String>,
    /// Free-text grouping key (kanban stages use one group per funnel).
    #[serde(default)]
    pub grupo: Option<String>,
    /// Modules the tag is visible in; empty means every module.
    #[serde(default)]
    pub escopo_modulos: BTreeSet<String>,
    pub ativa: bool,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Etiqueta {
    /// True when the tag is visible in every module.
    pub fn is_global(&self) -> bool {
        self.escopo_modulos.is_empty()
    }

    /// Serialize into a store record.
    pub fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Internal(format!(
                "Etiqueta serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Deserialize from a store record.
    pub fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(record))?)
    }
}

/// Input for creating a tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtiquetaDraft {
    pub nome: String,
    #[serde(default)]
    pub cor: Option<String>,
    #[serde(default)]
    pub icone: Option<String>,
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub grupo: Option<String>,
    #[serde(default)]
    pub escopo_modulos: BTreeSet<String>,
    #[serde(default)]
    pub ativa: Option<bool>,
}

impl EtiquetaDraft {
    pub fn new(nome: impl Into<String>) -> Self {
        Self {
            nome: nome.into(),
            ..Default::default()
        }
    }

    pub fn with_cor(mut self, cor: impl Into<String>) -> Self {
        self.cor = Some(cor.into());
        self
    }

    pub fn with_grupo(mut self, grupo: impl Into<String>) -> Self {
        self.grupo = Some(grupo.into());
        self
    }

    /// Restrict the tag to a module (repeatable).
    pub fn scoped_to(mut self, module: impl Into<String>) -> Self {
        self.escopo_modulos.insert(module.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.ativa = Some(false);
        self
    }

    /// Validate and turn the draft into a tag owned by `owner`.
    pub fn into_etiqueta(self, owner: &Owner) -> Result<Etiqueta> {
        let nome = validate_nome(&self.nome)?;
        let cor = match self.cor {
            Some(c) if c.trim().is_empty() => {
                return Err(Error::Validation("cor must not be blank".to_string()))
            }
            Some(c) => c.trim().to_string(),
            None => defaults::TAG_COLOR.to_string(),
        };
        let icone = self
            .icone
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| defaults::TAG_ICON.to_string());

        Ok(Etiqueta {
            id: Uuid::now_v7(),
            tenant_id: owner.tenant_id,
            nome,
            cor,
            icone,
            descricao: clean_optional(self.descricao),
            grupo: clean_optional(self.grupo),
            escopo_modulos: validate_modules(self.escopo_modulos)?,
            ativa: self.ativa.unwrap_or(true),
            created_by: owner.user_id,
            created_at: Utc::now(),
        })
    }
}

/// Partial update of a tag. `descricao`/`grupo` use a nested option so a
/// patch can clear them (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtiquetaPatch {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cor: Option<String>,
    #[serde(default)]
    pub icone: Option<String>,
    #[serde(default)]
    pub descricao: Option<Option<String>>,
    #[serde(default)]
    pub grupo: Option<Option<String>>,
    #[serde(default)]
    pub escopo_modulos: Option<BTreeSet<String>>,
    #[serde(default)]
    pub ativa: Option<bool>,
}

impl EtiquetaPatch {
    /// Apply the patch, validating the resulting tag.
    pub fn apply_to(self, mut etiqueta: Etiqueta) -> Result<Etiqueta> {
        if let Some(nome) = self.nome {
            etiqueta.nome = validate_nome(&nome)?;
        }
        if let Some(cor) = self.cor {
            if cor.trim().is_empty() {
                return Err(Error::Validation("cor must not be blank".to_string()));
            }
            etiqueta.cor = cor.trim().to_string();
        }
        if let Some(icone) = self.icone {
            let icone = icone.trim();
            etiqueta.icone = if icone.is_empty() {
                defaults::TAG_ICON.to_string()
            } else {
                icone.to_string()
            };
        }
        if let Some(descricao) = self.descricao {
            etiqueta.descricao = clean_optional(descricao);
        }
        if let Some(grupo) = self.grupo {
            etiqueta.grupo = clean_optional(grupo);
        }
        if let Some(modulos) = self.escopo_modulos {
            etiqueta.escopo_modulos = validate_modules(modulos)?;
        }
        if let Some(ativa) = self.ativa {
            etiqueta.ativa = ativa;
        }
        Ok(etiqueta)
    }
}

fn validate_nome(nome: &str) -> Result<String> {
    let trimmed = nome.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("nome must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_modules(modules: BTreeSet<String>) -> Result<BTreeSet<String>> {
    modules
        .into_iter()
        .map(|m| {
            let m = m.trim().to_string();
            if m.is_empty() {
                Err(Error::Validation(
                    "escopo_modulos must not contain blank module names".to_string(),
                ))
            } else {
                Ok(m)
            }
        })
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// VINCULOS
// =============================================================================

/// Link row associating one tag with one (entity kind, entity id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vinculo {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub etiqueta_id: Uuid,
    pub referencia_tipo: EntityKind,
    pub referencia_id: Uuid,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Vinculo {
    pub fn new(owner: &Owner, etiqueta_id: Uuid, kind: EntityKind, referencia_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: owner.tenant_id,
            etiqueta_id,
            referencia_tipo: kind,
            referencia_id,
            created_by: owner.user_id,
            created_at: Utc::now(),
        }
    }

    /// The logical identity of the link.
    pub fn key(&self) -> (Uuid, EntityKind, Uuid) {
        (self.etiqueta_id, self.referencia_tipo, self.referencia_id)
    }

    pub fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Internal(format!(
                "Vinculo serialized to non-object: {}",
                other
            ))),
        }
    }

    pub fn from_record(record: Record) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(record))?)
    }
}

// =============================================================================
// RESOLVED ENTITY VIEW
// =============================================================================

/// A domain entity type that can carry tags.
pub trait Taggable {
    /// Discriminator used for this type's vinculos.
    const KIND: EntityKind;

    /// Identifier used as `referencia_id`.
    fn entity_id(&self) -> Uuid;
}

/// Read-time projection of an entity enriched with its tags. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged<T> {
    #[serde(flatten)]
    pub entity: T,
    pub etiquetas: Vec<Etiqueta>,
}

impl<T> Tagged<T> {
    pub fn new(entity: T, etiquetas: Vec<Etiqueta>) -> Self {
        Self { entity, etiquetas }
    }

    /// Ids of the attached tags.
    pub fn etiqueta_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.etiquetas.iter().map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner::new(Uuid::nil())
    }

    #[test]
    fn test_entity_kind_round_trip_strings() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn test_entity_kind_parses_module_names() {
        assert_eq!("Contatos".parse::<EntityKind>().unwrap(), EntityKind::Contato);
        assert_eq!("agenda".parse::<EntityKind>().unwrap(), EntityKind::Agenda);
        assert_eq!(" financeiro ".parse::<EntityKind>().unwrap(), EntityKind::Transacao);
        assert_eq!("estoque".parse::<EntityKind>().unwrap(), EntityKind::Produto);
    }

    #[test]
    fn test_entity_kind_rejects_unknown() {
        let err = "contatos_x".parse::<EntityKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_draft_applies_defaults() {
        let tag = EtiquetaDraft::new("  VIP ").into_etiqueta(&owner()).unwrap();
        assert_eq!(tag.nome, "VIP");
        assert_eq!(tag.cor, defaults::TAG_COLOR);
        assert_eq!(tag.icone, defaults::TAG_ICON);
        assert!(tag.ativa);
        assert!(tag.is_global());
    }

    #[test]
    fn test_draft_rejects_blank_name() {
        let err = EtiquetaDraft::new("   ").into_etiqueta(&owner()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_draft_rejects_blank_module() {
        let err = EtiquetaDraft::new("Urgente")
            .scoped_to(" ")
            .into_etiqueta(&owner())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_patch_clears_optional_fields() {
        let tag = EtiquetaDraft::new("Lead")
            .with_grupo("funil")
            .into_etiqueta(&owner())
            .unwrap();
        let patched = EtiquetaPatch {
            grupo: Some(None),
            ativa: Some(false),
            ..Default::default()
        }
        .apply_to(tag.clone())
        .unwrap();
        assert_eq!(patched.grupo, None);
        assert!(!patched.ativa);
        assert_eq!(patched.id, tag.id);
    }

    #[test]
    fn test_patch_rejects_blank_name() {
        let tag = EtiquetaDraft::new("Lead").into_etiqueta(&owner()).unwrap();
        let err = EtiquetaPatch {
            nome: Some("".to_string()),
            ..Default::default()
        }
        .apply_to(tag)
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_etiqueta_record_round_trip() {
        let tag = EtiquetaDraft::new("Cliente")
            .scoped_to("contatos")
            .into_etiqueta(&owner())
            .unwrap();
        let record = tag.to_record().unwrap();
        assert_eq!(record["nome"], "Cliente");
        assert_eq!(Etiqueta::from_record(record).unwrap(), tag);
    }

    #[test]
    fn test_vinculo_record_uses_discriminator() {
        let v = Vinculo::new(&owner(), Uuid::new_v4(), EntityKind::Agenda, Uuid::new_v4());
        let record = v.to_record().unwrap();
        assert_eq!(record["referencia_tipo"], "agendas");
        assert_eq!(Vinculo::from_record(record).unwrap(), v);
    }
}
