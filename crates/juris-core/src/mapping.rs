//! Spreadsheet column to entity field mapping.
//!
//! Suggestions are heuristic and always subject to manual override:
//!
//! 1. Synonym table lookup on the normalized header
//! 2. Exact match between normalized header and normalized field name
//! 3. Substring containment in either direction
//! 4. Unmapped (`""`)
//!
//! The synonym table is data ([`SynonymTable`], JSON-loadable), so it can be
//! extended per deployment without touching the import pipeline.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults::MIN_CONTAINMENT_LEN;
use crate::error::{Error, Result};

/// Target value meaning "do not import this column" (besides `""`).
pub const IGNORE_TARGET: &str = "none";

// =============================================================================
// FIELD MAPPING
// =============================================================================

/// One spreadsheet column mapped to one target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Header of the spreadsheet column.
    pub source_field: String,
    /// Target field; `""` or `"none"` skips the column.
    pub target_field: String,
    /// Used when the cell is empty.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Rows without a value for this field are rejected.
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            default_value: None,
            required: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether this row imports nothing.
    pub fn is_ignored(&self) -> bool {
        let target = self.target_field.trim();
        target.is_empty() || target.eq_ignore_ascii_case(IGNORE_TARGET)
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Canonical form of a header or field name: lowercase, Latin diacritics
/// folded, runs of anything non-alphanumeric collapsed to `_`.
///
/// ```
/// use juris_core::normalize_header;
///
/// assert_eq!(normalize_header(" CPF/CNPJ "), "cpf_cnpj");
/// assert_eq!(normalize_header("Razão Social"), "razao_social");
/// ```
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars().flat_map(char::to_lowercase).map(fold_diacritic) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

// =============================================================================
// SYNONYM TABLE
// =============================================================================

/// Normalized header to candidate target fields, first candidate present in
/// the target schema wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynonymTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl SynonymTable {
    /// Empty table (suggestions fall back to name matching only).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `header` (normalized on insert) as a synonym of `target`.
    pub fn insert(&mut self, header: &str, target: &str) {
        let candidates = self.entries.entry(normalize_header(header)).or_default();
        if !candidates.iter().any(|t| t == target) {
            candidates.push(target.to_string());
        }
    }

    pub fn with(mut self, header: &str, target: &str) -> Self {
        self.insert(header, target);
        self
    }

    /// Candidates for an already-normalized header.
    pub fn candidates(&self, normalized: &str) -> &[String] {
        self.entries
            .get(normalized)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load from JSON of the form `{"header": ["target", ...]}`. Keys are
    /// normalized on load.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut table = Self::empty();
        for (header, targets) in raw {
            for target in targets {
                table.insert(&header, &target);
            }
        }
        Ok(table)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Synonyms for the back-office entities (contacts, cases, transactions).
    pub fn backoffice() -> Self {
        const PAIRS: &[(&str, &str)] = &[
            ("cpf", "cpf_cnpj"),
            ("cnpj", "cpf_cnpj"),
            ("cpf/cnpj", "cpf_cnpj"),
            ("cnpj/cpf", "cpf_cnpj"),
            ("cpf ou cnpj", "cpf_cnpj"),
            ("documento", "cpf_cnpj"),
            ("doc", "cpf_cnpj"),
            ("fantasia", "nome_fantasia"),
            ("nome fantasia", "nome_fantasia"),
            ("razão social", "nome"),
            ("nome completo", "nome"),
            ("cliente", "nome"),
            ("e-mail", "email"),
            ("correio eletrônico", "email"),
            ("fone", "telefone"),
            ("tel", "telefone"),
            ("telefone fixo", "telefone"),
            ("cel", "celular"),
            ("whatsapp", "celular"),
            ("móvel", "celular"),
            ("nascimento", "data_nascimento"),
            ("dt nascimento", "data_nascimento"),
            ("data de nascimento", "data_nascimento"),
            ("logradouro", "endereco"),
            ("rua", "endereco"),
            ("número", "numero"),
            ("número", "numero_processo"),
            ("nº", "numero"),
            ("n processo", "numero_processo"),
            ("número do processo", "numero_processo"),
            ("município", "cidade"),
            ("uf", "estado"),
            ("obs", "observacoes"),
            ("observação", "observacoes"),
            ("limite", "limite_credito"),
            ("limite de crédito", "limite_credito"),
            ("valor da causa", "valor_causa"),
            ("distribuição", "data_distribuicao"),
            ("data de distribuição", "data_distribuicao"),
            ("histórico", "descricao"),
            ("vencimento", "data_vencimento"),
            ("quitado", "pago"),
            ("valor total", "valor"),
            ("montante", "valor"),
        ];

        let mut table = Self::empty();
        for (header, target) in PAIRS {
            table.insert(header, target);
        }
        table
    }
}

// =============================================================================
// SUGGESTION
// =============================================================================

fn pick_target<T: AsRef<str>>(
    normalized: &str,
    targets: &[T],
    synonyms: &SynonymTable,
    taken: &HashSet<String>,
) -> Option<String> {
    if normalized.is_empty() {
        return None;
    }
    let free = |t: &str| !taken.contains(t);

    for candidate in synonyms.candidates(normalized) {
        if free(candidate.as_str()) && targets.iter().any(|t| t.as_ref() == candidate) {
            return Some(candidate.clone());
        }
    }

    for target in targets {
        let target = target.as_ref();
        if free(target) && normalize_header(target) == normalized {
            return Some(target.to_string());
        }
    }

    if normalized.chars().count() >= MIN_CONTAINMENT_LEN {
        for target in targets {
            let target = target.as_ref();
            let target_norm = normalize_header(target);
            if free(target)
                && target_norm.chars().count() >= MIN_CONTAINMENT_LEN
                && (normalized.contains(&target_norm) || target_norm.contains(normalized))
            {
                return Some(target.to_string());
            }
        }
    }

    None
}

/// Propose one mapping row per header (header order). Each target is
/// suggested at most once. Deterministic for identical inputs.
pub fn suggest<H, T>(headers: &[H], target_fields: &[T], synonyms: &SynonymTable) -> Vec<FieldMapping>
where
    H: AsRef<str>,
    T: AsRef<str>,
{
    let mut taken = HashSet::new();
    let mut seen_sources = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());

    for header in headers {
        let header = header.as_ref();
        if !seen_sources.insert(header.to_string()) {
            continue;
        }
        let target = pick_target(&normalize_header(header), target_fields, synonyms, &taken)
            .unwrap_or_default();
        if !target.is_empty() {
            taken.insert(target.clone());
        }
        out.push(FieldMapping::new(header, target));
    }

    debug!(
        headers = headers.len(),
        mapped = out.iter().filter(|m| !m.is_ignored()).count(),
        "Suggested field mapping"
    );
    out
}

/// Re-suggest after the target schema changed. Rows whose target still
/// exists (or that were explicitly set to `"none"`) are kept with their
/// default/required settings; the rest are suggested again without stealing
/// a kept target.
pub fn resuggest<H, T>(
    previous: &[FieldMapping],
    headers: &[H],
    target_fields: &[T],
    synonyms: &SynonymTable,
) -> Vec<FieldMapping>
where
    H: AsRef<str>,
    T: AsRef<str>,
{
    let still_valid = |m: &FieldMapping| {
        m.target_field.trim().eq_ignore_ascii_case(IGNORE_TARGET)
            || target_fields
                .iter()
                .any(|t| t.as_ref() == m.target_field)
    };

    let mut kept: BTreeMap<&str, &FieldMapping> = BTreeMap::new();
    let mut taken = HashSet::new();
    for m in previous {
        let present = headers.iter().any(|h| h.as_ref() == m.source_field);
        if present && still_valid(m) {
            kept.insert(m.source_field.as_str(), m);
            if !m.is_ignored() {
                taken.insert(m.target_field.clone());
            }
        }
    }

    let mut seen_sources = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());
    for header in headers {
        let header = header.as_ref();
        if !seen_sources.insert(header.to_string()) {
            continue;
        }
        if let Some(m) = kept.get(header) {
            out.push((*m).clone());
            continue;
        }
        let target = pick_target(&normalize_header(header), target_fields, synonyms, &taken)
            .unwrap_or_default();
        if !target.is_empty() {
            taken.insert(target.clone());
        }
        out.push(FieldMapping::new(header, target));
    }
    out
}

/// Manual override: point `source` at `target`, adding the row if the
/// column was not mapped yet.
pub fn set_target(mapping: &mut Vec<FieldMapping>, source: &str, target: &str) {
    match mapping.iter_mut().find(|m| m.source_field == source) {
        Some(row) => row.target_field = target.to_string(),
        None => mapping.push(FieldMapping::new(source, target)),
    }
}

/// At least one row must feed the entity's name-equivalent field.
pub fn validate_required_fields(mapping: &[FieldMapping], name_field: &str) -> Result<()> {
    let covered = mapping
        .iter()
        .any(|m| !m.is_ignored() && m.target_field == name_field);
    if covered {
        Ok(())
    } else {
        Err(Error::IncompleteMapping(format!(
            "no column is mapped to '{}'",
            name_field
        )))
    }
}

/// Reject mappings that name the same source column twice.
pub fn validate_unique_sources(mapping: &[FieldMapping]) -> Result<()> {
    let mut seen = HashSet::new();
    for m in mapping {
        if !seen.insert(m.source_field.as_str()) {
            return Err(Error::InvalidInput(format!(
                "column '{}' is mapped more than once",
                m.source_field
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTATO_FIELDS: &[&str] = &[
        "nome",
        "nome_fantasia",
        "cpf_cnpj",
        "email",
        "telefone",
        "celular",
        "data_nascimento",
        "cidade",
        "estado",
    ];

    fn targets_of(mapping: &[FieldMapping]) -> Vec<&str> {
        mapping.iter().map(|m| m.target_field.as_str()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Nome   Fantasia "), "nome_fantasia");
        assert_eq!(normalize_header("CPF/CNPJ"), "cpf_cnpj");
        assert_eq!(normalize_header("Município"), "municipio");
        assert_eq!(normalize_header("--"), "");
        assert_eq!(normalize_header("E-mail"), "e_mail");
    }

    #[test]
    fn test_suggest_uses_synonyms_then_names() {
        let headers = ["CNPJ", "Fantasia", "Razão Social", "E-mail", "UF", "Coluna X"];
        let mapping = suggest(&headers, CONTATO_FIELDS, &SynonymTable::backoffice());
        assert_eq!(
            targets_of(&mapping),
            vec!["cpf_cnpj", "nome_fantasia", "nome", "email", "estado", ""]
        );
    }

    #[test]
    fn test_suggest_substring_fallback() {
        let headers = ["Telefone Comercial", "Cidade Atual"];
        let mapping = suggest(&headers, CONTATO_FIELDS, &SynonymTable::empty());
        assert_eq!(targets_of(&mapping), vec!["telefone", "cidade"]);
    }

    #[test]
    fn test_suggest_never_repeats_a_target() {
        let headers = ["CPF", "CNPJ"];
        let mapping = suggest(&headers, CONTATO_FIELDS, &SynonymTable::backoffice());
        assert_eq!(targets_of(&mapping), vec!["cpf_cnpj", ""]);
    }

    #[test]
    fn test_synonym_ignored_when_target_missing() {
        let headers = ["Número"];
        let mapping = suggest(&headers, &["numero_processo", "titulo"], &SynonymTable::backoffice());
        assert_eq!(targets_of(&mapping), vec!["numero_processo"]);
    }

    #[test]
    fn test_suggest_is_deterministic() {
        let headers = ["Nome", "Documento", "Celular", "Obs"];
        let synonyms = SynonymTable::backoffice();
        let first = suggest(&headers, CONTATO_FIELDS, &synonyms);
        for _ in 0..10 {
            assert_eq!(suggest(&headers, CONTATO_FIELDS, &synonyms), first);
        }
    }

    #[test]
    fn test_resuggest_preserves_valid_manual_choices() {
        let headers = ["Nome", "Contato", "Doc"];
        let mut mapping = suggest(&headers, CONTATO_FIELDS, &SynonymTable::backoffice());
        set_target(&mut mapping, "Contato", "nome_fantasia");

        let new_fields = ["nome_fantasia", "cpf_cnpj", "descricao"];
        let out = resuggest(&mapping, &headers, &new_fields, &SynonymTable::backoffice());
        // "Nome" lost its target; "Contato" kept the manual choice.
        assert_eq!(targets_of(&out), vec!["", "nome_fantasia", "cpf_cnpj"]);
    }

    #[test]
    fn test_resuggest_keeps_explicit_ignore() {
        let headers = ["Nome"];
        let previous = vec![FieldMapping::new("Nome", "none")];
        let out = resuggest(&previous, &headers, CONTATO_FIELDS, &SynonymTable::backoffice());
        assert_eq!(targets_of(&out), vec!["none"]);
    }

    #[test]
    fn test_set_target_adds_or_overrides() {
        let mut mapping = vec![FieldMapping::new("A", "nome")];
        set_target(&mut mapping, "A", "email");
        set_target(&mut mapping, "B", "nome");
        assert_eq!(targets_of(&mapping), vec!["email", "nome"]);
    }

    #[test]
    fn test_validate_required_fields() {
        let ok = vec![FieldMapping::new("Razão", "nome")];
        assert!(validate_required_fields(&ok, "nome").is_ok());

        let missing = vec![
            FieldMapping::new("Razão", "none"),
            FieldMapping::new("Doc", "cpf_cnpj"),
        ];
        let err = validate_required_fields(&missing, "nome").unwrap_err();
        assert!(matches!(err, Error::IncompleteMapping(_)));
    }

    #[test]
    fn test_validate_unique_sources() {
        let dup = vec![FieldMapping::new("A", "nome"), FieldMapping::new("A", "email")];
        assert!(validate_unique_sources(&dup).is_err());
    }

    #[test]
    fn test_synonym_table_json() {
        let table = SynonymTable::from_json(r#"{"Apelido": ["nome_fantasia"]}"#).unwrap();
        assert_eq!(table.candidates("apelido"), ["nome_fantasia".to_string()]);
        let round = SynonymTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(round, table);
    }
}
