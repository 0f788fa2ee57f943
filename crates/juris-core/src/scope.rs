//! Module scope resolution for the tag catalogue.
//!
//! A tag is visible in a module when it is active and either global (empty
//! `escopo_modulos`) or explicitly scoped to that module.

use std::collections::BTreeMap;

use crate::models::{EntityKind, Etiqueta};

/// Whether `etiqueta` may be displayed/applied inside `module`.
pub fn is_visible_in(etiqueta: &Etiqueta, module: &str) -> bool {
    etiqueta.ativa && (etiqueta.is_global() || etiqueta.escopo_modulos.contains(module.trim()))
}

/// Tags eligible in `module`, in input order.
pub fn visible_for(module: &str, tags: &[Etiqueta]) -> Vec<Etiqueta> {
    tags.iter()
        .filter(|t| is_visible_in(t, module))
        .cloned()
        .collect()
}

/// Tags that may be applied to an entity of `kind`, through the module that
/// lists it.
pub fn visible_for_kind(kind: EntityKind, tags: &[Etiqueta]) -> Vec<Etiqueta> {
    visible_for(kind.module_name(), tags)
}

/// Group tags by `grupo` (kanban stages, funnels). Ungrouped tags are left
/// out; order inside each group follows the input.
pub fn group_by_grupo(tags: &[Etiqueta]) -> BTreeMap<String, Vec<Etiqueta>> {
    let mut groups: BTreeMap<String, Vec<Etiqueta>> = BTreeMap::new();
    for tag in tags {
        if let Some(grupo) = &tag.grupo {
            groups.entry(grupo.clone()).or_default().push(tag.clone());
        }
    }
    groups
}
