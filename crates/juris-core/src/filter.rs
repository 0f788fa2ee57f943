//! Include/exclude tag filtering over already-resolved entities.
//!
//! The engine is pure: it receives entities whose tags were resolved by the
//! vinculo index and narrows them in memory.
//!
//! - **must_include** (AND logic): the entity must carry ALL of these tags.
//! - **must_exclude** (NOT logic): the entity must carry NONE of these tags.
//!
//! Adding include tags can only shrink the result; empty sets impose no
//! constraint.
//!
//! # Example
//!
//! ```
//! use juris_core::TagFilter;
//! use std::collections::HashSet;
//! use uuid::Uuid;
//!
//! let vip = Uuid::new_v4();
//! let arquivado = Uuid::new_v4();
//! let filter = TagFilter::new().require(vip).exclude(arquivado);
//!
//! let tags: HashSet<Uuid> = [vip].into_iter().collect();
//! assert!(filter.matches(&tags));
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Tagged;

/// Anything that exposes the set of tag ids attached to it.
pub trait HasTags {
    fn tag_ids(&self) -> HashSet<Uuid>;
}

impl<T> HasTags for Tagged<T> {
    fn tag_ids(&self) -> HashSet<Uuid> {
        self.etiqueta_ids().collect()
    }
}

impl<E: HasTags> HasTags for &E {
    fn tag_ids(&self) -> HashSet<Uuid> {
        (**self).tag_ids()
    }
}

/// Combinatorial tag filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    /// Required tags (AND logic) - must have ALL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_include: Vec<Uuid>,

    /// Excluded tags (NOT logic) - must NOT have ANY.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_exclude: Vec<Uuid>,
}

impl TagFilter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the two id lists.
    pub fn from_sets(must_include: &[Uuid], must_exclude: &[Uuid]) -> Self {
        Self {
            must_include: must_include.to_vec(),
            must_exclude: must_exclude.to_vec(),
        }
    }

    /// Add a required tag.
    pub fn require(mut self, etiqueta_id: Uuid) -> Self {
        if !self.must_include.contains(&etiqueta_id) {
            self.must_include.push(etiqueta_id);
        }
        self
    }

    /// Add an excluded tag.
    pub fn exclude(mut self, etiqueta_id: Uuid) -> Self {
        if !self.must_exclude.contains(&etiqueta_id) {
            self.must_exclude.push(etiqueta_id);
        }
        self
    }

    /// Check if the filter imposes no constraint.
    pub fn is_empty(&self) -> bool {
        self.must_include.is_empty() && self.must_exclude.is_empty()
    }

    /// True when some tag is both required and excluded; such a filter
    /// matches nothing.
    pub fn is_contradictory(&self) -> bool {
        self.must_include
            .iter()
            .any(|id| self.must_exclude.contains(id))
    }

    /// Test one entity's tag-id set.
    pub fn matches(&self, tag_ids: &HashSet<Uuid>) -> bool {
        self.must_include.iter().all(|id| tag_ids.contains(id))
            && !self.must_exclude.iter().any(|id| tag_ids.contains(id))
    }

    /// Keep the entities that match, preserving order.
    pub fn apply<E: HasTags>(&self, entities: Vec<E>) -> Vec<E> {
        if self.is_empty() {
            return entities;
        }
        entities
            .into_iter()
            .filter(|e| self.matches(&e.tag_ids()))
            .collect()
    }
}

/// Keep entities carrying every tag in `must_include` and none in
/// `must_exclude`.
pub fn apply_tag_filters<E: HasTags>(
    entities: Vec<E>,
    must_include: &[Uuid],
    must_exclude: &[Uuid],
) -> Vec<E> {
    TagFilter::from_sets(must_include, must_exclude).apply(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EtiquetaDraft, Owner};
    use crate::Etiqueta;

    fn tag(nome: &str) -> Etiqueta {
        EtiquetaDraft::new(nome)
            .into_etiqueta(&Owner::new(Uuid::nil()))
            .unwrap()
    }

    fn entity(name: &'static str, tags: &[&Etiqueta]) -> Tagged<&'static str> {
        Tagged::new(name, tags.iter().map(|t| (*t).clone()).collect())
    }

    #[test]
    fn test_include_and_exclude_scenario() {
        let (t1, t2, t3) = (tag("1"), tag("2"), tag("3"));
        let a = entity("A", &[&t1, &t2]);
        let b = entity("B", &[&t1]);
        let c = entity("C", &[&t2, &t3]);

        let out = apply_tag_filters(vec![a, b, c], &[t1.id], &[t3.id]);
        let names: Vec<_> = out.iter().map(|e| e.entity).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_include_is_and_not_or() {
        let (t1, t2) = (tag("1"), tag("2"));
        let a = entity("A", &[&t1, &t2]);
        let b = entity("B", &[&t1]);

        let out = apply_tag_filters(vec![a, b], &[t1.id, t2.id], &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity, "A");
    }

    #[test]
    fn test_empty_filter_is_identity() {
        let t1 = tag("1");
        let items = vec![entity("A", &[&t1]), entity("B", &[])];
        let out = apply_tag_filters(items.clone(), &[], &[]);
        assert_eq!(out, items);
    }

    #[test]
    fn test_untagged_entity_passes_exclude_only() {
        let t1 = tag("1");
        let out = apply_tag_filters(vec![entity("A", &[])], &[], &[t1.id]);
        assert_eq!(out.len(), 1);
        let out = apply_tag_filters(vec![entity("A", &[])], &[t1.id], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_contradictory_filter_matches_nothing() {
        let t1 = tag("1");
        let filter = TagFilter::new().require(t1.id).exclude(t1.id);
        assert!(filter.is_contradictory());
        assert!(filter.apply(vec![entity("A", &[&t1])]).is_empty());
    }

    #[test]
    fn test_builder_deduplicates() {
        let id = Uuid::new_v4();
        let filter = TagFilter::new().require(id).require(id);
        assert_eq!(filter.must_include.len(), 1);
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_filter_works_on_references() {
        let t1 = tag("1");
        let items = vec![entity("A", &[&t1]), entity("B", &[])];
        let refs: Vec<&Tagged<&str>> = items.iter().collect();
        let out = apply_tag_filters(refs, &[t1.id], &[]);
        assert_eq!(out.len(), 1);
    }

    /// One entity per subset of `tags`, the subset encoded as a bitmask.
    fn every_subset(tags: &[Etiqueta]) -> Vec<Tagged<u32>> {
        (0..1u32 << tags.len())
            .map(|mask| {
                let carried = tags
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, t)| t.clone())
                    .collect();
                Tagged::new(mask, carried)
            })
            .collect()
    }

    fn ids(tags: &[Etiqueta], mask: u32) -> Vec<Uuid> {
        tags.iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, t)| t.id)
            .collect()
    }

    #[test]
    fn test_nested_include_sets_shrink_results() {
        let tags: Vec<Etiqueta> = (0..5).map(|i| tag(&format!("t{i}"))).collect();
        let entities = every_subset(&tags);

        // include = {t0}, {t0,t1}, ... each a superset of the previous.
        let mut previous: Option<Vec<u32>> = None;
        for k in 0..=tags.len() {
            let include = (1u32 << k) - 1;
            let out: Vec<u32> = apply_tag_filters(entities.clone(), &ids(&tags, include), &[])
                .into_iter()
                .map(|e| e.entity)
                .collect();

            assert!(out.iter().all(|m| m & include == include), "include {include:b}");
            assert_eq!(out.len(), 1 << (tags.len() - k));
            assert!(out.windows(2).all(|w| w[0] < w[1]), "order kept");
            if let Some(prev) = &previous {
                assert!(out.iter().all(|m| prev.contains(m)));
            }
            previous = Some(out);
        }
    }

    #[test]
    fn test_excluded_tags_never_survive() {
        let tags: Vec<Etiqueta> = (0..5).map(|i| tag(&format!("t{i}"))).collect();
        let entities = every_subset(&tags);

        for exclude in 0..1u32 << tags.len() {
            for include in [0u32, 0b1, 0b10010] {
                let out = apply_tag_filters(
                    entities.clone(),
                    &ids(&tags, include),
                    &ids(&tags, exclude),
                );
                let expected: Vec<u32> = (0..1u32 << tags.len())
                    .filter(|m| m & exclude == 0 && m & include == include)
                    .collect();
                let got: Vec<u32> = out.iter().map(|e| e.entity).collect();
                assert_eq!(got, expected, "include {include:b} exclude {exclude:b}");
                for e in &out {
                    assert!(e.tag_ids().is_disjoint(&ids(&tags, exclude).into_iter().collect()));
                }
            }
        }
    }
}
