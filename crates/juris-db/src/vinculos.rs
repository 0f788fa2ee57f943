//! Polymorphic tag links (`etiqueta_vinculos`).
//!
//! Every lookup that takes a caller-sized id list is split into chunks of at
//! most `in_clause_limit` ids, so no single store query grows with the size
//! of the page being rendered or the file being imported.
//!
//! Links are only created for tags of the index's own tenant.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, instrument, trace};
use uuid::Uuid;

use juris_core::{
    defaults, EntityKind, Error, Etiqueta, Owner, Predicate, RecordStore, Result, Taggable,
    Tagged, Vinculo,
};

use crate::tags::{fetch_by_ids, sort_by_nome};

/// Attach, detach and resolve tag links for one tenant.
pub struct VinculoIndex<S> {
    store: S,
    owner: Owner,
    in_clause_limit: usize,
}

/// De-duplicate while keeping first-seen order.
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl<S: RecordStore> VinculoIndex<S> {
    pub fn new(store: S, owner: Owner) -> Self {
        Self {
            store,
            owner,
            in_clause_limit: defaults::IN_CLAUSE_LIMIT,
        }
    }

    /// Override the maximum number of ids per `IN` lookup.
    pub fn with_in_clause_limit(mut self, limit: usize) -> Self {
        self.in_clause_limit = limit.max(1);
        self
    }

    pub fn in_clause_limit(&self) -> usize {
        self.in_clause_limit
    }

    fn scope(&self, kind: EntityKind) -> Predicate {
        Predicate::id_eq(defaults::TENANT_COLUMN, self.owner.tenant_id)
            .and(Predicate::eq("referencia_tipo", kind.as_str()))
    }

    fn triple(&self, etiqueta_id: Uuid, kind: EntityKind, referencia_id: Uuid) -> Predicate {
        self.scope(kind)
            .and(Predicate::id_eq("etiqueta_id", etiqueta_id))
            .and(Predicate::id_eq("referencia_id", referencia_id))
    }

    async fn select_links(&self, predicate: &Predicate) -> Result<Vec<Vinculo>> {
        self.store
            .select_where(defaults::TABLE_VINCULOS, predicate)
            .await?
            .into_iter()
            .map(Vinculo::from_record)
            .collect()
    }

    /// Fail with `NotFound` unless every id is a tag of this tenant.
    async fn ensure_tags_exist(&self, etiqueta_ids: &[Uuid]) -> Result<()> {
        let mut found = HashSet::with_capacity(etiqueta_ids.len());
        for chunk in etiqueta_ids.chunks(self.in_clause_limit) {
            for tag in fetch_by_ids(&self.store, self.owner.tenant_id, chunk).await? {
                found.insert(tag.id);
            }
        }
        let missing: Vec<String> = etiqueta_ids
            .iter()
            .filter(|id| !found.contains(*id))
            .map(Uuid::to_string)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::NotFound(format!(
            "etiqueta {} does not exist for this tenant",
            missing.join(", ")
        )))
    }

    /// Link a tag to an entity. Re-attaching an existing link is a no-op;
    /// a tag the tenant does not own is `NotFound`.
    #[instrument(skip(self), fields(subsystem = "tags", component = "vinculo_index", op = "attach", tenant_id = %self.owner.tenant_id, referencia_tipo = %kind))]
    pub async fn attach(
        &self,
        etiqueta_id: Uuid,
        kind: EntityKind,
        referencia_id: Uuid,
    ) -> Result<()> {
        self.ensure_tags_exist(&[etiqueta_id]).await?;
        let existing = self
            .select_links(&self.triple(etiqueta_id, kind, referencia_id))
            .await?;
        if !existing.is_empty() {
            trace!("Link already present");
            return Ok(());
        }

        let vinculo = Vinculo::new(&self.owner, etiqueta_id, kind, referencia_id);
        self.store
            .insert_many(defaults::TABLE_VINCULOS, vec![vinculo.to_record()?])
            .await?;
        debug!("Link created");
        Ok(())
    }

    /// Link every tag in `etiqueta_ids` to every entity in `referencia_ids`,
    /// skipping links that already exist. Returns the number created.
    ///
    /// Any unknown tag id fails the whole call with `NotFound` before a link
    /// is written.
    #[instrument(skip(self, referencia_ids, etiqueta_ids), fields(subsystem = "tags", component = "vinculo_index", op = "attach_many", tenant_id = %self.owner.tenant_id, referencia_tipo = %kind, row_count = referencia_ids.len()))]
    pub async fn attach_many(
        &self,
        kind: EntityKind,
        referencia_ids: &[Uuid],
        etiqueta_ids: &[Uuid],
    ) -> Result<usize> {
        let referencia_ids = dedup(referencia_ids);
        let etiqueta_ids = dedup(etiqueta_ids);
        if referencia_ids.is_empty() || etiqueta_ids.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();
        self.ensure_tags_exist(&etiqueta_ids).await?;

        let mut existing: HashSet<(Uuid, EntityKind, Uuid)> = HashSet::new();
        for chunk in referencia_ids.chunks(self.in_clause_limit) {
            let predicate = self
                .scope(kind)
                .and(Predicate::id_in("etiqueta_id", &etiqueta_ids))
                .and(Predicate::id_in("referencia_id", chunk));
            for link in self.select_links(&predicate).await? {
                existing.insert(link.key());
            }
        }

        let mut missing = Vec::new();
        for referencia_id in &referencia_ids {
            for etiqueta_id in &etiqueta_ids {
                if !existing.contains(&(*etiqueta_id, kind, *referencia_id)) {
                    missing.push(
                        Vinculo::new(&self.owner, *etiqueta_id, kind, *referencia_id)
                            .to_record()?,
                    );
                }
            }
        }

        let created = missing.len();
        let mut chunks = 0usize;
        let mut pending = missing.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk: Vec<_> = pending.by_ref().take(self.in_clause_limit).collect();
            self.store
                .insert_many(defaults::TABLE_VINCULOS, chunk)
                .await?;
            chunks += 1;
        }

        debug!(
            created,
            skipped_existing = existing.len(),
            chunk_count = chunks,
            duration_ms = start.elapsed().as_millis() as u64,
            "Links attached"
        );
        Ok(created)
    }

    /// Remove one link. Removing a missing link is a no-op.
    #[instrument(skip(self), fields(subsystem = "tags", component = "vinculo_index", op = "detach", tenant_id = %self.owner.tenant_id, referencia_tipo = %kind))]
    pub async fn detach(
        &self,
        etiqueta_id: Uuid,
        kind: EntityKind,
        referencia_id: Uuid,
    ) -> Result<()> {
        let removed = self
            .store
            .delete_where(
                defaults::TABLE_VINCULOS,
                &self.triple(etiqueta_id, kind, referencia_id),
            )
            .await?;
        debug!(removed, "Link removed");
        Ok(())
    }

    /// Remove every link of one entity, returning the count.
    pub async fn detach_all(&self, kind: EntityKind, referencia_id: Uuid) -> Result<u64> {
        self.store
            .delete_where(
                defaults::TABLE_VINCULOS,
                &self
                    .scope(kind)
                    .and(Predicate::id_eq("referencia_id", referencia_id)),
            )
            .await
    }

    /// Ids of the `kind` entities carrying `etiqueta_id`, in link order.
    pub async fn entity_ids_with_tag(&self, etiqueta_id: Uuid, kind: EntityKind) -> Result<Vec<Uuid>> {
        let links = self
            .select_links(
                &self
                    .scope(kind)
                    .and(Predicate::id_eq("etiqueta_id", etiqueta_id)),
            )
            .await?;
        let ids: Vec<Uuid> = links.into_iter().map(|l| l.referencia_id).collect();
        Ok(dedup(&ids))
    }

    /// Tags attached to each requested entity. Every id in `ids` is a key of
    /// the result; unlinked entities map to an empty vector. Tags are ordered
    /// by name.
    #[instrument(skip(self, ids), fields(subsystem = "tags", component = "vinculo_index", op = "resolve", tenant_id = %self.owner.tenant_id, referencia_tipo = %kind, row_count = ids.len()))]
    pub async fn resolve_for_entities(
        &self,
        kind: EntityKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Etiqueta>>> {
        let ids = dedup(ids);
        let mut resolved: HashMap<Uuid, Vec<Etiqueta>> =
            ids.iter().map(|id| (*id, Vec::new())).collect();
        if ids.is_empty() {
            return Ok(resolved);
        }
        let start = Instant::now();

        let mut links = Vec::new();
        let mut chunk_count = 0usize;
        for chunk in ids.chunks(self.in_clause_limit) {
            let predicate = self
                .scope(kind)
                .and(Predicate::id_in("referencia_id", chunk));
            links.extend(self.select_links(&predicate).await?);
            chunk_count += 1;
        }

        let tag_ids = dedup(&links.iter().map(|l| l.etiqueta_id).collect::<Vec<_>>());
        let mut tags: HashMap<Uuid, Etiqueta> = HashMap::with_capacity(tag_ids.len());
        for chunk in tag_ids.chunks(self.in_clause_limit) {
            for tag in fetch_by_ids(&self.store, self.owner.tenant_id, chunk).await? {
                tags.insert(tag.id, tag);
            }
            chunk_count += 1;
        }

        let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
        for link in links {
            if !seen.insert((link.referencia_id, link.etiqueta_id)) {
                continue;
            }
            // Links to a tag that no longer exists are ignored.
            if let (Some(tag), Some(slot)) =
                (tags.get(&link.etiqueta_id), resolved.get_mut(&link.referencia_id))
            {
                slot.push(tag.clone());
            }
        }
        for slot in resolved.values_mut() {
            sort_by_nome(slot);
        }

        debug!(
            link_count = seen.len(),
            chunk_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tags resolved"
        );
        Ok(resolved)
    }

    /// Enrich typed entities with their tags, preserving input order.
    pub async fn resolve<T: Taggable>(&self, entities: Vec<T>) -> Result<Vec<Tagged<T>>> {
        let ids: Vec<Uuid> = entities.iter().map(Taggable::entity_id).collect();
        let resolved = self.resolve_for_entities(T::KIND, &ids).await?;

        Ok(entities
            .into_iter()
            .map(|entity| {
                let etiquetas = resolved
                    .get(&entity.entity_id())
                    .cloned()
                    .unwrap_or_default();
                Tagged::new(entity, etiquetas)
            })
            .collect())
    }
}
