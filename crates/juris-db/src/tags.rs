//! Tag catalogue for one tenant.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use juris_core::{
    defaults, Error, Etiqueta, EtiquetaDraft, EtiquetaPatch, Owner, Predicate, RecordStore, Result,
};

/// Order tags by name (case-insensitive), then id.
pub fn sort_by_nome(tags: &mut [Etiqueta]) {
    tags.sort_by(|a, b| {
        a.nome
            .to_lowercase()
            .cmp(&b.nome.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Tags of `tenant_id` whose id is in `ids`, unordered. One query; callers
/// bound the size of `ids`.
pub(crate) async fn fetch_by_ids<S: RecordStore + ?Sized>(
    store: &S,
    tenant_id: Uuid,
    ids: &[Uuid],
) -> Result<Vec<Etiqueta>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let predicate = Predicate::id_eq(defaults::TENANT_COLUMN, tenant_id)
        .and(Predicate::id_in(defaults::ID_COLUMN, ids));
    store
        .select_where(defaults::TABLE_ETIQUETAS, &predicate)
        .await?
        .into_iter()
        .map(Etiqueta::from_record)
        .collect()
}

/// CRUD over the `etiquetas` table, scoped to an [`Owner`].
///
/// Deleting a tag removes its vinculos first; if that fails the tag row is
/// left untouched, so there is never a link pointing at a missing tag.
pub struct TagStore<S> {
    store: S,
    owner: Owner,
}

impl<S: RecordStore> TagStore<S> {
    pub fn new(store: S, owner: Owner) -> Self {
        Self { store, owner }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    fn tenant(&self) -> Predicate {
        Predicate::id_eq(defaults::TENANT_COLUMN, self.owner.tenant_id)
    }

    fn by_id(&self, id: Uuid) -> Predicate {
        self.tenant()
            .and(Predicate::id_eq(defaults::ID_COLUMN, id))
    }

    /// Validate the draft and persist a new tag.
    #[instrument(skip(self, draft), fields(subsystem = "tags", component = "tag_store", op = "create", tenant_id = %self.owner.tenant_id))]
    pub async fn create(&self, draft: EtiquetaDraft) -> Result<Etiqueta> {
        let etiqueta = draft.into_etiqueta(&self.owner)?;
        self.store
            .insert_many(defaults::TABLE_ETIQUETAS, vec![etiqueta.to_record()?])
            .await?;
        info!(etiqueta_id = %etiqueta.id, nome = %etiqueta.nome, "Tag created");
        Ok(etiqueta)
    }

    /// Fetch one tag of this tenant.
    pub async fn get(&self, id: Uuid) -> Result<Option<Etiqueta>> {
        let rows = self
            .store
            .select_where(defaults::TABLE_ETIQUETAS, &self.by_id(id))
            .await?;
        rows.into_iter().next().map(Etiqueta::from_record).transpose()
    }

    /// Apply `patch` to the tag with `id`.
    #[instrument(skip(self, patch), fields(subsystem = "tags", component = "tag_store", op = "update", tenant_id = %self.owner.tenant_id, etiqueta_id = %id))]
    pub async fn update(&self, id: Uuid, patch: EtiquetaPatch) -> Result<Etiqueta> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Etiqueta {}", id)))?;
        let updated = patch.apply_to(current)?;

        self.store
            .replace(defaults::TABLE_ETIQUETAS, id, updated.to_record()?)
            .await?;
        debug!("Tag updated");
        Ok(updated)
    }

    /// Delete a tag and every vinculo referencing it. Missing tags are a
    /// no-op.
    #[instrument(skip(self), fields(subsystem = "tags", component = "tag_store", op = "delete", tenant_id = %self.owner.tenant_id, etiqueta_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let start = Instant::now();
        let links = self
            .tenant()
            .and(Predicate::id_eq("etiqueta_id", id));

        let removed_links = match self
            .store
            .delete_where(defaults::TABLE_VINCULOS, &links)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Vinculo cascade failed, tag left intact");
                return Err(e);
            }
        };

        let removed = self
            .store
            .delete_where(defaults::TABLE_ETIQUETAS, &self.by_id(id))
            .await?;

        info!(
            removed_links,
            removed_tag = removed > 0,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag deleted"
        );
        Ok(())
    }

    /// Every tag of the tenant, active or not, ordered by name.
    pub async fn list(&self) -> Result<Vec<Etiqueta>> {
        let mut tags = self.load(&self.tenant()).await?;
        sort_by_nome(&mut tags);
        Ok(tags)
    }

    async fn load(&self, predicate: &Predicate) -> Result<Vec<Etiqueta>> {
        self.store
            .select_where(defaults::TABLE_ETIQUETAS, predicate)
            .await?
            .into_iter()
            .map(Etiqueta::from_record)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use std::sync::Arc;

    fn tag_store() -> (Arc<MemoryRecordStore>, TagStore<Arc<MemoryRecordStore>>) {
        let mem = Arc::new(MemoryRecordStore::new());
        let store = TagStore::new(mem.clone(), Owner::new(Uuid::new_v4()));
        (mem, store)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, tags) = tag_store();
        let created = tags
            .create(EtiquetaDraft::new(" Urgente ").with_cor("#ff0000"))
            .await
            .unwrap();
        assert_eq!(created.nome, "Urgente");

        let fetched = tags.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(tags.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_blank_name_writes_nothing() {
        let (mem, tags) = tag_store();
        let err = tags.create(EtiquetaDraft::new("  ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(mem.insert_calls(defaults::TABLE_ETIQUETAS), 0);
    }

    #[tokio::test]
    async fn test_list_sorted_case_insensitive() {
        let (_, tags) = tag_store();
        for nome in ["beta", "Alfa", "gama"] {
            tags.create(EtiquetaDraft::new(nome)).await.unwrap();
        }
        tags.create(EtiquetaDraft::new("Delta").inactive())
            .await
            .unwrap();
        let names: Vec<String> = tags
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.nome)
            .collect();
        assert_eq!(names, vec!["Alfa", "beta", "Delta", "gama"]);
    }

    #[tokio::test]
    async fn test_list_is_tenant_scoped() {
        let mem = Arc::new(MemoryRecordStore::new());
        let a = TagStore::new(mem.clone(), Owner::new(Uuid::new_v4()));
        let b = TagStore::new(mem.clone(), Owner::new(Uuid::new_v4()));
        a.create(EtiquetaDraft::new("A")).await.unwrap();
        assert!(b.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let (_, tags) = tag_store();
        let err = tags
            .update(Uuid::new_v4(), EtiquetaPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let (_, tags) = tag_store();
        let tag = tags.create(EtiquetaDraft::new("Lead")).await.unwrap();
        let updated = tags
            .update(
                tag.id,
                EtiquetaPatch {
                    nome: Some("Cliente".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, tag.id);
        assert_eq!(tags.get(tag.id).await.unwrap().unwrap().nome, "Cliente");
        assert_eq!(tags.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let (_, tags) = tag_store();
        tags.delete(Uuid::new_v4()).await.unwrap();
    }
}
