//! PostgreSQL round trips. Requires a migrated database; run with
//! `cargo test -p juris-db -- --ignored`.

use juris_db::test_fixtures::test_database_url;
use juris_db::{Database, EntityKind, EtiquetaDraft, EtiquetaPatch, Owner, Predicate, RecordStore};
use serde_json::json;
use uuid::Uuid;

async fn setup() -> Database {
    let _ = dotenvy::dotenv();
    Database::connect(&test_database_url())
        .await
        .expect("Failed to connect to test database")
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_tag_lifecycle_round_trip() {
    let db = setup().await;
    let owner = Owner::new(Uuid::new_v4());
    let tags = db.tags(owner);
    let vinculos = db.vinculos(owner);

    let tag = tags
        .create(EtiquetaDraft::new("Prioridade").scoped_to("processos"))
        .await
        .unwrap();
    let updated = tags
        .update(
            tag.id,
            EtiquetaPatch {
                cor: Some("#dc2626".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.cor, "#dc2626");

    let processo = Uuid::new_v4();
    vinculos
        .attach(tag.id, EntityKind::Processo, processo)
        .await
        .unwrap();
    vinculos
        .attach(tag.id, EntityKind::Processo, processo)
        .await
        .unwrap();
    let resolved = vinculos
        .resolve_for_entities(EntityKind::Processo, &[processo])
        .await
        .unwrap();
    assert_eq!(resolved[&processo].len(), 1);
    assert_eq!(resolved[&processo][0].escopo_modulos.len(), 1);

    tags.delete(tag.id).await.unwrap();
    assert!(tags.get(tag.id).await.unwrap().is_none());
    assert!(vinculos
        .entity_ids_with_tag(tag.id, EntityKind::Processo)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_insert_many_applies_column_defaults() {
    let db = setup().await;
    let tenant_id = Uuid::new_v4();
    let tenant = tenant_id.to_string();
    let rows = vec![
        json!({"tenant_id": tenant, "nome": "Ana", "cpf_cnpj": "12345678901"}),
        json!({"tenant_id": tenant, "nome": "Bia", "data_nascimento": "1990-05-01"}),
    ]
    .into_iter()
    .filter_map(|v| v.as_object().cloned())
    .collect();

    let ids = db.records.insert_many("contatos", rows).await.unwrap();
    assert_eq!(ids.len(), 2);

    let stored = db
        .records
        .select_where("contatos", &Predicate::id_eq("tenant_id", tenant_id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r["ativo"] == json!(true)));

    let removed = db
        .records
        .delete_where("contatos", &Predicate::id_eq("tenant_id", tenant_id))
        .await
        .unwrap();
    assert_eq!(removed, 2);
}
