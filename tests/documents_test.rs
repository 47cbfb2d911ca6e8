mod common;

use bail_intake::entities::document;
use bail_intake::models::document_kind::DocumentKind;
use bail_intake::services::documents::{list_for_link, upsert_document, NewDocument};
use bail_intake::services::routing::{Owner, OwnerKeys};
use common::{seed_case, setup_db, setup_file_db};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use uuid::Uuid;

fn new_document(
    key: &str,
    kind: DocumentKind,
    owner: Option<Owner>,
    link: Option<Uuid>,
) -> NewDocument {
    NewDocument {
        storage_key: key.to_string(),
        url: format!("https://blobs.test/{}", key),
        kind,
        mime_type: "application/pdf".to_string(),
        size: 1024,
        owner: OwnerKeys::from(owner),
        intake_link_id: link,
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent_on_natural_key() {
    let db = setup_db().await;
    let case = seed_case(&db, false).await;
    let owner = Some(Owner::Person(case.persons[0].id));
    let key = "intake/t/1-a-cni.pdf";
    let kind = DocumentKind::IdentityDocument;

    let first = upsert_document(&db, new_document(key, kind, owner, Some(case.link.id)))
        .await
        .unwrap();
    let second = upsert_document(&db, new_document(key, kind, owner, Some(case.link.id)))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.document.id, second.document.id);
    assert_eq!(first.document.label, "Pièce d'identité");
    assert_eq!(
        first.document.owner_key,
        format!("person:{}", case.persons[0].id)
    );
    assert_eq!(document::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_file_under_another_kind_or_owner_is_a_new_row() {
    let db = setup_db().await;
    let case = seed_case(&db, false).await;
    let key = "intake/t/2-b-scan.pdf";
    let primary = Some(Owner::Person(case.persons[0].id));
    let other = Some(Owner::Person(case.persons[1].id));
    let client = Some(Owner::Client(case.client.id));

    let identity = DocumentKind::IdentityDocument;
    let proof = DocumentKind::ProofOfAddress;

    let as_id = upsert_document(&db, new_document(key, identity, primary, None))
        .await
        .unwrap();
    let as_other_person = upsert_document(&db, new_document(key, identity, other, None))
        .await
        .unwrap();
    let as_proof = upsert_document(&db, new_document(key, proof, client, None))
        .await
        .unwrap();

    assert!(as_id.created && as_other_person.created && as_proof.created);
    assert_eq!(document::Entity::find().count(&db).await.unwrap(), 3);
}

#[tokio::test]
async fn test_only_one_owner_key_is_written() {
    let db = setup_db().await;
    let case = seed_case(&db, false).await;
    let owner = Some(Owner::Property(case.property.id));

    let outcome = upsert_document(
        &db,
        new_document("intake/t/3-c-dpe.pdf", DocumentKind::Diagnostics, owner, None),
    )
    .await
    .unwrap();
    let doc = outcome.document;

    assert_eq!(doc.property_id, Some(case.property.id));
    assert_eq!(doc.person_id, None);
    assert_eq!(doc.company_id, None);
    assert_eq!(doc.client_id, None);
}

#[tokio::test]
async fn test_orphan_documents_are_deduplicated_too() {
    let db = setup_db().await;
    let kind = DocumentKind::CompanyRegistration;
    let kbis = || new_document("intake/t/4-d-kbis.pdf", kind, None, None);

    let first = upsert_document(&db, kbis()).await.unwrap();
    let second = upsert_document(&db, kbis()).await.unwrap();

    assert_eq!(first.document.owner_key, "none");
    assert!(!second.created);
    assert_eq!(first.document.id, second.document.id);
}

#[tokio::test]
async fn test_unique_index_rejects_duplicate_rows() {
    let db = setup_db().await;
    let stored = upsert_document(
        &db,
        new_document("intake/t/5-e-rib.pdf", DocumentKind::BankDetails, None, None),
    )
    .await
    .unwrap()
    .document;

    // Bypasses the lookup, as a concurrent writer would.
    let duplicate = document::ActiveModel {
        id: Set(Uuid::new_v4()),
        storage_key: Set(stored.storage_key.clone()),
        url: Set(stored.url.clone()),
        kind: Set(stored.kind),
        label: Set(stored.label.clone()),
        mime_type: Set(stored.mime_type.clone()),
        size: Set(stored.size),
        person_id: Set(None),
        company_id: Set(None),
        client_id: Set(None),
        property_id: Set(None),
        owner_key: Set(stored.owner_key.clone()),
        intake_link_id: Set(None),
        created_at: Set(stored.created_at),
    };

    assert!(duplicate.insert(&db).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_converge_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_file_db(&dir, 8).await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move {
                let kind = DocumentKind::BankDetails;
                upsert_document(&db, new_document("intake/t/6-g-rib.pdf", kind, None, None)).await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in futures::future::join_all(handles).await {
        outcomes.push(handle.unwrap().expect("upsert should not fail under contention"));
    }

    let created = outcomes.iter().filter(|o| o.created).count();
    assert_eq!(created, 1);
    assert!(outcomes
        .iter()
        .all(|o| o.document.id == outcomes[0].document.id));
    assert_eq!(document::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_for_link_pages_newest_first() {
    let db = setup_db().await;
    let case = seed_case(&db, false).await;
    let client = Some(Owner::Client(case.client.id));

    for i in 0..5 {
        let key = format!("intake/t/{}-f-doc.pdf", i);
        upsert_document(&db, new_document(&key, DocumentKind::Other, client, Some(case.link.id)))
            .await
            .unwrap();
    }
    // Not on this link.
    upsert_document(&db, new_document("intake/other/x.pdf", DocumentKind::Other, None, None))
        .await
        .unwrap();

    let first = list_for_link(&db, case.link.id, 1, 2).await.unwrap();
    let last = list_for_link(&db, case.link.id, 3, 2).await.unwrap();

    assert_eq!(first.total_items, 5);
    assert_eq!(first.documents.len(), 2);
    assert_eq!(last.documents.len(), 1);
    assert!(first.documents[0].created_at >= first.documents[1].created_at);
    assert!(first
        .documents
        .iter()
        .all(|d| d.intake_link_id == Some(case.link.id)));
}
