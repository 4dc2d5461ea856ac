//! End-to-end intake flows against a real MongoDB instance.
//!
//! Run with: cargo test -- --ignored

use uuid::Uuid;

use takeoff_engine::TakeoffService;
use takeoff_models::row::{RowQuantityUpdate, RowQuery};
use takeoff_models::{Actor, CreateProjectRequest, Provenance, RoleHints};
use takeoff_utils::AppConfig;

const MTO_CSV: &[u8] = b"\
Area Line Sheet Ident,Required Qty,Issued Qty Ass,Consumed Qty,Issued Date
A-101-1,20,10,4,2024-01-15
A-101-2,8,5,0,2024-01-16
A-101-3,15,12,2,
";

const MTO_CSV_OVERCONSUMED: &[u8] = b"\
Area Line Sheet Ident,Required Qty,Issued Qty Ass,Consumed Qty,Issued Date
A-101-1,20,10,14,2024-01-15
A-101-2,8,5,0,2024-01-16
A-101-3,15,12,2,
A-101-4,6,6,0,2024-02-01
";

async fn service() -> TakeoffService {
    service_with(AppConfig::default().ingest).await
}

async fn service_with(config: takeoff_utils::IngestConfig) -> TakeoffService {
    let url = std::env::var("MONGODB_URL")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let db_name = format!("takeoff_test_{}", Uuid::new_v4().simple());
    let db = takeoff_database::connect(&url, &db_name, std::time::Duration::from_secs(5))
        .await
        .expect("MongoDB must be running for integration tests");
    TakeoffService::new(db, config)
}

fn super_admin() -> Actor {
    Actor {
        id: Uuid::new_v4(),
        super_admin: true,
    }
}

fn request(name: &str) -> CreateProjectRequest {
    CreateProjectRequest {
        name: name.to_string(),
        code: Some("PL-N".to_string()),
        description: None,
        owner: None,
        consultant: None,
        work_order: None,
        po_date: None,
        finished_date: None,
        roles: RoleHints {
            pk: "Area Line Sheet Ident".to_string(),
            issued_qty: Some("Issued Qty Ass".to_string()),
            consumed_qty: Some("Consumed Qty".to_string()),
            required_qty: Some("Required Qty".to_string()),
            ..RoleHints::default()
        },
    }
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_create_then_reupload_diffs_and_alerts() {
    let service = service().await;
    let actor = super_admin();

    let created = service
        .create_project_with_upload(
            request("Pipeline North"),
            "mto.csv",
            MTO_CSV,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();
    assert_eq!(created.outcome.inserted, 3);
    assert_eq!(created.outcome.updated, 0);
    assert!(created.project.store_name.starts_with("mto_"));

    // Re-upload: one row over-consumed, one brand new.
    let outcome = service
        .bulk_upload(
            created.project.id,
            "mto.csv",
            MTO_CSV_OVERCONSUMED,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.audit_failures, 0);

    let (alerts, total) = service
        .list_alerts(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(alerts[0].alert.pk_value, "A-101-1");
    assert_eq!(alerts[0].alert.balance_qty, -4.0);
    assert_eq!(alerts[0].project_name.as_deref(), Some("Pipeline North"));

    let (logs, _) = service
        .list_logs(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.description, "Bulk update");
    assert!(logs[0].entry.verify_integrity());

    service.delete_project(created.project.id, actor).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_identical_reupload_is_a_noop() {
    let service = service().await;
    let actor = super_admin();

    let created = service
        .create_project_with_upload(
            request("Pipeline South"),
            "mto.csv",
            MTO_CSV,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();

    let outcome = service
        .bulk_upload(created.project.id, "mto.csv", MTO_CSV, actor, Provenance::default())
        .await
        .unwrap();
    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.updated, 0);

    let (_, alerts) = service
        .list_alerts(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(alerts, 0);
    let (_, logs) = service
        .list_logs(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(logs, 0);

    service.delete_project(created.project.id, actor).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_single_update_logs_and_alerts() {
    let service = service().await;
    let actor = super_admin();

    let created = service
        .create_project_with_upload(
            request("Pipeline East"),
            "mto.csv",
            MTO_CSV,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();

    let page = service
        .list_rows(created.project.id, RowQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let row_id = page.rows[0].get_str("_id").unwrap().to_string();

    let update = RowQuantityUpdate {
        consumed_qty: Some(999.0),
        ..RowQuantityUpdate::default()
    };
    let row = service
        .update_row(
            created.project.id,
            &row_id,
            update,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();
    assert!(row.get_f64(created.project.schema.roles.balance_qty_target()).unwrap() < 0.0);

    let (alerts, _) = service
        .list_alerts(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);

    let (logs, _) = service
        .list_logs(Some(created.project.id), None, None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.description, "Single update");

    service.delete_project(created.project.id, actor).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_non_super_admin_cannot_create_or_raise_required() {
    let service = service().await;
    let admin = super_admin();
    let operator = Actor {
        id: Uuid::new_v4(),
        super_admin: false,
    };

    let err = service
        .create_project_with_upload(
            request("Denied"),
            "mto.csv",
            MTO_CSV,
            operator,
            Provenance::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION_ERROR");

    let created = service
        .create_project_with_upload(
            request("Pipeline West"),
            "mto.csv",
            MTO_CSV,
            admin,
            Provenance::default(),
        )
        .await
        .unwrap();

    let page = service
        .list_rows(created.project.id, RowQuery::default())
        .await
        .unwrap();
    let row_id = page.rows[0].get_str("_id").unwrap().to_string();

    // A non-super-admin edit to required quantity is retained as stored.
    let update = RowQuantityUpdate {
        required_qty: Some(1.0),
        ..RowQuantityUpdate::default()
    };
    let row = service
        .update_row(created.project.id, &row_id, update, operator, Provenance::default())
        .await
        .unwrap();
    assert_ne!(row.get_f64("required_qty").ok(), Some(1.0));

    service.delete_project(created.project.id, admin).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_small_batches_apply_whole_upload() {
    let mut config = AppConfig::default().ingest;
    config.batch_size = 2;
    let service = service_with(config).await;
    let actor = super_admin();

    // 3 rows land across two storage batches.
    let created = service
        .create_project_with_upload(
            request("Pipeline Batched"),
            "mto.csv",
            MTO_CSV,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();
    assert_eq!(created.outcome.inserted, 3);

    // A duplicate key in a later batch fails the upload before any write.
    let duplicate_csv: &[u8] = b"\
Area Line Sheet Ident,Required Qty,Issued Qty Ass,Consumed Qty,Issued Date
A-101-7,1,1,0,
A-101-8,1,1,0,
A-101-9,1,1,0,
A-101-7,2,2,0,
";
    let err = service
        .bulk_upload(
            created.project.id,
            "mto.csv",
            duplicate_csv,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    let page = service
        .list_rows(created.project.id, RowQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);

    service.delete_project(created.project.id, actor).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires a running MongoDB
async fn test_selected_headers_persist_and_export() {
    let service = service().await;
    let actor = super_admin();

    let created = service
        .create_project_with_upload(
            request("Pipeline Export"),
            "mto.csv",
            MTO_CSV,
            actor,
            Provenance::default(),
        )
        .await
        .unwrap();

    let query = RowQuery {
        selected_headers: Some(vec![
            "Area Line Sheet Ident".to_string(),
            "Issued Qty Ass".to_string(),
        ]),
        ..RowQuery::default()
    };
    let page = service.list_rows(created.project.id, query).await.unwrap();
    assert_eq!(page.headers, vec!["area_line_sheet_ident", "issued_qty_ass"]);

    // The selection sticks for subsequent listings and exports.
    let page = service
        .list_rows(created.project.id, RowQuery::default())
        .await
        .unwrap();
    assert_eq!(page.headers, vec!["area_line_sheet_ident", "issued_qty_ass"]);

    let mut out = Vec::new();
    service
        .export_rows_csv(created.project.id, None, &mut out)
        .await
        .unwrap();
    let csv = String::from_utf8(out).unwrap();
    assert!(csv.starts_with("\"area_line_sheet_ident\",\"issued_qty_ass\"\n"));
    assert!(csv.contains("\"A-101-1\""));

    service.delete_project(created.project.id, actor).await.unwrap();
}
