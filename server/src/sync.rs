//! Sync coordinator: after a primary store write succeeds, mirror it into
//! the spreadsheet if and only if a sync config is present. A failed mirror
//! never rolls back or fails the primary write; it is logged, reported as a
//! partial success, and dropped. No retry, no queue, no catch-up.

use serde::Serialize;
use tracing::warn;

use orders::model::{JobOrder, RepairOrder};

use crate::sheets::SheetsClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Mirror write succeeded.
    Synced,
    /// Mirroring inapplicable: not configured, or no row position supplied.
    Skipped,
    /// Primary write persisted, mirror write failed.
    Failed,
}

pub async fn mirror_repair_created(client: Option<SheetsClient>, order: &RepairOrder) -> SyncOutcome {
    let Some(client) = client else {
        return SyncOutcome::Skipped;
    };

    match client.append_repair(order).await {
        Ok(()) => SyncOutcome::Synced,
        Err(e) => {
            warn!("Repair order {} saved but not mirrored: {e}", order.id);
            SyncOutcome::Failed
        }
    }
}

pub async fn mirror_job_created(client: Option<SheetsClient>, order: &JobOrder) -> SyncOutcome {
    let Some(client) = client else {
        return SyncOutcome::Skipped;
    };

    match client.append_job(order).await {
        Ok(()) => SyncOutcome::Synced,
        Err(e) => {
            warn!("Job order {} saved but not mirrored: {e}", order.id);
            SyncOutcome::Failed
        }
    }
}

/// Updates are positionally addressed; without a caller-supplied row index
/// there is nothing to overwrite, so the mirror is skipped.
pub async fn mirror_repair_updated(
    client: Option<SheetsClient>,
    order: &RepairOrder,
    row_index: Option<usize>,
) -> SyncOutcome {
    let (Some(client), Some(row_index)) = (client, row_index) else {
        return SyncOutcome::Skipped;
    };

    match client.update_repair(order, row_index).await {
        Ok(()) => SyncOutcome::Synced,
        Err(e) => {
            warn!("Repair order {} updated but not mirrored: {e}", order.id);
            SyncOutcome::Failed
        }
    }
}

pub async fn mirror_job_updated(
    client: Option<SheetsClient>,
    order: &JobOrder,
    row_index: Option<usize>,
) -> SyncOutcome {
    let (Some(client), Some(row_index)) = (client, row_index) else {
        return SyncOutcome::Skipped;
    };

    match client.update_job(order, row_index).await {
        Ok(()) => SyncOutcome::Synced,
        Err(e) => {
            warn!("Job order {} updated but not mirrored: {e}", order.id);
            SyncOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use orders::model::{OrderStatus, RepairFields, RepairOrder, next_order_id};

    use crate::{
        sheets::{SheetsClient, SheetsConfig},
        store::{FallbackStore, OrderStore},
    };

    use super::{SyncOutcome, mirror_repair_created, mirror_repair_updated};

    fn jane() -> RepairFields {
        RepairFields {
            customer_name: "Jane Doe".to_string(),
            phone_number: "555-1111".to_string(),
            damage: "torn strap".to_string(),
            price: 25.0,
            picture: None,
            deadline: "2024-06-01".parse().unwrap(),
            status: OrderStatus::default(),
        }
    }

    fn unreachable_client() -> SheetsClient {
        SheetsClient::with_base_url(
            SheetsConfig {
                spreadsheet_id: "sheet-123".to_string(),
                api_key: "key-456".to_string(),
                repair_range: "Repairs!A:H".to_string(),
                job_range: "Jobs!A:I".to_string(),
            },
            // closed port: connections are refused immediately
            "http://127.0.0.1:9".to_string(),
        )
    }

    #[tokio::test]
    async fn unconfigured_mirror_is_skipped() {
        let store = FallbackStore::<RepairOrder>::load(
            &std::env::temp_dir().join(next_order_id("bagcraft-sync-test")),
        )
        .unwrap();
        let id = store.create(jane()).await.unwrap();
        let order = store.get(&id).await.unwrap().unwrap();

        assert_eq!(mirror_repair_created(None, &order).await, SyncOutcome::Skipped);
        assert_eq!(
            mirror_repair_updated(None, &order, Some(0)).await,
            SyncOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn update_without_a_row_position_is_skipped() {
        let store = FallbackStore::<RepairOrder>::load(
            &std::env::temp_dir().join(next_order_id("bagcraft-sync-test")),
        )
        .unwrap();
        let id = store.create(jane()).await.unwrap();
        let order = store.get(&id).await.unwrap().unwrap();

        assert_eq!(
            mirror_repair_updated(Some(unreachable_client()), &order, None).await,
            SyncOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn primary_write_survives_a_failed_mirror() {
        let store = FallbackStore::<RepairOrder>::load(
            &std::env::temp_dir().join(next_order_id("bagcraft-sync-test")),
        )
        .unwrap();
        let id = store.create(jane()).await.unwrap();
        let order = store.get(&id).await.unwrap().unwrap();

        let outcome = mirror_repair_created(Some(unreachable_client()), &order).await;

        assert_eq!(outcome, SyncOutcome::Failed);
        // the record stays persisted: partial success, not a rollback
        assert!(store.list().await.unwrap().iter().any(|o| o.id == id));
    }
}
