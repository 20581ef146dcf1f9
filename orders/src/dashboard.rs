//! Dashboard projection: per-status counts for both collections and the
//! deadline-ordered view of work due in the next week. Pure computation over
//! live snapshots, no state of its own.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::model::{JobOrder, OrderStatus, RepairOrder};

const DEADLINE_WINDOW_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_repairs: usize,
    pub total_jobs: usize,
    pub pending_repairs: usize,
    pub pending_jobs: usize,
    pub completed_repairs: usize,
    pub completed_jobs: usize,
    pub rescheduled_repairs: usize,
    pub rescheduled_jobs: usize,
}

pub fn stats(repairs: &[RepairOrder], jobs: &[JobOrder]) -> DashboardStats {
    let count_repairs =
        |status: OrderStatus| repairs.iter().filter(|order| order.status == status).count();
    let count_jobs = |status: OrderStatus| jobs.iter().filter(|order| order.status == status).count();

    DashboardStats {
        total_repairs: repairs.len(),
        total_jobs: jobs.len(),
        pending_repairs: count_repairs(OrderStatus::Pending),
        pending_jobs: count_jobs(OrderStatus::Pending),
        completed_repairs: count_repairs(OrderStatus::Done),
        completed_jobs: count_jobs(OrderStatus::Done),
        rescheduled_repairs: count_repairs(OrderStatus::Rescheduled),
        rescheduled_jobs: count_jobs(OrderStatus::Rescheduled),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineEntry {
    pub id: String,
    pub kind: &'static str,
    pub customer_name: String,
    pub deadline: NaiveDate,
    pub status: OrderStatus,
    pub price: f64,
}

/// Orders due within the next week, both variants merged, earliest deadline
/// first. Finished work is excluded.
pub fn upcoming_deadlines(
    repairs: &[RepairOrder],
    jobs: &[JobOrder],
    today: NaiveDate,
) -> Vec<DeadlineEntry> {
    let horizon = today + Duration::days(DEADLINE_WINDOW_DAYS);
    let due = |deadline: NaiveDate, status: OrderStatus| {
        deadline >= today && deadline <= horizon && status != OrderStatus::Done
    };

    let mut entries: Vec<DeadlineEntry> = repairs
        .iter()
        .filter(|order| due(order.deadline, order.status))
        .map(|order| DeadlineEntry {
            id: order.id.clone(),
            kind: "repair",
            customer_name: order.customer_name.clone(),
            deadline: order.deadline,
            status: order.status,
            price: order.price,
        })
        .chain(
            jobs.iter()
                .filter(|order| due(order.deadline, order.status))
                .map(|order| DeadlineEntry {
                    id: order.id.clone(),
                    kind: "job",
                    customer_name: order.customer_name.clone(),
                    deadline: order.deadline,
                    status: order.status,
                    price: order.price,
                }),
        )
        .collect();

    entries.sort_by(|a, b| a.deadline.cmp(&b.deadline));
    entries
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};

    use super::{stats, upcoming_deadlines};
    use crate::model::{JobOrder, OrderStatus, RepairOrder};

    fn repair(id: &str, status: OrderStatus, deadline: NaiveDate) -> RepairOrder {
        RepairOrder {
            id: id.to_string(),
            customer_name: "Jane Doe".to_string(),
            phone_number: "555-1111".to_string(),
            damage: "torn strap".to_string(),
            price: 25.0,
            picture: None,
            deadline,
            status,
            created_at: Utc::now(),
        }
    }

    fn job(id: &str, status: OrderStatus, deadline: NaiveDate) -> JobOrder {
        JobOrder {
            id: id.to_string(),
            customer_name: "Acme Corp".to_string(),
            phone_number: "555-2222".to_string(),
            description: "canvas tote batch".to_string(),
            quantity: 40,
            price: 800.0,
            deadline,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stats_count_per_status_per_collection() {
        let today = Utc::now().date_naive();
        let repairs = vec![
            repair("r1", OrderStatus::Pending, today),
            repair("r2", OrderStatus::Pending, today),
            repair("r3", OrderStatus::Done, today),
        ];
        let jobs = vec![
            job("j1", OrderStatus::Rescheduled, today),
            job("j2", OrderStatus::Done, today),
        ];

        let result = stats(&repairs, &jobs);

        assert_eq!(result.total_repairs, 3);
        assert_eq!(result.total_jobs, 2);
        assert_eq!(result.pending_repairs, 2);
        assert_eq!(result.pending_jobs, 0);
        assert_eq!(result.completed_repairs, 1);
        assert_eq!(result.completed_jobs, 1);
        assert_eq!(result.rescheduled_repairs, 0);
        assert_eq!(result.rescheduled_jobs, 1);
    }

    #[test]
    fn deadlines_are_windowed_and_sorted() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let repairs = vec![
            repair("soon", OrderStatus::Pending, today + Duration::days(2)),
            repair("late", OrderStatus::Pending, today + Duration::days(8)),
            repair("finished", OrderStatus::Done, today + Duration::days(1)),
            repair("past", OrderStatus::Pending, today - Duration::days(1)),
        ];
        let jobs = vec![job("first", OrderStatus::Rescheduled, today)];

        let entries = upcoming_deadlines(&repairs, &jobs, today);

        let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "soon"]);
        assert_eq!(entries[0].kind, "job");
    }

    #[test]
    fn window_includes_its_boundaries() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let repairs = vec![
            repair("today", OrderStatus::Pending, today),
            repair("edge", OrderStatus::Pending, today + Duration::days(7)),
        ];

        let entries = upcoming_deadlines(&repairs, &[], today);

        assert_eq!(entries.len(), 2);
    }
}
