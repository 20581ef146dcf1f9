//! Spreadsheet row codec.
//!
//! Repair rows: `[id, customerName, phoneNumber, damage, price, deadline,
//! status, createdAt]`. Job rows carry `description` and `quantity` in place
//! of `damage`. The first row of every range is a header and is always
//! discarded. Parsing is total: malformed cells fall back to defaults, a row
//! is never rejected.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{JobOrder, OrderRecord, OrderStatus, RepairOrder, next_order_id};

pub const REPAIR_COLUMNS: usize = 8;
pub const JOB_COLUMNS: usize = 9;

pub fn repair_to_row(order: &RepairOrder) -> Vec<String> {
    vec![
        order.id.clone(),
        order.customer_name.clone(),
        order.phone_number.clone(),
        order.damage.clone(),
        order.price.to_string(),
        order.deadline.to_string(),
        order.status.as_str().to_string(),
        order.created_at.to_rfc3339(),
    ]
}

pub fn job_to_row(order: &JobOrder) -> Vec<String> {
    vec![
        order.id.clone(),
        order.customer_name.clone(),
        order.phone_number.clone(),
        order.description.clone(),
        order.quantity.to_string(),
        order.price.to_string(),
        order.deadline.to_string(),
        order.status.as_str().to_string(),
        order.created_at.to_rfc3339(),
    ]
}

pub fn parse_repairs(rows: &[Vec<String>]) -> Vec<RepairOrder> {
    rows.iter().skip(1).map(parse_repair_row).collect()
}

pub fn parse_jobs(rows: &[Vec<String>]) -> Vec<JobOrder> {
    rows.iter().skip(1).map(parse_job_row).collect()
}

fn parse_repair_row(row: &Vec<String>) -> RepairOrder {
    RepairOrder {
        id: id_or_fresh(cell(row, 0), RepairOrder::ID_PREFIX),
        customer_name: cell(row, 1),
        phone_number: cell(row, 2),
        damage: cell(row, 3),
        price: parse_price(&cell(row, 4)),
        picture: None,
        deadline: parse_deadline(&cell(row, 5)),
        status: OrderStatus::parse(&cell(row, 6)).unwrap_or_default(),
        created_at: parse_created_at(&cell(row, 7)),
    }
}

fn parse_job_row(row: &Vec<String>) -> JobOrder {
    JobOrder {
        id: id_or_fresh(cell(row, 0), JobOrder::ID_PREFIX),
        customer_name: cell(row, 1),
        phone_number: cell(row, 2),
        description: cell(row, 3),
        quantity: cell(row, 4).trim().parse().unwrap_or(1),
        price: parse_price(&cell(row, 5)),
        deadline: parse_deadline(&cell(row, 6)),
        status: OrderStatus::parse(&cell(row, 7)).unwrap_or_default(),
        created_at: parse_created_at(&cell(row, 8)),
    }
}

fn cell(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

fn id_or_fresh(raw: String, prefix: &str) -> String {
    if raw.trim().is_empty() {
        next_order_id(prefix)
    } else {
        raw
    }
}

fn parse_price(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

fn parse_deadline(raw: &str) -> NaiveDate {
    raw.trim()
        .parse()
        .unwrap_or_else(|_| Utc::now().date_naive())
}

fn parse_created_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|stamp| stamp.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{job_to_row, parse_jobs, parse_repairs, repair_to_row};
    use crate::model::{JobOrder, OrderStatus, RepairOrder};

    fn header(columns: usize) -> Vec<String> {
        (0..columns).map(|i| format!("Column {i}")).collect()
    }

    fn repair() -> RepairOrder {
        RepairOrder {
            id: "repair-1717000000000-4".to_string(),
            customer_name: "Jane Doe".to_string(),
            phone_number: "555-1111".to_string(),
            damage: "torn strap".to_string(),
            price: 25.0,
            picture: None,
            deadline: "2024-06-01".parse().unwrap(),
            status: OrderStatus::Pending,
            created_at: "2024-05-20T09:30:00Z".parse().unwrap(),
        }
    }

    fn job() -> JobOrder {
        JobOrder {
            id: "job-1717000000000-7".to_string(),
            customer_name: "Acme Corp".to_string(),
            phone_number: "555-2222".to_string(),
            description: "canvas tote batch".to_string(),
            quantity: 40,
            price: 800.0,
            deadline: "2024-07-15".parse().unwrap(),
            status: OrderStatus::Rescheduled,
            created_at: "2024-05-21T14:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn repair_row_round_trips() {
        let original = repair();
        let rows = vec![header(8), repair_to_row(&original)];

        let parsed = parse_repairs(&rows);

        assert_eq!(parsed, vec![original]);
    }

    #[test]
    fn job_row_round_trips() {
        let original = job();
        let rows = vec![header(9), job_to_row(&original)];

        let parsed = parse_jobs(&rows);

        assert_eq!(parsed, vec![original]);
    }

    #[test]
    fn first_row_is_always_discarded() {
        let rows = vec![repair_to_row(&repair())];

        assert!(parse_repairs(&rows).is_empty());
        assert!(parse_repairs(&[]).is_empty());
    }

    #[test]
    fn malformed_cells_fall_back_to_defaults() {
        let rows = vec![
            header(8),
            vec![
                String::new(),
                "Jane Doe".to_string(),
                "555-1111".to_string(),
                "torn strap".to_string(),
                "not a number".to_string(),
                "someday".to_string(),
                "mystery".to_string(),
                "yesterday".to_string(),
            ],
        ];

        let parsed = parse_repairs(&rows);

        assert_eq!(parsed.len(), 1);
        let order = &parsed[0];
        assert!(order.id.starts_with("repair-"));
        assert_eq!(order.price, 0.0);
        assert_eq!(order.deadline, Utc::now().date_naive());
        assert_eq!(order.status, OrderStatus::Pending);
        assert!((Utc::now() - order.created_at).num_seconds() < 5);
    }

    #[test]
    fn short_rows_parse_without_error() {
        let rows = vec![header(9), vec!["job-1".to_string()]];

        let parsed = parse_jobs(&rows);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "job-1");
        assert_eq!(parsed[0].customer_name, "");
        assert_eq!(parsed[0].quantity, 1);
        assert_eq!(parsed[0].price, 0.0);
    }
}
