//! Flat row shapes for tables whose domain type (`Job`) isn't itself
//! column-flat (`PaySpec`, `GeoLocation` are nested), plus the conversions
//! between them.
//!
//! `Transaction`, `PaymentSplit`, and `PaymentEvent` are already
//! column-flat and derive `sqlx::FromRow` directly in `jobflow_types`.

use chrono::{DateTime, Utc};
use jobflow_types::{GeoLocation, Job, JobId, JobStatus, PaySpec, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub sequence_number: i64,
    pub consumer_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pay_per_hour: Option<Decimal>,
    pub pay_total: Option<Decimal>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub worker_completed_at: Option<DateTime<Utc>>,
    pub consumer_completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub workflow_id: Option<Uuid>,
    pub workflow_run_id: Option<Uuid>,
    pub workflow_started_at: Option<DateTime<Utc>>,
    pub workflow_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let pay_spec = match (row.pay_per_hour, row.pay_total) {
            (Some(rate), None) => PaySpec::PerHour(rate),
            (None, Some(total)) => PaySpec::Total(total),
            _ => {
                return Err(StoreError::InvalidState(format!(
                    "job {} has an invalid pay spec row (expected exactly one of pay_per_hour/pay_total)",
                    row.id
                )));
            }
        };
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation { latitude, longitude }),
            _ => None,
        };

        Ok(Job {
            id: JobId(row.id),
            sequence_number: row.sequence_number,
            consumer_id: UserId(row.consumer_id),
            worker_id: row.worker_id.map(UserId),
            title: row.title,
            description: row.description,
            category: row.category,
            address: row.address,
            location,
            pay_spec,
            scheduled_start: row.scheduled_start,
            scheduled_end: row.scheduled_end,
            actual_start: row.actual_start,
            actual_end: row.actual_end,
            worker_completed_at: row.worker_completed_at,
            consumer_completed_at: row.consumer_completed_at,
            status: row.status,
            workflow_id: row.workflow_id,
            workflow_run_id: row.workflow_run_id,
            workflow_started_at: row.workflow_started_at,
            workflow_completed_at: row.workflow_completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// The `(pay_per_hour, pay_total)` column pair a `PaySpec` maps to.
pub fn pay_spec_columns(spec: &PaySpec) -> (Option<Decimal>, Option<Decimal>) {
    match spec {
        PaySpec::PerHour(rate) => (Some(*rate), None),
        PaySpec::Total(total) => (None, Some(*total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_row() -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            sequence_number: 1,
            consumer_id: Uuid::new_v4(),
            worker_id: None,
            title: "Mow the lawn".into(),
            description: "Front and back".into(),
            category: "yard".into(),
            address: "123 Main St".into(),
            latitude: None,
            longitude: None,
            pay_per_hour: None,
            pay_total: Some(dec!(100.00)),
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
            worker_completed_at: None,
            consumer_completed_at: None,
            status: JobStatus::Posted,
            workflow_id: None,
            workflow_run_id: None,
            workflow_started_at: None,
            workflow_completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_with_total_pay_converts() {
        let job = Job::try_from(base_row()).unwrap();
        assert_eq!(job.pay_spec, PaySpec::Total(dec!(100.00)));
    }

    #[test]
    fn row_with_both_pay_columns_set_is_rejected() {
        let mut row = base_row();
        row.pay_per_hour = Some(dec!(25.00));
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn row_with_neither_pay_column_set_is_rejected() {
        let mut row = base_row();
        row.pay_total = None;
        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn pay_spec_columns_round_trips() {
        assert_eq!(
            pay_spec_columns(&PaySpec::PerHour(dec!(25.00))),
            (Some(dec!(25.00)), None)
        );
        assert_eq!(
            pay_spec_columns(&PaySpec::Total(dec!(100.00))),
            (None, Some(dec!(100.00)))
        );
    }
}
