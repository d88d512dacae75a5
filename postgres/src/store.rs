//! Request store backed by the `blood_requests` table.

use std::sync::Arc;

use bloodbank_core::environment::Clock;
use bloodbank_core::{
    BloodRequest, BloodType, DateTime, Error, NewBloodRequest, RequestDetails, RequestId,
    RequestStatus, RequestStore, RequesterId, Result, StorageError, Urgency, UrgencyFilter, Utc,
};
use futures::future::BoxFuture;
use sqlx::{PgExecutor, PgPool, Row};
use uuid::Uuid;

use crate::{corrupt, storage_error};

const COLUMNS: &str = "id, requester_id, blood_type, quantity, urgency, status, \
                       city, hospital, patient_name, contact_number, notes, \
                       created_at, updated_at";

/// `PostgreSQL` request store.
///
/// Listings order by `created_at` descending, then by insertion order
/// descending for requests created in the same instant.
#[derive(Clone)]
pub struct PostgresRequestStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresRequestStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select(&self, condition: &str, bind: Bind) -> Result<Vec<BloodRequest>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM blood_requests WHERE {condition} \
             ORDER BY created_at DESC, seq DESC"
        );
        let query = sqlx::query(&sql);
        let query = match bind {
            Bind::None => query,
            Bind::Texts(values) => query.bind(values),
            Bind::Uuid(value) => query.bind(value),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(storage_error)?;
        Ok(rows
            .iter()
            .map(row_to_request)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// The single parameter a listing query takes.
enum Bind {
    None,
    Texts(Vec<String>),
    Uuid(Uuid),
}

fn row_to_request(row: &sqlx::postgres::PgRow) -> std::result::Result<BloodRequest, StorageError> {
    let blood_type: String = row.try_get("blood_type").map_err(storage_error)?;
    let quantity: i32 = row.try_get("quantity").map_err(storage_error)?;
    let urgency: String = row.try_get("urgency").map_err(storage_error)?;
    let status: String = row.try_get("status").map_err(storage_error)?;

    Ok(BloodRequest {
        id: RequestId::from_uuid(row.try_get("id").map_err(storage_error)?),
        requester_id: RequesterId::from_uuid(row.try_get("requester_id").map_err(storage_error)?),
        blood_type: blood_type
            .parse::<BloodType>()
            .map_err(|e| corrupt("blood_type", e))?,
        quantity: u32::try_from(quantity).map_err(|e| corrupt("quantity", e))?,
        urgency: urgency
            .parse::<Urgency>()
            .map_err(|e| corrupt("urgency", e))?,
        status: status
            .parse::<RequestStatus>()
            .map_err(|e| corrupt("status", e))?,
        details: RequestDetails {
            city: row.try_get("city").map_err(storage_error)?,
            hospital: row.try_get("hospital").map_err(storage_error)?,
            patient_name: row.try_get("patient_name").map_err(storage_error)?,
            contact_number: row.try_get("contact_number").map_err(storage_error)?,
            notes: row.try_get("notes").map_err(storage_error)?,
        },
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

/// Whether a read locks the row until the surrounding transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowLock {
    None,
    ForUpdate,
}

pub(crate) async fn fetch<'c, E>(
    executor: E,
    id: RequestId,
    lock: RowLock,
) -> Result<Option<BloodRequest>>
where
    E: PgExecutor<'c>,
{
    let suffix = match lock {
        RowLock::None => "",
        RowLock::ForUpdate => " FOR UPDATE",
    };
    let sql = format!("SELECT {COLUMNS} FROM blood_requests WHERE id = $1{suffix}");
    let row = sqlx::query(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(storage_error)?;

    Ok(row.as_ref().map(row_to_request).transpose()?)
}

pub(crate) async fn insert<'c, E>(
    executor: E,
    request: NewBloodRequest,
    status: RequestStatus,
    now: DateTime<Utc>,
) -> Result<BloodRequest>
where
    E: PgExecutor<'c>,
{
    request.validate()?;
    let quantity = i32::try_from(request.quantity)
        .map_err(|_| Error::Validation("quantity is too large".to_string()))?;
    let record = BloodRequest::from_new(RequestId::new(), request, status, now);

    sqlx::query(
        r"
        INSERT INTO blood_requests (
            id, requester_id, blood_type, quantity, urgency, status,
            city, hospital, patient_name, contact_number, notes,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ",
    )
    .bind(*record.id.as_uuid())
    .bind(*record.requester_id.as_uuid())
    .bind(record.blood_type.as_str())
    .bind(quantity)
    .bind(record.urgency.as_str())
    .bind(record.status.as_str())
    .bind(&record.details.city)
    .bind(&record.details.hospital)
    .bind(&record.details.patient_name)
    .bind(&record.details.contact_number)
    .bind(record.details.notes.as_deref())
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor)
    .await
    .map_err(storage_error)?;

    tracing::debug!(request_id = %record.id, status = %record.status, "Request inserted");
    Ok(record)
}

/// Set `status` if the stored status is one of its legal predecessors.
///
/// `None` when nothing matched: the id is unknown or the move is illegal.
pub(crate) async fn compare_and_set<'c, E>(
    executor: E,
    id: RequestId,
    status: RequestStatus,
    now: DateTime<Utc>,
) -> Result<Option<BloodRequest>>
where
    E: PgExecutor<'c>,
{
    let predecessors: Vec<String> = status
        .legal_predecessors()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    let sql = format!(
        "UPDATE blood_requests SET status = $2, updated_at = $3 \
         WHERE id = $1 AND status = ANY($4) RETURNING {COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(*id.as_uuid())
        .bind(status.as_str())
        .bind(now)
        .bind(predecessors)
        .fetch_optional(executor)
        .await
        .map_err(storage_error)?;

    Ok(row.as_ref().map(row_to_request).transpose()?)
}

impl RequestStore for PostgresRequestStore {
    fn create(
        &self,
        request: NewBloodRequest,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(insert(&self.pool, request, status, self.clock.now()))
    }

    fn get(&self, id: RequestId) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            fetch(&self.pool, id, RowLock::None)
                .await?
                .ok_or(Error::NotFound(id))
        })
    }

    fn set_status(
        &self,
        id: RequestId,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            let now = self.clock.now();
            if let Some(updated) = compare_and_set(&self.pool, id, status, now).await? {
                return Ok(updated);
            }

            // Nothing matched: either the id is unknown or the stored status forbids the move
            let current = fetch(&self.pool, id, RowLock::None)
                .await?
                .ok_or(Error::NotFound(id))?;
            Err(Error::InvalidTransition {
                id,
                from: current.status,
                to: status,
            })
        })
    }

    fn list_pending(&self, filter: UrgencyFilter) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move {
            let urgencies: Vec<String> = Urgency::ALL
                .into_iter()
                .filter(|u| filter.matches(*u))
                .map(|u| u.as_str().to_string())
                .collect();
            self.select("status = 'pending' AND urgency = ANY($1)", Bind::Texts(urgencies))
                .await
        })
    }

    fn list_by_requester(
        &self,
        requester: RequesterId,
    ) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move {
            self.select("requester_id = $1", Bind::Uuid(*requester.as_uuid()))
                .await
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move { self.select("TRUE", Bind::None).await })
    }
}
