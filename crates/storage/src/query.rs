//! Query Service
//!
//! Structured read/delete requests over the stored frames. Table, column,
//! operator and sort identifiers are checked against the known schemas
//! before they reach the SQL text; every caller value is bound.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::schema::{TableSchema, TIME_COLUMN};
use crate::QueryError;

const DEFAULT_LIMIT: i64 = 100;
const OPERATORS: [&str; 8] = ["=", "!=", "<>", "<", "<=", ">", ">=", "LIKE"];

/// Selected columns: `"*"`, `["*"]` or an explicit list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Fields {
    All(String),
    List(Vec<String>),
}

impl Fields {
    fn is_all(&self) -> bool {
        match self {
            Fields::All(s) => s == "*",
            Fields::List(list) => list.len() == 1 && list[0] == "*",
        }
    }
}

/// Inclusive capture-time window; either end may be open
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RowFilter {
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default = "default_order")]
    pub order: String,
}

fn default_order() -> String {
    "ASC".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    pub table: String,
    pub fields: Fields,
    #[serde(default)]
    pub filter: RowFilter,
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteRequest {
    pub table: String,
    #[serde(default)]
    pub filter: RowFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
}

/// Response envelope shared by query, realtime and delete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
}

impl QueryResponse {
    fn error(err: &QueryError) -> Self {
        Self {
            status: QueryStatus::Error,
            message: err.to_string(),
            data: None,
            columns: None,
            deleted: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

/// Read/delete access to the frame tables through a small pool
#[derive(Clone)]
pub struct QueryService {
    pool: SqlitePool,
}

impl QueryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database file
    pub async fn connect(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, QueryError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .busy_timeout(busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Parse and run a JSON query request
    pub async fn handle_query(&self, request: Value) -> QueryResponse {
        match serde_json::from_value::<QueryRequest>(request) {
            Ok(request) => self.query(request).await,
            Err(e) => QueryResponse::error(&QueryError::InvalidRequest(e.to_string())),
        }
    }

    /// Parse and run a JSON realtime request
    pub async fn handle_realtime(&self, request: Value) -> QueryResponse {
        match serde_json::from_value::<QueryRequest>(request) {
            Ok(request) => self.realtime(request).await,
            Err(e) => QueryResponse::error(&QueryError::InvalidRequest(e.to_string())),
        }
    }

    /// Parse and run a JSON delete request
    pub async fn handle_delete(&self, request: Value) -> QueryResponse {
        match serde_json::from_value::<DeleteRequest>(request) {
            Ok(request) => self.delete(request).await,
            Err(e) => QueryResponse::error(&QueryError::InvalidRequest(e.to_string())),
        }
    }

    pub async fn query(&self, request: QueryRequest) -> QueryResponse {
        match self.run_query(&request).await {
            Ok((columns, data)) => {
                let message = if data.is_empty() {
                    "No results found."
                } else {
                    "Query processed successfully"
                };
                QueryResponse {
                    status: QueryStatus::Success,
                    message: message.to_string(),
                    data: Some(data),
                    columns: Some(columns),
                    deleted: None,
                }
            }
            Err(e) => {
                warn!(table = %request.table, "Query rejected: {}", e);
                QueryResponse::error(&e)
            }
        }
    }

    /// Latest row of a table: newest capture time first, one row
    pub async fn realtime(&self, mut request: QueryRequest) -> QueryResponse {
        request.sort = Some(SortSpec {
            field: TIME_COLUMN.to_string(),
            order: "DESC".to_string(),
        });
        request.pagination = Pagination {
            offset: 0,
            limit: 1,
        };
        self.query(request).await
    }

    /// Remove rows inside a capture-time window
    pub async fn delete(&self, request: DeleteRequest) -> QueryResponse {
        match self.run_delete(&request).await {
            Ok(deleted) => QueryResponse {
                status: QueryStatus::Success,
                message: "Data records deleted successfully.".to_string(),
                data: None,
                columns: None,
                deleted: Some(deleted),
            },
            Err(e) => {
                warn!(table = %request.table, "Delete rejected: {}", e);
                QueryResponse::error(&e)
            }
        }
    }

    async fn run_query(
        &self,
        request: &QueryRequest,
    ) -> Result<(Vec<String>, Vec<Vec<Value>>), QueryError> {
        let schema = table(&request.table)?;

        let columns: Vec<String> = if request.fields.is_all() {
            schema.columns().into_iter().map(String::from).collect()
        } else {
            let list = match &request.fields {
                Fields::List(list) if !list.is_empty() => list.clone(),
                Fields::List(_) => {
                    return Err(QueryError::InvalidRequest("fields list is empty".into()))
                }
                Fields::All(other) => {
                    return Err(QueryError::InvalidRequest(format!(
                        "fields must be \"*\" or a list, got \"{}\"",
                        other
                    )))
                }
            };
            for column in &list {
                column_of(schema, column)?;
            }
            list
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(columns.join(", ")).push(" FROM ").push(schema.name);
        push_filter(&mut qb, schema, &request.filter)?;

        if let Some(sort) = &request.sort {
            let field = column_of(schema, &sort.field)?;
            let order = match sort.order.to_ascii_uppercase().as_str() {
                "ASC" => "ASC",
                "DESC" => "DESC",
                _ => return Err(QueryError::InvalidSortOrder(sort.order.clone())),
            };
            qb.push(" ORDER BY ").push(field).push(" ").push(order);
            if field != "id" {
                qb.push(", id ").push(order);
            }
        }

        let Pagination { offset, limit } = request.pagination;
        if limit < 0 || offset < 0 {
            return Err(QueryError::InvalidRequest(
                "pagination offset and limit must not be negative".into(),
            ));
        }
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        debug!(sql = qb.sql(), "Running query");
        let rows = qb.build().fetch_all(&self.pool).await?;
        let data = rows
            .iter()
            .map(|row| row_values(row, columns.len()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((columns, data))
    }

    async fn run_delete(&self, request: &DeleteRequest) -> Result<u64, QueryError> {
        let schema = table(&request.table)?;
        let has_range = request
            .filter
            .time_range
            .as_ref()
            .map(|r| r.start.is_some() || r.end.is_some())
            .unwrap_or(false);
        if !has_range {
            return Err(QueryError::MissingTimeRange);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM ");
        qb.push(schema.name);
        push_filter(&mut qb, schema, &request.filter)?;

        debug!(sql = qb.sql(), "Running delete");
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn table(name: &str) -> Result<&'static TableSchema, QueryError> {
    TableSchema::by_name(name).ok_or_else(|| QueryError::UnknownTable(name.to_string()))
}

fn column_of<'a>(schema: &TableSchema, column: &'a str) -> Result<&'a str, QueryError> {
    if schema.has_column(column) {
        Ok(column)
    } else {
        Err(QueryError::UnknownColumn {
            table: schema.name.to_string(),
            column: column.to_string(),
        })
    }
}

fn push_filter(
    qb: &mut QueryBuilder<'_, Sqlite>,
    schema: &TableSchema,
    filter: &RowFilter,
) -> Result<(), QueryError> {
    let mut sep = " WHERE ";

    if let Some(range) = &filter.time_range {
        match (&range.start, &range.end) {
            (Some(start), Some(end)) => {
                qb.push(sep)
                    .push(TIME_COLUMN)
                    .push(" BETWEEN ")
                    .push_bind(start.clone())
                    .push(" AND ")
                    .push_bind(end.clone());
                sep = " AND ";
            }
            (Some(start), None) => {
                qb.push(sep).push(TIME_COLUMN).push(" >= ").push_bind(start.clone());
                sep = " AND ";
            }
            (None, Some(end)) => {
                qb.push(sep).push(TIME_COLUMN).push(" <= ").push_bind(end.clone());
                sep = " AND ";
            }
            (None, None) => {}
        }
    }

    for cond in &filter.conditions {
        let field = column_of(schema, &cond.field)?;
        let op = cond.op.trim().to_ascii_uppercase();
        let op = OPERATORS
            .iter()
            .find(|candidate| **candidate == op)
            .ok_or_else(|| QueryError::UnsupportedOperator(cond.op.clone()))?;

        qb.push(sep).push(field).push(" ").push(*op).push(" ");
        match &cond.value {
            Value::String(s) => {
                qb.push_bind(s.clone());
            }
            Value::Bool(b) => {
                qb.push_bind(i64::from(*b));
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    qb.push_bind(i);
                } else if let Some(f) = n.as_f64() {
                    qb.push_bind(f);
                } else {
                    return Err(QueryError::InvalidValue(cond.field.clone()));
                }
            }
            _ => return Err(QueryError::InvalidValue(cond.field.clone())),
        }
        sep = " AND ";
    }

    Ok(())
}

/// Typed JSON cells of one row
fn row_values(row: &SqliteRow, width: usize) -> Result<Vec<Value>, sqlx::Error> {
    (0..width)
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let kind = raw.type_info().name().to_ascii_uppercase();
            Ok(match kind.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(i)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                _ => Value::from(row.try_get::<String, _>(i)?),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameStore, StoreOptions};
    use chrono::{Local, TimeZone};
    use frame_protocol::{FrameVariant, RawFrame};
    use serde_json::json;

    fn lop1_frame1(rpm: u16, minute: u32) -> frame_decoder::Measurement {
        let mut bytes = [0u8; 35];
        bytes[5..7].copy_from_slice(&rpm.to_be_bytes());
        bytes[7..9].copy_from_slice(&250u16.to_be_bytes());
        let raw = RawFrame::from_bytes(FrameVariant::Lop1Frame1, &bytes).unwrap();
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap();
        frame_decoder::decode_at(raw, at)
    }

    /// Store with rows at 12:00, 12:01 ... 12:04 and rpm 1000, 1100 ... 1400
    async fn seeded(dir: &tempfile::TempDir) -> QueryService {
        let options = StoreOptions {
            path: dir.path().join("lop.db"),
            ..StoreOptions::default()
        };
        let mut store = FrameStore::open(&options).await.unwrap();
        store.bootstrap().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        for i in 0..5u32 {
            tx.insert("engine", &lop1_frame1(1000 + 100 * i as u16, i))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        store.close().await.unwrap();

        QueryService::connect(&options.path, Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_selected_fields_with_condition() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let response = service
            .handle_query(json!({
                "table": "lop1_frame1",
                "fields": ["rpm", "oil_pressure"],
                "filter": { "conditions": [{ "field": "rpm", "op": ">=", "value": 1200 }] },
                "sort": { "field": "rpm", "order": "asc" }
            }))
            .await;

        assert!(response.is_success(), "{}", response.message);
        assert_eq!(response.columns, Some(vec!["rpm".to_string(), "oil_pressure".to_string()]));
        assert_eq!(
            response.data,
            Some(vec![
                vec![json!(1200), json!(2.5)],
                vec![json!(1300), json!(2.5)],
                vec![json!(1400), json!(2.5)],
            ])
        );
    }

    #[tokio::test]
    async fn test_query_star_and_time_range() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let response = service
            .handle_query(json!({
                "table": "lop1_frame1",
                "fields": "*",
                "filter": { "time_range": { "start": "2024-05-01 12:01:00", "end": "2024-05-01 12:02:00" } },
                "sort": { "field": "id" },
                "pagination": { "limit": 10 }
            }))
            .await;

        assert!(response.is_success());
        let columns = response.columns.unwrap();
        assert_eq!(columns[0], "id");
        let data = response.data.unwrap();
        assert_eq!(data.len(), 2);
        let rpm = columns.iter().position(|c| c == "rpm").unwrap();
        assert_eq!(data[0][rpm], json!(1100));
        assert_eq!(data[1][rpm], json!(1200));
        let time = columns.iter().position(|c| c == "received_time").unwrap();
        assert_eq!(data[0][time], json!("2024-05-01 12:01:00"));
    }

    #[tokio::test]
    async fn test_realtime_returns_latest() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let response = service
            .handle_realtime(json!({ "table": "lop1_frame1", "fields": ["rpm"] }))
            .await;
        assert_eq!(response.data, Some(vec![vec![json!(1400)]]));
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let response = service
            .handle_query(json!({ "table": "lop2_frame", "fields": ["*"] }))
            .await;
        assert!(response.is_success());
        assert_eq!(response.data, Some(vec![]));
        assert_eq!(response.message, "No results found.");
    }

    #[tokio::test]
    async fn test_identifiers_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let unknown_table = service
            .handle_query(json!({ "table": "sqlite_master", "fields": "*" }))
            .await;
        assert_eq!(unknown_table.status, QueryStatus::Error);

        let injected_column = service
            .handle_query(json!({ "table": "lop1_frame1", "fields": ["rpm; DROP TABLE lop1_frame1"] }))
            .await;
        assert_eq!(injected_column.status, QueryStatus::Error);

        let bad_op = service
            .handle_query(json!({
                "table": "lop1_frame1",
                "fields": "*",
                "filter": { "conditions": [{ "field": "rpm", "op": "OR 1=1 --", "value": 0 }] }
            }))
            .await;
        assert_eq!(bad_op.status, QueryStatus::Error);

        let bad_order = service
            .handle_query(json!({
                "table": "lop1_frame1",
                "fields": "*",
                "sort": { "field": "rpm", "order": "SIDEWAYS" }
            }))
            .await;
        assert_eq!(bad_order.status, QueryStatus::Error);

        // Values are bound, so quotes are just data
        let quoted = service
            .handle_query(json!({
                "table": "lop1_frame1",
                "fields": ["id"],
                "filter": { "conditions": [{ "field": "device_id", "op": "=", "value": "x' OR '1'='1" }] }
            }))
            .await;
        assert!(quoted.is_success());
        assert_eq!(quoted.data, Some(vec![]));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let response = service.handle_query(json!({ "table": "lop1_frame1" })).await;
        assert_eq!(response.status, QueryStatus::Error);
        assert!(response.message.contains("fields"));
    }

    #[tokio::test]
    async fn test_delete_requires_range_and_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let service = seeded(&dir).await;

        let refused = service.handle_delete(json!({ "table": "lop1_frame1" })).await;
        assert_eq!(refused.status, QueryStatus::Error);
        assert_eq!(refused.message, "Missing time range");

        let deleted = service
            .handle_delete(json!({
                "table": "lop1_frame1",
                "filter": { "time_range": { "end": "2024-05-01 12:02:00" } }
            }))
            .await;
        assert!(deleted.is_success());
        assert_eq!(deleted.deleted, Some(3));

        let remaining = service
            .handle_query(json!({ "table": "lop1_frame1", "fields": ["rpm"], "sort": { "field": "id" } }))
            .await;
        assert_eq!(remaining.data, Some(vec![vec![json!(1300)], vec![json!(1400)]]));
    }
}
