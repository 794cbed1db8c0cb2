use barakah_audit::{
    AuditAction, AuditEvent, AuditLog, AuditLogError, AuditLogFilter, AuditLogId, AuditResult,
};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{from_millis, to_millis, SqliteStore};

type AuditRow = (
    String,
    i64,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

const AUDIT_COLUMNS: &str = "id,timestamp,actor,user_id,action,resource_type,resource_id,\
                             result,reason,details,client_ip";

fn db_err(e: impl std::fmt::Display) -> AuditLogError {
    AuditLogError::Database(e.to_string())
}

fn event_from_row(row: AuditRow) -> Result<AuditEvent, AuditLogError> {
    let (
        id,
        timestamp,
        actor,
        user_id,
        action,
        resource_type,
        resource_id,
        result,
        reason,
        details,
        client_ip,
    ) = row;
    Ok(AuditEvent {
        id: id.parse::<AuditLogId>().map_err(db_err)?,
        timestamp: from_millis(timestamp).map_err(db_err)?,
        actor,
        user_id: user_id
            .map(|u| Uuid::try_parse(&u))
            .transpose()
            .map_err(db_err)?,
        action: action.parse::<AuditAction>().map_err(db_err)?,
        resource_type,
        resource_id,
        result: result.parse::<AuditResult>().map_err(db_err)?,
        reason,
        details: details
            .map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(db_err)?,
        client_ip,
    })
}

/// Appends `WHERE ...` clauses for every populated filter field.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditLogFilter) {
    qb.push(" WHERE 1=1");
    if let Some(actor) = &filter.actor {
        qb.push(" AND actor = ").push_bind(actor.clone());
    }
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.0.to_string());
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.to_string());
    }
    if let Some(result) = &filter.result {
        qb.push(" AND result = ").push_bind(result.to_string());
    }
    if let Some(from) = filter.from {
        qb.push(" AND timestamp >= ").push_bind(to_millis(from));
    }
    if let Some(to) = filter.to {
        qb.push(" AND timestamp < ").push_bind(to_millis(to));
    }
}

#[async_trait::async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(db_err)?;
        sqlx::query(
            "INSERT INTO audit_logs(id,timestamp,actor,user_id,action,resource_type,resource_id,
                result,reason,details,client_ip)
             VALUES(?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(event.id.to_string())
        .bind(to_millis(event.timestamp))
        .bind(&event.actor)
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(event.action.to_string())
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.result.to_string())
        .bind(&event.reason)
        .bind(details)
        .bind(&event.client_ip)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        if filter.offset.is_some() && filter.limit.is_none() {
            return Err(AuditLogError::InvalidFilter(
                "offset requires a limit".to_string(),
            ));
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM audit_logs", AUDIT_COLUMNS));
        push_filter(&mut qb, &filter);
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
            if let Some(offset) = filter.offset {
                qb.push(" OFFSET ").push_bind(i64::from(offset));
            }
        }
        let rows = qb
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        let row = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM audit_logs WHERE id=?",
            AUDIT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.ok_or(AuditLogError::NotFound(id))
            .and_then(event_from_row)
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filter(&mut qb, &filter);
        let (count,) = qb
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        u64::try_from(count).map_err(db_err)
    }
}
