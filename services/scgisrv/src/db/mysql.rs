//! MySQL storage
//!
//! Inserts are split into statements that stay under the server's
//! `max_query_size`. The row count per statement comes from the widest value
//! each column can hold, so a statement never needs measuring.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, QueryBuilder, Row};
use tracing::{debug, error, info};

use super::models::{format_timestamp, parse_timestamp, Alarm, Measurement, RelayUpdate};
use super::repository::Repository;
use crate::core::config::DbaseConfig;
use crate::core::constants::{ALARMS_TABLE, MEASUREMENTS_TABLE, NULL_TIMESTAMP, RELAYS_TABLE};
use crate::error::{Result, ScgiSrvError};

const NAD_SIZE: usize = 5;
const TIME_SIZE: usize = 26;
const TAG_SIZE: usize = 40;
const VALUE_SIZE: usize = 16;
const ALARM_TYPE_SIZE: usize = 11;
const ALARM_CLASS_SIZE: usize = 20;
const ALARM_MESSAGE_SIZE: usize = 50;

/// Placeholders a single MySQL statement may carry
const MAX_BIND_PARAMS: usize = 65_535;

const MEASUREMENT_COLUMNS: &[&str] = &["nad", "tag", "value", "timestamp"];
const MEASUREMENT_SIZES: &[usize] = &[NAD_SIZE, TAG_SIZE, VALUE_SIZE, TIME_SIZE];

const ALARM_COLUMNS: &[&str] = &[
    "nad",
    "tag",
    "priority",
    "value",
    "type",
    "class",
    "message",
    "timestamp_raise",
    "timestamp_gone",
    "timestamp_ack",
];
const ALARM_SIZES: &[usize] = &[
    NAD_SIZE,
    TAG_SIZE,
    VALUE_SIZE,
    ALARM_TYPE_SIZE,
    ALARM_CLASS_SIZE,
    ALARM_MESSAGE_SIZE,
    TIME_SIZE,
];

pub struct MySqlRepository {
    pool: MySqlPool,
    max_query_size: usize,
}

impl MySqlRepository {
    pub async fn connect(config: &DbaseConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Couldn't connect to database: {}", e);
                ScgiSrvError::database(format!("Couldn't connect to database: {e}"))
            })?;

        info!(
            "Connected to database {}:{}/{}",
            config.host, config.port, config.name
        );
        Ok(Self {
            pool,
            max_query_size: config.max_query_size,
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn insert_prefix(table: &str, columns: &[&str]) -> String {
        format!("INSERT INTO {} ({}) ", table, columns.join(", "))
    }
}

/// Rows that fit one insert statement, at least one
pub(crate) fn rows_per_statement(prefix_len: usize, sizes: &[usize], columns: usize, max_query_size: usize) -> usize {
    // parentheses, comma and space per row; quotes, comma and space per value
    let row_len = 4 + sizes.iter().sum::<usize>() + sizes.len() * 4;
    let by_size = max_query_size.saturating_sub(prefix_len) / row_len;
    by_size.min(MAX_BIND_PARAMS / columns.max(1)).max(1)
}

fn optional_timestamp(timestamp: &Option<NaiveDateTime>) -> String {
    timestamp
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| NULL_TIMESTAMP.to_string())
}

fn alarm_from_row(row: &MySqlRow) -> Result<Alarm> {
    let raised: String = row.try_get("timestamp_raise")?;
    let gone: String = row.try_get("timestamp_gone")?;
    let ack: String = row.try_get("timestamp_ack")?;
    let nad: u64 = row.try_get("nad")?;

    Ok(Alarm {
        id: Some(row.try_get("id")?),
        nad: u32::try_from(nad).map_err(|_| ScgiSrvError::database(format!("nad {nad} out of range")))?,
        tag: row.try_get("tag")?,
        priority: row.try_get::<i64, _>("priority")? as i32,
        value: row.try_get("value")?,
        alarm_type: row.try_get::<i64, _>("type")? as i32,
        alarm_class: row.try_get("class")?,
        message: row.try_get("message")?,
        timestamp_raise: parse_timestamp(&raised)
            .ok_or_else(|| ScgiSrvError::database(format!("invalid timestamp_raise \"{raised}\"")))?,
        timestamp_gone: parse_timestamp(&gone),
        timestamp_ack: parse_timestamp(&ack),
    })
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn create_measurements(&self, measurements: &[Measurement]) -> Result<()> {
        let start = Instant::now();
        let prefix = Self::insert_prefix(MEASUREMENTS_TABLE, MEASUREMENT_COLUMNS);
        let per_statement =
            rows_per_statement(prefix.len(), MEASUREMENT_SIZES, MEASUREMENT_COLUMNS.len(), self.max_query_size);

        let mut statements = 0;
        for chunk in measurements.chunks(per_statement) {
            let mut query: QueryBuilder<MySql> = QueryBuilder::new(&prefix);
            query.push_values(chunk, |mut row, m| {
                row.push_bind(m.nad)
                    .push_bind(m.tag.clone())
                    .push_bind(m.value.clone())
                    .push_bind(format_timestamp(&m.timestamp));
            });
            query.build().execute(&self.pool).await?;
            statements += 1;
        }

        debug!(
            "Stored {} measurements in {} statements ({:?})",
            measurements.len(),
            statements,
            start.elapsed()
        );
        Ok(())
    }

    async fn create_alarms(&self, alarms: &[Alarm]) -> Result<()> {
        let start = Instant::now();
        let prefix = Self::insert_prefix(ALARMS_TABLE, ALARM_COLUMNS);
        let per_statement = rows_per_statement(prefix.len(), ALARM_SIZES, ALARM_COLUMNS.len(), self.max_query_size);

        for chunk in alarms.chunks(per_statement) {
            let mut query: QueryBuilder<MySql> = QueryBuilder::new(&prefix);
            query.push_values(chunk, |mut row, alarm| {
                row.push_bind(alarm.nad)
                    .push_bind(alarm.tag.clone())
                    .push_bind(alarm.priority)
                    .push_bind(alarm.value.clone())
                    .push_bind(alarm.alarm_type)
                    .push_bind(alarm.alarm_class.clone())
                    .push_bind(alarm.message.clone())
                    .push_bind(format_timestamp(&alarm.timestamp_raise))
                    .push_bind(optional_timestamp(&alarm.timestamp_gone))
                    .push_bind(optional_timestamp(&alarm.timestamp_ack));
            });
            query.build().execute(&self.pool).await?;
        }

        debug!("Stored {} alarms ({:?})", alarms.len(), start.elapsed());
        Ok(())
    }

    async fn clear_alarms(&self, ids: &[u64], timestamp: NaiveDateTime) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new("UPDATE ");
        query
            .push(ALARMS_TABLE)
            .push(" SET timestamp_gone = ")
            .push_bind(format_timestamp(&timestamp))
            .push(" WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        query.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn get_not_acknowledged_alarms(&self, targets: &[(u32, String)]) -> Result<Vec<Alarm>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            r#"
            SELECT CAST(id AS UNSIGNED) AS id, CAST(nad AS UNSIGNED) AS nad, tag,
                   CAST(priority AS SIGNED) AS priority, value, CAST(type AS SIGNED) AS type,
                   class, message,
                   CAST(timestamp_raise AS CHAR) AS timestamp_raise,
                   CAST(timestamp_gone AS CHAR) AS timestamp_gone,
                   CAST(timestamp_ack AS CHAR) AS timestamp_ack
            FROM "#,
        );
        query.push(ALARMS_TABLE).push(" WHERE ");
        for (i, (nad, tag)) in targets.iter().enumerate() {
            if i > 0 {
                query.push(" OR ");
            }
            query
                .push("(nad = ")
                .push_bind(*nad)
                .push(" AND tag = ")
                .push_bind(tag.clone())
                .push(" AND timestamp_ack = ")
                .push_bind(NULL_TIMESTAMP)
                .push(")");
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(alarm_from_row).collect()
    }

    async fn exists_in_relays(&self, session_id: u32) -> Result<bool> {
        let sql = format!("SELECT session_id FROM {RELAYS_TABLE} WHERE session_id = ? AND enabled != 0 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn update_relay(&self, session_id: u32, update: &RelayUpdate) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE {RELAYS_TABLE}
            SET message_count_tx = ?, message_count_rx = ?, last_message = ?, last_controller_nad = ?
            WHERE session_id = ?
            "#
        );
        sqlx::query(&sql)
            .bind(update.message_count_tx)
            .bind(update.message_count_rx)
            .bind(format_timestamp(&update.last_message))
            .bind(update.last_controller_nad)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enabled_sessions_in(&self, session_ids: &[u32]) -> Result<Vec<u32>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<MySql> =
            QueryBuilder::new("SELECT CAST(session_id AS UNSIGNED) AS session_id FROM ");
        query.push(RELAYS_TABLE).push(" WHERE enabled != 0 AND session_id IN (");
        let mut separated = query.separated(", ");
        for id in session_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let id: u64 = row.try_get("session_id")?;
                u32::try_from(id).map_err(|_| ScgiSrvError::database(format!("session_id {id} out of range")))
            })
            .collect()
    }
}
