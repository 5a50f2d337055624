use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Records, Report};

/// Result of handing one report to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Header and `records` child rows were committed together.
    Stored { records: u64 },
    /// A report with this file name already exists; nothing was written.
    AlreadyStored,
}

/// Relational store for parsed reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// File names of every report already persisted.
    async fn processed_files(&self) -> anyhow::Result<HashSet<String>>;

    /// Writes the report header and its records as one unit.
    async fn persist(&self, report: &Report) -> anyhow::Result<PersistOutcome>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[async_trait]
impl ReportStore for PgStore {
    async fn processed_files(&self) -> anyhow::Result<HashSet<String>> {
        let rows = sqlx::query("SELECT file_name FROM reports")
            .fetch_all(&self.pool)
            .await
            .context("failed to read processed report files")?;

        Ok(rows.iter().map(|row| row.get::<String, _>("file_name")).collect())
    }

    async fn persist(&self, report: &Report) -> anyhow::Result<PersistOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open transaction")?;

        let header = insert_header(&mut tx, report)
            .await
            .with_context(|| format!("failed to insert report header for {}", report.file_name))?;
        let Some(report_id) = header else {
            warn!(file = %report.file_name, "report already stored, skipping records");
            tx.rollback().await?;
            return Ok(PersistOutcome::AlreadyStored);
        };

        let records = insert_records(&mut tx, report_id, &report.records)
            .await
            .with_context(|| format!("failed to insert records for {}", report.file_name))?;

        tx.commit()
            .await
            .with_context(|| format!("failed to commit {}", report.file_name))?;

        debug!(file = %report.file_name, %report_id, records, "report committed");
        Ok(PersistOutcome::Stored { records })
    }
}

/// Inserts the report row. `None` means the conflict clause suppressed the
/// insert and no id came back, which is not an error.
async fn insert_header(
    tx: &mut Transaction<'_, Postgres>,
    report: &Report,
) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query(
        r#"
        INSERT INTO reports
        (id, file_name, report_type, switch_name, number, name, service_level, trunks,
         date_stamp, time_stamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (file_name) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&report.file_name)
    .bind(report.report_type().as_str())
    .bind(&report.switch_name)
    .bind(report.number)
    .bind(&report.name)
    .bind(report.service_level)
    .bind(report.trunks)
    .bind(&report.date_stamp)
    .bind(report.time_stamp)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| row.get("id")))
}

async fn insert_records(
    tx: &mut Transaction<'_, Postgres>,
    report_id: Uuid,
    records: &Records,
) -> anyhow::Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} ",
        records.report_type().records_table()
    ));

    match records {
        Records::Split(rows) => {
            builder.push(
                "(report_id, time, acd_calls, avg_speed_ans, aband_calls, avg_aband_time, \
                 avg_talk_time, total_after_call, flow_in, flow_out, total_aux, avg_staffed, \
                 in_service_level_percent) ",
            );
            builder.push_values(rows, |mut b, r| {
                b.push_bind(report_id)
                    .push_bind(r.time)
                    .push_bind(r.acd_calls)
                    .push_bind(r.avg_speed_ans)
                    .push_bind(r.aband_calls)
                    .push_bind(r.avg_aband_time)
                    .push_bind(r.avg_talk_time)
                    .push_bind(r.total_after_call)
                    .push_bind(r.flow_in)
                    .push_bind(r.flow_out)
                    .push_bind(r.total_aux)
                    .push_bind(r.avg_staffed)
                    .push_bind(r.in_service_level_percent);
            });
        }
        Records::Trunk(rows) => {
            builder.push(
                "(report_id, time, incoming_calls, incoming_aband, incoming_time, incoming_ccs, \
                 outgoing_calls, outgoing_comp, outgoing_time, outgoing_ccs, all_busy_percent, \
                 time_maint_percent) ",
            );
            builder.push_values(rows, |mut b, r| {
                b.push_bind(report_id)
                    .push_bind(r.time)
                    .push_bind(r.incoming_calls)
                    .push_bind(r.incoming_aband)
                    .push_bind(r.incoming_time)
                    .push_bind(r.incoming_ccs)
                    .push_bind(r.outgoing_calls)
                    .push_bind(r.outgoing_comp)
                    .push_bind(r.outgoing_time)
                    .push_bind(r.outgoing_ccs)
                    .push_bind(r.all_busy_percent)
                    .push_bind(r.time_maint_percent);
            });
        }
        Records::Agent(rows) => {
            builder.push(
                "(report_id, time, acd_calls, avg_talk_time, total_after_call, total_avail_time, \
                 total_aux_other, extn_calls, avg_extn_time, total_time_staffed, total_hold_time) ",
            );
            builder.push_values(rows, |mut b, r| {
                b.push_bind(report_id)
                    .push_bind(r.time)
                    .push_bind(r.acd_calls)
                    .push_bind(r.avg_talk_time)
                    .push_bind(r.total_after_call)
                    .push_bind(r.total_avail_time)
                    .push_bind(r.total_aux_other)
                    .push_bind(r.extn_calls)
                    .push_bind(r.avg_extn_time)
                    .push_bind(r.total_time_staffed)
                    .push_bind(r.total_hold_time);
            });
        }
        Records::Vdn(rows) => {
            builder.push(
                "(report_id, time, calls_offered, acd_calls, avg_speed_ans, aband_calls, \
                 avg_aband_time, avg_talk_hold, conn_calls, flow_out, busy_disc, \
                 in_serv_lvl_percent) ",
            );
            builder.push_values(rows, |mut b, r| {
                b.push_bind(report_id)
                    .push_bind(r.time)
                    .push_bind(r.calls_offered)
                    .push_bind(r.acd_calls)
                    .push_bind(r.avg_speed_ans)
                    .push_bind(r.aband_calls)
                    .push_bind(r.avg_aband_time)
                    .push_bind(r.avg_talk_hold)
                    .push_bind(r.conn_calls)
                    .push_bind(r.flow_out)
                    .push_bind(r.busy_disc)
                    .push_bind(r.in_serv_lvl_percent);
            });
        }
    }

    let result = builder.build().execute(&mut **tx).await?;
    Ok(result.rows_affected())
}
