use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::report::{RunKind, RunStatus, SyncReport};
use crate::store::{keys, Store};

const MAX_RECORDS: usize = 200;

/// One finished run, as kept in the run log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub dry_run: bool,
    pub found: usize,
    pub translated: usize,
    pub accepted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn from_report(report: &SyncReport, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            kind: report.kind,
            started_at,
            finished_at,
            status: report.status,
            dry_run: report.dry_run,
            found: report.found,
            translated: report.translated,
            accepted: report.accepted,
            error: report.error.clone(),
        }
    }
}

/// Capped history of runs plus last-run timestamps
#[derive(Clone)]
pub struct RunLog {
    store: Store,
}

impl RunLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn record(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut records: Vec<RunRecord> = self.store.get(keys::RUN_LOG).await?.unwrap_or_default();
        let finished_at = record.finished_at;
        let kind = record.kind;
        let touches_status = record.status == RunStatus::Completed && !record.dry_run;

        records.push(record);
        if records.len() > MAX_RECORDS {
            let excess = records.len() - MAX_RECORDS;
            records.drain(..excess);
        }
        self.store.set(keys::RUN_LOG, &records, None).await?;

        if touches_status {
            self.store.set(&keys::last_run(kind.as_str()), &finished_at, None).await?;
            self.store.set(keys::LAST_RUN, &finished_at, None).await?;
        }
        Ok(())
    }

    /// Most recent first
    pub async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let records: Vec<RunRecord> = self.store.get(keys::RUN_LOG).await?.unwrap_or_default();
        Ok(records.into_iter().rev().take(limit).collect())
    }

    pub async fn last_run(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.get(keys::LAST_RUN).await
    }

    /// Last successful run per kind
    pub async fn last_runs(&self) -> Result<Vec<(RunKind, Option<DateTime<Utc>>)>, StoreError> {
        let keys: Vec<String> = RunKind::ALL.iter().map(|k| keys::last_run(k.as_str())).collect();
        let found: HashMap<String, DateTime<Utc>> = self.store.get_many(&keys).await?;
        Ok(RunKind::ALL
            .iter()
            .map(|kind| (*kind, found.get(&keys::last_run(kind.as_str())).copied()))
            .collect())
    }
}
