// warden-core/src/domain/consistency/mod.rs
//
// Cross-table referential integrity: every foreign key declared in the
// contract is checked against the named sibling table. Both sides are
// compared through a canonical string key, so `1` (int) joins `1.0`
// (float) and `"1"` (text).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::contract::ForeignKeySpec;
use crate::domain::table::Table;
use crate::domain::verdict::Decision;

const ORPHAN_SAMPLE: usize = 5;
const COMPOSITE_KEY_SEP: &str = "|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyResult {
    pub status: ConsistencyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    pub orphan_count: usize,
    pub orphan_pct: f64,
    pub sample_orphans: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub decision: Decision,
}

impl ConsistencyResult {
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: ConsistencyStatus::Skipped,
            relationship: None,
            orphan_count: 0,
            orphan_pct: 0.0,
            sample_orphans: Vec::new(),
            message: Some(message.into()),
            decision: Decision::Continue,
        }
    }

    /// Collapse per-relationship results into the single result the verdict
    /// carries: the first failure wins, then the first pass, then skipped.
    pub fn aggregate(results: Vec<ConsistencyResult>) -> ConsistencyResult {
        if results.is_empty() {
            return ConsistencyResult::skipped("No foreign keys defined in contract");
        }
        if let Some(fail) = results
            .iter()
            .find(|r| r.status == ConsistencyStatus::Fail)
        {
            return fail.clone();
        }
        results
            .iter()
            .find(|r| r.status == ConsistencyStatus::Pass)
            .cloned()
            .unwrap_or_else(|| results[0].clone())
    }
}

pub struct ConsistencyChecker;

impl ConsistencyChecker {
    pub fn check(
        child: &Table,
        table_name: &str,
        fk: &ForeignKeySpec,
        reference: &Table,
    ) -> ConsistencyResult {
        let relationship = format!(
            "{}.{} -> {}.{}",
            table_name,
            fk.columns.join("+"),
            fk.reference_table,
            fk.reference_columns.join("+"),
        );

        // Resolve both sides' key columns
        let child_cols: Option<Vec<_>> =
            fk.columns.iter().map(|c| child.column(c)).collect();
        let Some(child_cols) = child_cols else {
            return ConsistencyResult {
                status: ConsistencyStatus::Fail,
                relationship: Some(relationship),
                orphan_count: 0,
                orphan_pct: 0.0,
                sample_orphans: Vec::new(),
                message: Some(format!(
                    "FK column(s) {} missing in source",
                    fk.columns.join(", ")
                )),
                decision: Decision::CriticalStop,
            };
        };
        let ref_cols: Option<Vec<_>> = fk
            .reference_columns
            .iter()
            .map(|c| reference.column(c))
            .collect();
        let Some(ref_cols) = ref_cols else {
            return ConsistencyResult::skipped(format!(
                "Reference column(s) {} missing in {}",
                fk.reference_columns.join(", "),
                fk.reference_table
            ));
        };

        // Valid parent keys
        let mut valid: HashSet<String> = HashSet::new();
        for row in 0..reference.rows_loaded {
            if let Some(key) = composite_key(&ref_cols, row) {
                valid.insert(key);
            }
        }

        // Orphans: non-null child keys absent from the parent
        let mut orphan_count = 0usize;
        let mut samples: Vec<String> = Vec::new();
        let mut sampled: HashSet<String> = HashSet::new();
        for row in 0..child.rows_loaded {
            let Some(key) = composite_key(&child_cols, row) else {
                continue;
            };
            if !valid.contains(&key) {
                orphan_count += 1;
                if samples.len() < ORPHAN_SAMPLE && sampled.insert(key.clone()) {
                    samples.push(key);
                }
            }
        }

        let orphan_pct = if child.rows_loaded == 0 {
            0.0
        } else {
            (orphan_count as f64 / child.rows_loaded as f64) * 100.0
        };

        if orphan_count > 0 {
            ConsistencyResult {
                status: ConsistencyStatus::Fail,
                relationship: Some(relationship),
                orphan_count,
                orphan_pct,
                sample_orphans: samples,
                message: None,
                decision: Decision::CriticalStop,
            }
        } else {
            ConsistencyResult {
                status: ConsistencyStatus::Pass,
                relationship: Some(relationship),
                orphan_count: 0,
                orphan_pct: 0.0,
                sample_orphans: Vec::new(),
                message: None,
                decision: Decision::Continue,
            }
        }
    }
}

fn composite_key(cols: &[&crate::domain::table::Column], row: usize) -> Option<String> {
    let mut parts = Vec::with_capacity(cols.len());
    for col in cols {
        let key = col.values.get(row)?.as_key()?;
        parts.push(key);
    }
    Some(parts.join(COMPOSITE_KEY_SEP))
}
