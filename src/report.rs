// ⚖️ Run Report - counters for a completed run + output reconciliation
//
// Every parsed activity record must be accounted for by exactly one merged
// row, and no output key may repeat:
//   sum(merged.source_count) == activities_parsed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::grouping::{ConflictKind, DuplicateKeyConflict};
use crate::records::{Completeness, MergedRecord};

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    /// Activity counts match and all output keys are unique
    Balanced { activity_records: usize },

    Discrepancy {
        expected_activity_records: usize,
        accounted_activity_records: usize,
        duplicate_output_keys: usize,
    },
}

impl ReconciliationResult {
    pub fn is_balanced(&self) -> bool {
        matches!(self, ReconciliationResult::Balanced { .. })
    }
}

/// Check merged output against the number of activity records that parsed
pub fn reconcile(merged: &[MergedRecord], activities_parsed: usize) -> ReconciliationResult {
    let accounted: usize = merged.iter().map(|m| m.source_count).sum();

    let mut seen = HashSet::new();
    let duplicate_output_keys = merged
        .iter()
        .filter(|m| !seen.insert(m.sort_key()))
        .count();

    if accounted == activities_parsed && duplicate_output_keys == 0 {
        ReconciliationResult::Balanced {
            activity_records: accounted,
        }
    } else {
        ReconciliationResult::Discrepancy {
            expected_activity_records: activities_parsed,
            accounted_activity_records: accounted,
            duplicate_output_keys,
        }
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Non-blank data lines read from each input (headers excluded)
    pub member_lines: usize,
    pub activity_lines: usize,

    pub members_parsed: usize,
    pub activities_parsed: usize,
    pub malformed: usize,

    pub member_conflicts: usize,
    pub activity_conflicts: usize,

    pub full: usize,
    pub activity_only: usize,
    pub member_only: usize,

    pub partitions: usize,
    pub member_parser_version: String,
    pub activity_parser_version: String,
    pub reconciliation: Option<ReconciliationResult>,
}

impl RunReport {
    pub fn new(partitions: usize) -> Self {
        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            member_lines: 0,
            activity_lines: 0,
            members_parsed: 0,
            activities_parsed: 0,
            malformed: 0,
            member_conflicts: 0,
            activity_conflicts: 0,
            full: 0,
            activity_only: 0,
            member_only: 0,
            partitions,
            member_parser_version: String::new(),
            activity_parser_version: String::new(),
            reconciliation: None,
        }
    }

    pub fn total_records(&self) -> usize {
        self.member_lines + self.activity_lines
    }

    pub fn conflicts_resolved(&self) -> usize {
        self.member_conflicts + self.activity_conflicts
    }

    pub fn rows_emitted(&self) -> usize {
        self.full + self.activity_only + self.member_only
    }

    pub fn record_conflicts(&mut self, conflicts: &[DuplicateKeyConflict]) {
        for conflict in conflicts {
            match conflict.kind {
                ConflictKind::Member => self.member_conflicts += 1,
                ConflictKind::Activity => self.activity_conflicts += 1,
            }
        }
    }

    pub fn record_output(&mut self, merged: &[MergedRecord]) {
        for record in merged {
            match record.completeness {
                Completeness::Full => self.full += 1,
                Completeness::ActivityOnly => self.activity_only += 1,
                Completeness::MemberOnly => self.member_only += 1,
            }
        }
        self.reconciliation = Some(reconcile(merged, self.activities_parsed));
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_balanced(&self) -> bool {
        self.reconciliation
            .as_ref()
            .map_or(false, ReconciliationResult::is_balanced)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records read ({} member, {} activity), {} malformed, {} conflicts resolved \
             | {} rows: {} full, {} activity-only, {} member-only",
            self.total_records(),
            self.member_lines,
            self.activity_lines,
            self.malformed,
            self.conflicts_resolved(),
            self.rows_emitted(),
            self.full,
            self.activity_only,
            self.member_only
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
