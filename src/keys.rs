// 🔑 Key Extractor - composite join keys and partition routing

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::records::{ActivityRecord, MemberRecord, Record};

// ============================================================================
// JOIN KEY
// ============================================================================

/// `(memberID, date)`. Field order gives the lexicographic total order used
/// for output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinKey {
    pub member_id: String,
    pub date: NaiveDate,
}

impl JoinKey {
    pub fn new(member_id: impl Into<String>, date: NaiveDate) -> Self {
        JoinKey {
            member_id: member_id.into(),
            date,
        }
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.member_id, self.date.format("%Y-%m-%d"))
    }
}

// ============================================================================
// KEY EXTRACTION
// ============================================================================

/// Anything that can be looked up by member
pub trait Keyed {
    fn member_id(&self) -> &str;
}

impl Keyed for MemberRecord {
    fn member_id(&self) -> &str {
        &self.member_id
    }
}

impl Keyed for ActivityRecord {
    fn member_id(&self) -> &str {
        &self.member_id
    }
}

impl Keyed for Record {
    fn member_id(&self) -> &str {
        match self {
            Record::Member(m) => &m.member_id,
            Record::Activity(a) => &a.member_id,
        }
    }
}

impl ActivityRecord {
    pub fn join_key(&self) -> JoinKey {
        JoinKey::new(self.member_id.clone(), self.date)
    }
}

/// Parse a calendar date (YYYY-MM-DD or MM/DD/YYYY)
pub fn parse_date(date_str: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%m/%d/%Y") {
        return Some(date);
    }

    None
}

// ============================================================================
// PARTITION ROUTING
// ============================================================================

/// Partition owning every key of `member_id`.
///
/// Routing by member (not by full key) keeps a profile and all of its activity
/// in one partition, so each worker can merge without looking elsewhere. The
/// hash is SHA-256 so the assignment is stable across processes and runs.
pub fn partition_for(member_id: &str, partitions: usize) -> usize {
    if partitions <= 1 {
        return 0;
    }

    let digest = Sha256::digest(member_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % partitions as u64) as usize
}

// ============================================================================
// TESTS
// ============================================================================
