// 🧾 Data Model - typed records for both input streams and the merged output
// All values are immutable once built; stages produce new values

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SCHEMA TAG
// ============================================================================

/// Which logical input a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaTag {
    Member,
    Activity,
}

impl SchemaTag {
    pub fn code(&self) -> &str {
        match self {
            SchemaTag::Member => "MEMBER",
            SchemaTag::Activity => "ACTIVITY",
        }
    }

    /// Number of delimited fields a line of this schema carries
    pub fn field_count(&self) -> usize {
        match self {
            SchemaTag::Member => 6,
            SchemaTag::Activity => 5,
        }
    }
}

impl fmt::Display for SchemaTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// GENDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
    Other,
    Unknown,
}

impl Gender {
    pub fn code(&self) -> &str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
            Gender::Other => "OTHER",
            Gender::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Gender {
    type Err = String;

    /// Accepts the short and long forms case-insensitively; an empty field
    /// means the source did not record a gender.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::M),
            "F" | "FEMALE" => Ok(Gender::F),
            "O" | "OTHER" => Ok(Gender::Other),
            "U" | "UNKNOWN" | "" => Ok(Gender::Unknown),
            other => Err(format!("unrecognised gender: {}", other)),
        }
    }
}

// ============================================================================
// MEMBER RECORD
// ============================================================================

/// Static member profile. Carries no date: the join expands it across every
/// date present in that member's activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member_id: String,
    pub name: String,
    pub gender: Gender,
    pub age: u32,
    pub height_cm: f64,
    pub weight_kg: f64,
}

impl MemberRecord {
    /// Canonical serialized form, used as the deterministic tie-break between
    /// duplicate profiles of the same member.
    pub fn canonical(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{:?}\u{1f}{:?}",
            self.member_id, self.name, self.gender, self.age, self.height_cm, self.weight_kg
        )
    }
}

// ============================================================================
// ACTIVITY RECORD
// ============================================================================

/// One day of fitness-app data for one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub member_id: String,
    pub date: NaiveDate,
    pub calories_consumed: f64,
    pub calories_burned: f64,
    pub sleep_hours: f64,
}

impl ActivityRecord {
    pub fn canonical(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{:?}\u{1f}{:?}\u{1f}{:?}",
            self.member_id,
            self.date.format("%Y-%m-%d"),
            self.calories_consumed,
            self.calories_burned,
            self.sleep_hours
        )
    }
}

/// Output of the parse stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Member(MemberRecord),
    Activity(ActivityRecord),
}

impl Record {
    pub fn schema(&self) -> SchemaTag {
        match self {
            Record::Member(_) => SchemaTag::Member,
            Record::Activity(_) => SchemaTag::Activity,
        }
    }
}

impl From<MemberRecord> for Record {
    fn from(m: MemberRecord) -> Self {
        Record::Member(m)
    }
}

impl From<ActivityRecord> for Record {
    fn from(a: ActivityRecord) -> Self {
        Record::Activity(a)
    }
}

// ============================================================================
// MERGED RECORD
// ============================================================================

/// Which side(s) of the join contributed to a merged row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completeness {
    Full,
    MemberOnly,
    ActivityOnly,
}

impl Completeness {
    pub fn code(&self) -> &str {
        match self {
            Completeness::Full => "FULL",
            Completeness::MemberOnly => "MEMBER_ONLY",
            Completeness::ActivityOnly => "ACTIVITY_ONLY",
        }
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One output row per (memberID, date).
///
/// Member attributes are `None` for `ActivityOnly`; activity metrics and the
/// date are `None` for `MemberOnly` (only produced when member-only coverage
/// is enabled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub member_id: String,
    pub date: Option<NaiveDate>,
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u32>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub calories_consumed: Option<f64>,
    pub calories_burned: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub completeness: Completeness,

    /// Number of activity records reduced into this row
    #[serde(skip)]
    pub source_count: usize,
}

impl MergedRecord {
    /// Output ordering key. Undated rows sort before the member's dated rows.
    pub fn sort_key(&self) -> (&str, Option<NaiveDate>) {
        (&self.member_id, self.date)
    }
}

// ============================================================================
// TESTS
// ============================================================================
