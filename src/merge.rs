// 🔗 Merge Engine - one MergedRecord per join key
//
// Pure: output depends only on the bucket contents and the policies. No
// clock, no arrival order, no state carried between calls, so a retried
// bucket always produces the same row.

use serde::{Deserialize, Serialize};

use crate::grouping::{KeyBucket, KeyedBuckets};
use crate::records::{ActivityRecord, Completeness, MergedRecord};

// ============================================================================
// POLICIES
// ============================================================================

/// How duplicate activity records for one key are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAggregation {
    /// Calories are additive and summed; sleep is rate-like and averaged
    #[default]
    SumAndAverage,

    /// Every metric averaged
    AverageAll,

    /// Keep the single record with the largest canonical form
    KeepLargest,
}

/// Which keys produce output rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberCoverage {
    /// Output is driven by activity dates; members without activity are dropped
    #[default]
    ActivityDriven,

    /// Additionally emit one undated MEMBER_ONLY row per member without activity
    IncludeMemberOnly,
}

// ============================================================================
// REDUCTION HELPERS
// ============================================================================

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Sum in total order so the result is identical for any input permutation.
/// Inputs are finite and non-negative; a sum past the f64 range saturates at
/// `f64::MAX` so no row ever carries `inf`.
fn ordered_sum(values: Vec<f64>) -> f64 {
    let sum = sorted(values).into_iter().fold(0.0, |acc, v| acc + v);
    if sum.is_finite() {
        sum
    } else {
        f64::MAX
    }
}

fn ordered_mean(values: Vec<f64>) -> f64 {
    let n = values.len() as f64;
    if values.is_empty() {
        return 0.0;
    }

    let values = sorted(values);
    let sum = values.iter().fold(0.0, |acc, v| acc + v);
    if sum.is_finite() {
        sum / n
    } else {
        values.iter().fold(0.0, |acc, v| acc + v / n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Metrics {
    calories_consumed: f64,
    calories_burned: f64,
    sleep_hours: f64,
}

fn reduce(activities: &[ActivityRecord], policy: ActivityAggregation) -> Option<Metrics> {
    if activities.is_empty() {
        return None;
    }

    let consumed = || activities.iter().map(|a| a.calories_consumed).collect::<Vec<_>>();
    let burned = || activities.iter().map(|a| a.calories_burned).collect::<Vec<_>>();
    let sleep = || activities.iter().map(|a| a.sleep_hours).collect::<Vec<_>>();

    let metrics = match policy {
        ActivityAggregation::SumAndAverage => Metrics {
            calories_consumed: ordered_sum(consumed()),
            calories_burned: ordered_sum(burned()),
            sleep_hours: ordered_mean(sleep()),
        },
        ActivityAggregation::AverageAll => Metrics {
            calories_consumed: ordered_mean(consumed()),
            calories_burned: ordered_mean(burned()),
            sleep_hours: ordered_mean(sleep()),
        },
        ActivityAggregation::KeepLargest => {
            let chosen = activities.iter().max_by_key(|a| a.canonical())?;
            Metrics {
                calories_consumed: chosen.calories_consumed,
                calories_burned: chosen.calories_burned,
                sleep_hours: chosen.sleep_hours,
            }
        }
    };

    Some(metrics)
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine {
    pub aggregation: ActivityAggregation,
    pub coverage: MemberCoverage,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(aggregation: ActivityAggregation, coverage: MemberCoverage) -> Self {
        MergeEngine {
            aggregation,
            coverage,
        }
    }

    /// Merge one bucket.
    ///
    /// - member + activity → `Full`
    /// - activity only (member lookup missed) → `ActivityOnly`, member fields `None`
    /// - member only → `MemberOnly`, date and metrics `None`
    pub fn merge_bucket(&self, bucket: &KeyBucket) -> MergedRecord {
        let metrics = reduce(&bucket.activities, self.aggregation);

        let completeness = match (&bucket.member, metrics) {
            (Some(_), Some(_)) => Completeness::Full,
            (None, Some(_)) => Completeness::ActivityOnly,
            (_, None) => Completeness::MemberOnly,
        };

        let member = bucket.member.as_ref();
        MergedRecord {
            member_id: bucket.member_id.clone(),
            date: bucket.date,
            name: member.map(|m| m.name.clone()),
            gender: member.map(|m| m.gender),
            age: member.map(|m| m.age),
            height_cm: member.map(|m| m.height_cm),
            weight_kg: member.map(|m| m.weight_kg),
            calories_consumed: metrics.map(|m| m.calories_consumed),
            calories_burned: metrics.map(|m| m.calories_burned),
            sleep_hours: metrics.map(|m| m.sleep_hours),
            completeness,
            source_count: bucket.activities.len(),
        }
    }

    /// Merge every key of a grouped partition, sorted by output key
    pub fn merge_all(&self, buckets: &KeyedBuckets) -> Vec<MergedRecord> {
        let mut merged: Vec<MergedRecord> = buckets
            .activity_buckets()
            .iter()
            .map(|b| self.merge_bucket(b))
            .collect();

        if self.coverage == MemberCoverage::IncludeMemberOnly {
            merged.extend(
                buckets
                    .orphan_member_buckets()
                    .iter()
                    .map(|b| self.merge_bucket(b)),
            );
        }

        sort_merged(&mut merged);
        merged
    }
}

/// Merge stage with default policies
pub fn merge(bucket: &KeyBucket) -> MergedRecord {
    MergeEngine::new().merge_bucket(bucket)
}

/// Global output order: (memberID, date)
pub fn sort_merged(records: &mut [MergedRecord]) {
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

// ============================================================================
// TESTS
// ============================================================================
