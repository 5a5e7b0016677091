// 🧺 Partitioner / Grouper - fan-in of both streams into keyed buckets
// Indexes are BTreeMaps so iteration order never depends on arrival order

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keys::{partition_for, JoinKey, Keyed};
use crate::records::{ActivityRecord, MemberRecord, Record};

// ============================================================================
// POLICIES & CONFLICTS
// ============================================================================

/// Tie-break between duplicate profiles of one member. Both choices depend
/// only on record content, never on arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberConflictPolicy {
    /// Keep the profile with the lexicographically largest canonical form
    #[default]
    LargestSerialized,
    SmallestSerialized,
}

impl MemberConflictPolicy {
    fn prefers(&self, candidate: &MemberRecord, current: &MemberRecord) -> bool {
        match self {
            MemberConflictPolicy::LargestSerialized => candidate.canonical() > current.canonical(),
            MemberConflictPolicy::SmallestSerialized => candidate.canonical() < current.canonical(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConflictKind {
    Member,
    Activity,
}

/// Informational: several records shared one key and were resolved by policy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DuplicateKeyConflict {
    pub kind: ConflictKind,
    pub key: String,
    pub count: usize,
}

// ============================================================================
// MEMBER INDEX
// ============================================================================

/// memberID → the single surviving profile
#[derive(Debug, Clone, Default)]
pub struct MemberIndex {
    policy: MemberConflictPolicy,
    members: BTreeMap<String, MemberRecord>,
    seen: BTreeMap<String, usize>,
}

impl MemberIndex {
    pub fn new(policy: MemberConflictPolicy) -> Self {
        MemberIndex {
            policy,
            members: BTreeMap::new(),
            seen: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, record: MemberRecord) {
        *self.seen.entry(record.member_id.clone()).or_insert(0) += 1;

        match self.members.get(&record.member_id) {
            Some(current) if !self.policy.prefers(&record, current) => {}
            _ => {
                self.members.insert(record.member_id.clone(), record);
            }
        }
    }

    pub fn get(&self, member_id: &str) -> Option<&MemberRecord> {
        self.members.get(member_id)
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.members.contains_key(member_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.members.values()
    }

    pub fn conflicts(&self) -> Vec<DuplicateKeyConflict> {
        self.seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, count)| DuplicateKeyConflict {
                kind: ConflictKind::Member,
                key: id.clone(),
                count: *count,
            })
            .collect()
    }
}

// ============================================================================
// ACTIVITY INDEX
// ============================================================================

/// JoinKey → every activity record sharing that key (reduced later by merge)
#[derive(Debug, Clone, Default)]
pub struct ActivityIndex {
    buckets: BTreeMap<JoinKey, Vec<ActivityRecord>>,
}

impl ActivityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ActivityRecord) {
        self.buckets.entry(record.join_key()).or_default().push(record);
    }

    pub fn get(&self, key: &JoinKey) -> Option<&[ActivityRecord]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total activity records across all keys
    pub fn record_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn has_member(&self, member_id: &str) -> bool {
        self.buckets
            .range(JoinKey::new(member_id, NaiveDate::MIN)..)
            .next()
            .map_or(false, |(k, _)| k.member_id == member_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JoinKey, &Vec<ActivityRecord>)> {
        self.buckets.iter()
    }

    pub fn conflicts(&self) -> Vec<DuplicateKeyConflict> {
        self.buckets
            .iter()
            .filter(|(_, records)| records.len() > 1)
            .map(|(key, records)| DuplicateKeyConflict {
                kind: ConflictKind::Activity,
                key: key.to_string(),
                count: records.len(),
            })
            .collect()
    }
}

// ============================================================================
// KEYED BUCKETS
// ============================================================================

/// One merge unit: everything known about a (memberID, date).
///
/// `date` is `None` only for a member with no activity at all.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBucket {
    pub member_id: String,
    pub date: Option<NaiveDate>,
    pub member: Option<MemberRecord>,
    pub activities: Vec<ActivityRecord>,
}

impl KeyBucket {
    pub fn join_key(&self) -> Option<JoinKey> {
        self.date.map(|d| JoinKey::new(self.member_id.clone(), d))
    }
}

/// Output of the group stage: both indexes, ready for merge
#[derive(Debug, Clone, Default)]
pub struct KeyedBuckets {
    pub members: MemberIndex,
    pub activities: ActivityIndex,
}

impl KeyedBuckets {
    pub fn new(policy: MemberConflictPolicy) -> Self {
        KeyedBuckets {
            members: MemberIndex::new(policy),
            activities: ActivityIndex::new(),
        }
    }

    pub fn add(&mut self, record: Record) {
        match record {
            Record::Member(m) => self.members.insert(m),
            Record::Activity(a) => self.activities.insert(a),
        }
    }

    /// One bucket per activity key, in key order, with the member looked up
    pub fn activity_buckets(&self) -> Vec<KeyBucket> {
        self.activities
            .iter()
            .map(|(key, records)| KeyBucket {
                member_id: key.member_id.clone(),
                date: Some(key.date),
                member: self.members.get(&key.member_id).cloned(),
                activities: records.clone(),
            })
            .collect()
    }

    /// Members whose id never appears in the activity index
    pub fn orphan_member_buckets(&self) -> Vec<KeyBucket> {
        self.members
            .iter()
            .filter(|m| !self.activities.has_member(&m.member_id))
            .map(|m| KeyBucket {
                member_id: m.member_id.clone(),
                date: None,
                member: Some(m.clone()),
                activities: Vec::new(),
            })
            .collect()
    }

    pub fn conflicts(&self) -> Vec<DuplicateKeyConflict> {
        let mut conflicts = self.members.conflicts();
        conflicts.extend(self.activities.conflicts());
        conflicts
    }
}

/// Group stage with the default member tie-break
pub fn group<I>(records: I) -> KeyedBuckets
where
    I: IntoIterator<Item = Record>,
{
    group_with(records, MemberConflictPolicy::default())
}

pub fn group_with<I>(records: I, policy: MemberConflictPolicy) -> KeyedBuckets
where
    I: IntoIterator<Item = Record>,
{
    let mut buckets = KeyedBuckets::new(policy);
    for record in records {
        buckets.add(record);
    }
    buckets
}

/// Route records to `partitions` disjoint sets by member
pub fn partition<T, I>(records: I, partitions: usize) -> Vec<Vec<T>>
where
    T: Keyed,
    I: IntoIterator<Item = T>,
{
    let count = partitions.max(1);
    let mut parts: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();
    for record in records {
        let idx = partition_for(record.member_id(), count);
        parts[idx].push(record);
    }
    parts
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Gender;

    fn member(id: &str, name: &str, weight: f64) -> Record {
        Record::Member(MemberRecord {
            member_id: id.to_string(),
            name: name.to_string(),
            gender: Gender::F,
            age: 30,
            height_cm: 165.0,
            weight_kg: weight,
        })
    }

    fn activity(id: &str, day: u32, consumed: f64) -> Record {
        Record::Activity(ActivityRecord {
            member_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            calories_consumed: consumed,
            calories_burned: 1000.0,
            sleep_hours: 7.0,
        })
    }

    #[test]
    fn test_group_builds_both_indexes() {
        let buckets = group(vec![
            member("m1", "Ann", 60.0),
            activity("m1", 1, 2000.0),
            activity("m1", 2, 2100.0),
            activity("m2", 1, 1800.0),
        ]);

        assert_eq!(buckets.members.len(), 1);
        assert_eq!(buckets.activities.len(), 3);
        assert_eq!(buckets.activities.record_count(), 3);
        assert!(buckets.conflicts().is_empty());
    }

    #[test]
    fn test_duplicate_member_resolution_is_order_independent() {
        let a = member("m1", "Ann", 60.0);
        let b = member("m1", "Ann", 61.0);

        let forward = group(vec![a.clone(), b.clone()]);
        let backward = group(vec![b, a]);

        let kept_forward = forward.members.get("m1").unwrap();
        let kept_backward = backward.members.get("m1").unwrap();
        assert_eq!(kept_forward, kept_backward);
        assert_eq!(kept_forward.weight_kg, 61.0);

        let conflicts = forward.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Member);
        assert_eq!(conflicts[0].count, 2);
    }

    #[test]
    fn test_smallest_serialized_policy() {
        let buckets = group_with(
            vec![member("m1", "Ann", 61.0), member("m1", "Ann", 60.0)],
            MemberConflictPolicy::SmallestSerialized,
        );
        assert_eq!(buckets.members.get("m1").unwrap().weight_kg, 60.0);
    }

    #[test]
    fn test_duplicate_activity_kept_for_merge() {
        let buckets = group(vec![activity("m1", 1, 2000.0), activity("m1", 1, 2200.0)]);

        let key = JoinKey::new("m1", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(buckets.activities.get(&key).unwrap().len(), 2);

        let conflicts = buckets.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Activity);
    }

    #[test]
    fn test_activity_buckets_are_key_ordered_and_resolved() {
        let buckets = group(vec![
            activity("m2", 1, 1.0),
            activity("m1", 3, 1.0),
            member("m1", "Ann", 60.0),
            activity("m1", 1, 1.0),
        ]);

        let list = buckets.activity_buckets();
        let keys: Vec<_> = list.iter().map(|b| b.join_key().unwrap()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        assert!(list[0].member.is_some());
        assert!(list[2].member.is_none());
    }

    #[test]
    fn test_orphan_members() {
        let buckets = group(vec![
            member("m1", "Ann", 60.0),
            member("m9", "Zed", 70.0),
            activity("m1", 1, 1.0),
        ]);

        let orphans = buckets.orphan_member_buckets();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].member_id, "m9");
        assert!(orphans[0].date.is_none());
        assert!(orphans[0].join_key().is_none());
    }

    #[test]
    fn test_partition_co_locates_member_and_activity() {
        let records = vec![
            member("m1", "Ann", 60.0),
            activity("m1", 1, 1.0),
            member("m2", "Bo", 80.0),
            activity("m2", 1, 1.0),
            activity("m3", 2, 1.0),
        ];

        let parts = partition(records, 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 5);

        for (idx, part) in parts.iter().enumerate() {
            for record in part {
                assert_eq!(partition_for(record.member_id(), 4), idx);
            }
        }
    }
}
