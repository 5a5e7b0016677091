// FitJoin - Core Library
// Keyed join of member profiles with daily fitness activity

pub mod records;
pub mod error;
pub mod validation;
pub mod parser;
pub mod keys;
pub mod grouping;
pub mod merge;
pub mod emitter;
pub mod report;
pub mod config;
pub mod pipeline;
pub mod logging;

// Re-export commonly used types
pub use records::{
    ActivityRecord, Completeness, Gender, MemberRecord, MergedRecord, Record, SchemaTag,
};
pub use error::{FitJoinError, MalformedRecord, Result};
pub use parser::{get_parser, parse, ActivityParser, MemberParser, RecordParser};
pub use keys::{parse_date, partition_for, JoinKey, Keyed};
pub use grouping::{
    group, group_with, partition, ActivityIndex, ConflictKind, DuplicateKeyConflict, KeyBucket,
    KeyedBuckets, MemberConflictPolicy, MemberIndex,
};
pub use merge::{merge, sort_merged, ActivityAggregation, MemberCoverage, MergeEngine};
pub use emitter::{format_record, DeadLetterWriter, RecordEmitter, OUTPUT_FIELDS};
pub use report::{reconcile, ReconciliationResult, RunReport};
pub use config::{PipelineConfig, MAX_PARTITIONS};
pub use pipeline::{read_source, run_stages, JoinOutcome, ParsedSource, Pipeline, StageOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
