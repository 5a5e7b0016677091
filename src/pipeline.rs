// 🚰 Pipeline Driver - wires parse → group → merge → emit
//
// Records are routed to partitions by member; each partition is grouped and
// merged by its own worker with no shared mutable state. The only barriers
// are the join on all workers and the global sort before emission.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::emitter::{DeadLetterWriter, RecordEmitter};
use crate::error::{FitJoinError, MalformedRecord, Result};
use crate::grouping::{group_with, partition, DuplicateKeyConflict, MemberConflictPolicy};
use crate::merge::{sort_merged, MergeEngine};
use crate::parser::get_parser;
use crate::records::{MergedRecord, Record, SchemaTag};
use crate::report::RunReport;

// ============================================================================
// SOURCE READING
// ============================================================================

/// Parse outcome of one input source
#[derive(Debug, Default)]
pub struct ParsedSource {
    pub records: Vec<Record>,
    pub malformed: Vec<MalformedRecord>,
    /// Non-blank data lines seen (header excluded)
    pub lines: usize,
    pub parser_version: String,
}

/// Strip the line terminator (`\n` or `\r\n`)
fn trim_line_end(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Parse every line of one source. Blank lines are skipped; the first
/// non-blank line is skipped as a header when `has_headers` is set.
///
/// Only a failing reader is an error. A line that is not valid UTF-8 is
/// malformed like any other unparseable line.
pub fn read_source<R: BufRead>(
    mut reader: R,
    schema: SchemaTag,
    delimiter: u8,
    has_headers: bool,
) -> io::Result<ParsedSource> {
    let parser = get_parser(schema, delimiter);
    let mut parsed = ParsedSource {
        parser_version: parser.version().to_string(),
        ..ParsedSource::default()
    };
    let mut header_pending = has_headers;
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        let raw = trim_line_end(&buf);
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        if header_pending {
            header_pending = false;
            continue;
        }

        parsed.lines += 1;
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(_) => {
                let lossy = String::from_utf8_lossy(raw);
                let malformed = MalformedRecord::new(schema, &lossy, "line", "invalid UTF-8");
                parsed.malformed.push(malformed.at_line(line_number));
                continue;
            }
        };

        match parser.parse_line(line) {
            Ok(record) => parsed.records.push(record),
            Err(malformed) => parsed.malformed.push(malformed.at_line(line_number)),
        }
    }

    Ok(parsed)
}

// ============================================================================
// GROUP + MERGE OVER PARTITIONS
// ============================================================================

/// Merged rows in output order plus every conflict resolved along the way
#[derive(Debug, Default)]
pub struct StageOutput {
    pub merged: Vec<MergedRecord>,
    pub conflicts: Vec<DuplicateKeyConflict>,
}

/// Group and merge `records` over `partitions` worker threads
pub fn run_stages(
    records: Vec<Record>,
    partitions: usize,
    policy: MemberConflictPolicy,
    engine: MergeEngine,
) -> Result<StageOutput> {
    let parts = partition(records, partitions);

    let results: Vec<Result<(Vec<DuplicateKeyConflict>, Vec<MergedRecord>)>> =
        std::thread::scope(|scope| {
            let handles: Vec<_> = parts
                .into_iter()
                .enumerate()
                .filter(|(_, part)| !part.is_empty())
                .map(|(idx, part)| {
                    let handle = scope.spawn(move || {
                        debug!(partition = idx, records = part.len(), "merging partition");
                        let grouped = group_with(part, policy);
                        (grouped.conflicts(), engine.merge_all(&grouped))
                    });
                    (idx, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(idx, handle)| handle.join().map_err(|_| FitJoinError::WorkerPanicked(idx)))
                .collect()
        });

    let mut output = StageOutput::default();
    for result in results {
        let (conflicts, merged) = result?;
        output.conflicts.extend(conflicts);
        output.merged.extend(merged);
    }

    sort_merged(&mut output.merged);
    output.conflicts.sort();
    Ok(output)
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Everything a join produced, before anything is written
#[derive(Debug)]
pub struct JoinOutcome {
    pub merged: Vec<MergedRecord>,
    pub malformed: Vec<MalformedRecord>,
    pub conflicts: Vec<DuplicateKeyConflict>,
    pub report: RunReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn engine(&self) -> MergeEngine {
        MergeEngine::with_policies(self.config.activity_policy, self.config.coverage)
    }

    /// Parse both sources without grouping; used for validation-only runs
    pub fn parse_sources<M: BufRead, A: BufRead>(
        &self,
        members: M,
        activity: A,
    ) -> Result<(ParsedSource, ParsedSource)> {
        let delimiter = self.config.delimiter_byte();
        let has_headers = self.config.has_headers;

        let members = read_source(members, SchemaTag::Member, delimiter, has_headers)
            .map_err(|e| FitJoinError::io(&self.config.members_input, e))?;
        let activity = read_source(activity, SchemaTag::Activity, delimiter, has_headers)
            .map_err(|e| FitJoinError::io(&self.config.activity_input, e))?;

        Ok((members, activity))
    }

    /// Run the join over two readers. Nothing is written.
    pub fn join<M: BufRead, A: BufRead>(&self, members: M, activity: A) -> Result<JoinOutcome> {
        let mut report = RunReport::new(self.config.partitions);
        let (members, activity) = self.parse_sources(members, activity)?;

        report.member_lines = members.lines;
        report.activity_lines = activity.lines;
        report.members_parsed = members.records.len();
        report.activities_parsed = activity.records.len();
        report.member_parser_version = members.parser_version;
        report.activity_parser_version = activity.parser_version;

        let mut malformed = members.malformed;
        malformed.extend(activity.malformed);
        report.malformed = malformed.len();
        for bad in &malformed {
            warn!(
                schema = %bad.schema,
                line = bad.line_number,
                field = %bad.field,
                "{}",
                bad.reason
            );
        }

        info!(
            members = report.members_parsed,
            activities = report.activities_parsed,
            malformed = report.malformed,
            partitions = self.config.partitions,
            "parsed inputs"
        );

        let mut records = members.records;
        records.extend(activity.records);
        let stages = run_stages(
            records,
            self.config.partitions,
            self.config.member_policy,
            self.engine(),
        )?;

        for conflict in &stages.conflicts {
            debug!(
                kind = ?conflict.kind,
                key = %conflict.key,
                count = conflict.count,
                "duplicate key resolved"
            );
        }
        report.record_conflicts(&stages.conflicts);
        report.record_output(&stages.merged);

        if !report.is_balanced() {
            warn!(
                reconciliation = ?report.reconciliation,
                "merged output does not reconcile with parsed input"
            );
        }

        Ok(JoinOutcome {
            merged: stages.merged,
            malformed,
            conflicts: stages.conflicts,
            report,
        })
    }

    /// Read the configured inputs, join, and write output (and dead letters)
    pub fn run(&self) -> Result<RunReport> {
        let members = open_input(&self.config.members_input)?;
        let activity = open_input(&self.config.activity_input)?;

        let outcome = self.join(members, activity)?;
        let mut report = outcome.report;

        self.write_output(&outcome.merged)?;
        if let Some(path) = &self.config.dead_letter {
            self.write_dead_letters(path, &outcome.malformed)?;
        }

        report.finish();
        info!(run_id = %report.run_id, "{}", report.summary());
        Ok(report)
    }

    fn write_output(&self, merged: &[MergedRecord]) -> Result<()> {
        let path = &self.config.output;
        let sink = create_output(path)?;

        let mut emitter =
            RecordEmitter::new(sink, self.config.delimiter_byte(), self.config.precision);
        let io_err = |e| FitJoinError::io(path, e);

        if self.config.output_header {
            emitter.write_header().map_err(io_err)?;
        }
        emitter.emit_all(merged).map_err(io_err)?;
        let written = emitter.written();
        emitter.finish().map_err(io_err)?;

        info!(path = %path.display(), rows = written, "wrote merged output");
        Ok(())
    }

    fn write_dead_letters(&self, path: &Path, malformed: &[MalformedRecord]) -> Result<()> {
        let sink = create_output(path)?;
        let io_err = |e| FitJoinError::io(path, e);

        let mut writer = DeadLetterWriter::new(sink, self.config.delimiter_byte());
        writer.write_header().map_err(io_err)?;
        for bad in malformed {
            writer.write(bad).map_err(io_err)?;
        }
        let written = writer.written();
        writer.finish().map_err(io_err)?;

        info!(path = %path.display(), rows = written, "wrote dead letters");
        Ok(())
    }
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| FitJoinError::io(path, e))?;
    Ok(BufReader::new(file))
}

fn create_output(path: &Path) -> Result<impl Write> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FitJoinError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| FitJoinError::io(path, e))?;
    Ok(BufWriter::new(file))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_PARTITIONS;
    use crate::records::Completeness;
    use std::io::Cursor;

    const MEMBERS: &str = "memberID,name,gender,age,heightCm,weightKg\n\
m1,Ann,F,30,165,60\n\
m2,Bo,M,41,180,82.5\n";

    const ACTIVITY: &str = "memberID,date,caloriesConsumed,caloriesBurned,sleepHours\n\
m1,2024-01-01,2000,1800,7\n\
\n\
m3,2024-01-01,1500,1200,6\n";

    #[test]
    fn test_read_source_skips_header_and_blank_lines() {
        let parsed = read_source(Cursor::new(ACTIVITY), SchemaTag::Activity, b',', true).unwrap();
        assert_eq!(parsed.lines, 2);
        assert_eq!(parsed.records.len(), 2);
        assert!(parsed.malformed.is_empty());
    }

    #[test]
    fn test_read_source_numbers_malformed_lines() {
        let input = "m1,Ann,F,30,165,60\nm2,Bo,M,-4,180,80\n";
        let parsed = read_source(Cursor::new(input), SchemaTag::Member, b',', false).unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].line_number, 2);
        assert_eq!(parsed.malformed[0].field, "age");
    }

    #[test]
    fn test_read_source_keeps_line_numbers_across_blank_lines() {
        let input = "m1,Ann,F,30,165,60\r\n\r\nm2,Bo,M,41,180,x\r\n";
        let parsed = read_source(Cursor::new(input), SchemaTag::Member, b',', false).unwrap();

        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.malformed[0].line_number, 3);
        assert_eq!(parsed.malformed[0].field, "weightKg");
        assert_eq!(parsed.parser_version, "1.0.0");
    }

    #[test]
    fn test_invalid_utf8_line_is_malformed_not_fatal() {
        let mut input = b"memberID,date,caloriesConsumed,caloriesBurned,sleepHours\n".to_vec();
        input.extend_from_slice(b"m1,2024-01-01,2000,1800,7\n");
        input.extend_from_slice(b"m1,2024-01-02,\xff\xfe,1800,7\n");
        input.extend_from_slice(b"m1,2024-01-03,1900,1700,6\n");

        let parsed =
            read_source(Cursor::new(input.as_slice()), SchemaTag::Activity, b',', true).unwrap();
        assert_eq!(parsed.lines, 3);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].line_number, 3);
        assert_eq!(parsed.malformed[0].field, "line");
        assert_eq!(parsed.malformed[0].reason, "invalid UTF-8");
        assert!(parsed.malformed[0].line.starts_with("m1,2024-01-02,"));

        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let outcome = pipeline
            .join(Cursor::new(MEMBERS), Cursor::new(input.as_slice()))
            .unwrap();
        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.report.malformed, 1);
        assert!(outcome.report.is_balanced());
    }

    #[test]
    fn test_more_partitions_than_members() {
        let outcome = Pipeline::new(PipelineConfig {
            partitions: MAX_PARTITIONS,
            ..PipelineConfig::default()
        })
        .unwrap()
        .join(Cursor::new(MEMBERS), Cursor::new(ACTIVITY))
        .unwrap();

        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.report.partitions, MAX_PARTITIONS);
    }

    #[test]
    fn test_join_in_memory() {
        crate::logging::init_test();
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let outcome = pipeline.join(Cursor::new(MEMBERS), Cursor::new(ACTIVITY)).unwrap();

        assert_eq!(outcome.merged.len(), 2);
        assert_eq!(outcome.merged[0].member_id, "m1");
        assert_eq!(outcome.merged[0].completeness, Completeness::Full);
        assert_eq!(outcome.merged[1].member_id, "m3");
        assert_eq!(outcome.merged[1].completeness, Completeness::ActivityOnly);

        assert_eq!(outcome.report.full, 1);
        assert_eq!(outcome.report.activity_only, 1);
        assert_eq!(outcome.report.member_only, 0);
        assert!(outcome.report.is_balanced());
        assert_eq!(outcome.report.member_parser_version, "1.0.0");
    }

    #[test]
    fn test_partition_count_does_not_change_output() {
        let single = Pipeline::new(PipelineConfig {
            partitions: 1,
            ..PipelineConfig::default()
        })
        .unwrap()
        .join(Cursor::new(MEMBERS), Cursor::new(ACTIVITY))
        .unwrap();

        let many = Pipeline::new(PipelineConfig {
            partitions: 7,
            ..PipelineConfig::default()
        })
        .unwrap()
        .join(Cursor::new(MEMBERS), Cursor::new(ACTIVITY))
        .unwrap();

        assert_eq!(single.merged, many.merged);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            partitions: 0,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config).is_err());
    }
}
