// 📤 Emitter - merged records → delimited lines
// Fixed field order, fixed decimal precision, whole records only

use std::io::{self, Write};

use crate::error::MalformedRecord;
use crate::records::MergedRecord;

/// Output schema, in field order
pub const OUTPUT_FIELDS: [&str; 11] = [
    "memberID",
    "date",
    "name",
    "gender",
    "age",
    "heightCm",
    "weightKg",
    "caloriesConsumed",
    "caloriesBurned",
    "sleepHours",
    "completeness",
];

pub const DEAD_LETTER_FIELDS: [&str; 5] = ["schema", "line_number", "field", "reason", "raw_line"];

pub const DEFAULT_PRECISION: usize = 2;

/// Records are handed to the sink only in whole-line batches of roughly this size
const FLUSH_THRESHOLD: usize = 64 * 1024;

// ============================================================================
// LINE ENCODING
// ============================================================================

/// Encode one row, quoting fields that contain the delimiter or quotes
fn encode_line<I, S>(fields: I, delimiter: u8) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields).map_err(io::Error::from)?;
    writer.into_inner().map_err(|e| e.into_error())
}

fn fixed(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_default()
}

/// Field values of a merged record, in `OUTPUT_FIELDS` order. Absent values
/// are empty strings.
pub fn record_fields(record: &MergedRecord, precision: usize) -> Vec<String> {
    vec![
        record.member_id.clone(),
        record
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        record.name.clone().unwrap_or_default(),
        record.gender.map(|g| g.to_string()).unwrap_or_default(),
        record.age.map(|a| a.to_string()).unwrap_or_default(),
        fixed(record.height_cm, precision),
        fixed(record.weight_kg, precision),
        fixed(record.calories_consumed, precision),
        fixed(record.calories_burned, precision),
        fixed(record.sleep_hours, precision),
        record.completeness.to_string(),
    ]
}

/// Single encoded line (without terminator), mostly for logs and tests
pub fn format_record(record: &MergedRecord, delimiter: u8, precision: usize) -> io::Result<String> {
    let bytes = encode_line(record_fields(record, precision), delimiter)?;
    let line = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(line.trim_end_matches('\n').to_string())
}

// ============================================================================
// RECORD EMITTER
// ============================================================================

/// Append-only writer of merged rows.
///
/// Lines are staged in an internal buffer and handed to the sink only at
/// record boundaries, so a sink never observes half a record.
pub struct RecordEmitter<W: Write> {
    sink: W,
    delimiter: u8,
    precision: usize,
    pending: Vec<u8>,
    written: usize,
}

impl<W: Write> RecordEmitter<W> {
    pub fn new(sink: W, delimiter: u8, precision: usize) -> Self {
        RecordEmitter {
            sink,
            delimiter,
            precision,
            pending: Vec::with_capacity(FLUSH_THRESHOLD),
            written: 0,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let line = encode_line(OUTPUT_FIELDS, self.delimiter)?;
        self.stage(line)
    }

    pub fn emit(&mut self, record: &MergedRecord) -> io::Result<()> {
        let line = encode_line(record_fields(record, self.precision), self.delimiter)?;
        self.stage(line)?;
        self.written += 1;
        Ok(())
    }

    pub fn emit_all<'a, I>(&mut self, records: I) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a MergedRecord>,
    {
        let before = self.written;
        for record in records {
            self.emit(record)?;
        }
        Ok(self.written - before)
    }

    /// Records emitted so far (header excluded)
    pub fn written(&self) -> usize {
        self.written
    }

    fn stage(&mut self, line: Vec<u8>) -> io::Result<()> {
        self.pending.extend_from_slice(&line);
        if self.pending.len() >= FLUSH_THRESHOLD {
            self.drain()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.sink.write_all(&self.pending)?;
            self.pending.clear();
        }
        Ok(())
    }

    /// Hand every staged record to the sink and flush it
    pub fn finish(mut self) -> io::Result<W> {
        self.drain()?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

// ============================================================================
// DEAD-LETTER WRITER
// ============================================================================

/// Side output for lines that failed parsing or validation
pub struct DeadLetterWriter<W: Write> {
    sink: W,
    delimiter: u8,
    written: usize,
}

impl<W: Write> DeadLetterWriter<W> {
    pub fn new(sink: W, delimiter: u8) -> Self {
        DeadLetterWriter {
            sink,
            delimiter,
            written: 0,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let line = encode_line(DEAD_LETTER_FIELDS, self.delimiter)?;
        self.sink.write_all(&line)
    }

    pub fn write(&mut self, malformed: &MalformedRecord) -> io::Result<()> {
        let line = encode_line(
            [
                malformed.schema.code().to_string(),
                malformed.line_number.to_string(),
                malformed.field.clone(),
                malformed.reason.clone(),
                malformed.line.clone(),
            ],
            self.delimiter,
        )?;
        self.sink.write_all(&line)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Completeness, Gender, SchemaTag};
    use chrono::NaiveDate;

    fn full_record() -> MergedRecord {
        MergedRecord {
            member_id: "m1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            name: Some("Ann".to_string()),
            gender: Some(Gender::F),
            age: Some(30),
            height_cm: Some(165.0),
            weight_kg: Some(60.0),
            calories_consumed: Some(2000.0),
            calories_burned: Some(1800.0),
            sleep_hours: Some(7.0),
            completeness: Completeness::Full,
            source_count: 1,
        }
    }

    #[test]
    fn test_format_full_record() {
        let line = format_record(&full_record(), b',', 2).unwrap();
        assert_eq!(
            line,
            "m1,2024-01-01,Ann,F,30,165.00,60.00,2000.00,1800.00,7.00,FULL"
        );
    }

    #[test]
    fn test_format_activity_only_leaves_member_fields_empty() {
        let record = MergedRecord {
            name: None,
            gender: None,
            age: None,
            height_cm: None,
            weight_kg: None,
            completeness: Completeness::ActivityOnly,
            ..full_record()
        };

        let line = format_record(&record, b',', 2).unwrap();
        assert_eq!(line, "m1,2024-01-01,,,,,,2000.00,1800.00,7.00,ACTIVITY_ONLY");
    }

    #[test]
    fn test_precision_rounds() {
        let record = MergedRecord {
            sleep_hours: Some(7.3333333),
            ..full_record()
        };
        let line = format_record(&record, b',', 1).unwrap();
        assert!(line.ends_with(",7.3,FULL"));
    }

    #[test]
    fn test_name_with_delimiter_is_quoted() {
        let record = MergedRecord {
            name: Some("Lee, Bo".to_string()),
            ..full_record()
        };
        let line = format_record(&record, b',', 2).unwrap();
        assert!(line.contains("\"Lee, Bo\""));
    }

    #[test]
    fn test_emitter_writes_header_and_records() {
        let mut emitter = RecordEmitter::new(Vec::new(), b',', 2);
        emitter.write_header().unwrap();
        let count = emitter.emit_all(&[full_record(), full_record()]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(emitter.written(), 2);

        let out = String::from_utf8(emitter.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], OUTPUT_FIELDS.join(","));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_emitter_stages_until_finish() {
        let mut sink = Vec::new();
        {
            let mut emitter = RecordEmitter::new(&mut sink, b',', 2);
            emitter.emit(&full_record()).unwrap();
            emitter.finish().unwrap();
        }
        assert_eq!(String::from_utf8(sink).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_dead_letter_row() {
        let mut dead = DeadLetterWriter::new(Vec::new(), b',');
        dead.write_header().unwrap();
        let malformed = MalformedRecord::new(
            SchemaTag::Member,
            "m1,Ann,F,-1,165,60",
            "age",
            "age must be >= 0, got -1",
        );
        dead.write(&malformed.at_line(3)).unwrap();
        assert_eq!(dead.written(), 1);

        let out = String::from_utf8(dead.finish().unwrap()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "schema,line_number,field,reason,raw_line");
        assert_eq!(
            lines[1],
            "MEMBER,3,age,\"age must be >= 0, got -1\",\"m1,Ann,F,-1,165,60\""
        );
    }
}
