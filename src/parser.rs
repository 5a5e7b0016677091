// 🏗️ Record Parser - raw delimited lines → typed records
// One parser per schema behind a common trait; pure functions, no I/O

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::trace;

use crate::error::MalformedRecord;
use crate::keys::parse_date;
use crate::records::{ActivityRecord, Gender, MemberRecord, Record, SchemaTag};
use crate::validation::{
    first_failure, validate_age, validate_member_id, validate_non_negative, validate_positive,
    validate_sleep_hours, ValidationResult,
};

pub const DEFAULT_DELIMITER: u8 = b',';

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// RecordParser - converts one raw line of a given schema.
///
/// Never coerces: any unparseable or out-of-range field fails with a
/// `MalformedRecord` naming that field.
pub trait RecordParser: Send + Sync {
    fn parse_line(&self, line: &str) -> Result<Record, MalformedRecord>;

    fn schema(&self) -> SchemaTag;

    /// Parser version, carried into the run report
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// Parse one line with the default delimiter
pub fn parse(line: &str, schema: SchemaTag) -> Result<Record, MalformedRecord> {
    get_parser(schema, DEFAULT_DELIMITER).parse_line(line)
}

/// Factory: parser for a schema and delimiter
pub fn get_parser(schema: SchemaTag, delimiter: u8) -> Box<dyn RecordParser> {
    match schema {
        SchemaTag::Member => Box::new(MemberParser::new(delimiter)),
        SchemaTag::Activity => Box::new(ActivityParser::new(delimiter)),
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Split one line into trimmed fields. Double-quoted fields may contain the
/// delimiter.
fn split_fields(
    schema: SchemaTag,
    line: &str,
    delimiter: u8,
) -> Result<StringRecord, MalformedRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => {}
        Ok(false) => return Err(MalformedRecord::new(schema, line, "line", "line is empty")),
        Err(e) => {
            return Err(MalformedRecord::new(
                schema,
                line,
                "line",
                format!("cannot split fields: {}", e),
            ))
        }
    }

    let expected = schema.field_count();
    if record.len() != expected {
        return Err(MalformedRecord::new(
            schema,
            line,
            "line",
            format!("expected {} fields, found {}", expected, record.len()),
        ));
    }

    Ok(record)
}

/// `-0` is folded into `0` so every accepted value has one encoding
fn parse_f64(
    schema: SchemaTag,
    line: &str,
    field: &str,
    raw: &str,
) -> Result<f64, MalformedRecord> {
    let value = raw.parse::<f64>().map_err(|_| {
        MalformedRecord::new(schema, line, field, format!("not a number: '{}'", raw))
    })?;
    Ok(value + 0.0)
}

fn check(
    schema: SchemaTag,
    line: &str,
    results: Vec<ValidationResult>,
) -> Result<(), MalformedRecord> {
    match first_failure(results) {
        Some(failure) => {
            trace!(
                %schema,
                rule = %failure.rule_name,
                field = %failure.field,
                "validation rule failed"
            );
            Err(MalformedRecord::new(schema, line, &failure.field, failure.message))
        }
        None => Ok(()),
    }
}

// ============================================================================
// MEMBER PARSER
// ============================================================================

/// `memberID,name,gender,age,heightCm,weightKg`
pub struct MemberParser {
    delimiter: u8,
}

impl MemberParser {
    pub fn new(delimiter: u8) -> Self {
        MemberParser { delimiter }
    }
}

impl Default for MemberParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl RecordParser for MemberParser {
    fn parse_line(&self, line: &str) -> Result<Record, MalformedRecord> {
        let schema = SchemaTag::Member;
        let fields = split_fields(schema, line, self.delimiter)?;

        let member_id = &fields[0];
        let name = &fields[1];

        let gender: Gender = fields[2]
            .parse()
            .map_err(|reason: String| MalformedRecord::new(schema, line, "gender", reason))?;

        let age = fields[3].parse::<i64>().map_err(|_| {
            MalformedRecord::new(schema, line, "age", format!("not an integer: '{}'", &fields[3]))
        })?;
        let height_cm = parse_f64(schema, line, "heightCm", &fields[4])?;
        let weight_kg = parse_f64(schema, line, "weightKg", &fields[5])?;

        check(
            schema,
            line,
            vec![
                validate_member_id(member_id),
                validate_age(age),
                validate_positive("heightCm", height_cm),
                validate_positive("weightKg", weight_kg),
            ],
        )?;

        Ok(Record::Member(MemberRecord {
            member_id: member_id.to_string(),
            name: name.to_string(),
            gender,
            age: age as u32,
            height_cm,
            weight_kg,
        }))
    }

    fn schema(&self) -> SchemaTag {
        SchemaTag::Member
    }
}

// ============================================================================
// ACTIVITY PARSER
// ============================================================================

/// `memberID,date,caloriesConsumed,caloriesBurned,sleepHours`
pub struct ActivityParser {
    delimiter: u8,
}

impl ActivityParser {
    pub fn new(delimiter: u8) -> Self {
        ActivityParser { delimiter }
    }
}

impl Default for ActivityParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl RecordParser for ActivityParser {
    fn parse_line(&self, line: &str) -> Result<Record, MalformedRecord> {
        let schema = SchemaTag::Activity;
        let fields = split_fields(schema, line, self.delimiter)?;

        let member_id = &fields[0];
        let date = parse_date(&fields[1]).ok_or_else(|| {
            let reason = format!("unparseable date: '{}'", &fields[1]);
            MalformedRecord::new(schema, line, "date", reason)
        })?;
        let calories_consumed = parse_f64(schema, line, "caloriesConsumed", &fields[2])?;
        let calories_burned = parse_f64(schema, line, "caloriesBurned", &fields[3])?;
        let sleep_hours = parse_f64(schema, line, "sleepHours", &fields[4])?;

        check(
            schema,
            line,
            vec![
                validate_member_id(member_id),
                validate_non_negative("caloriesConsumed", calories_consumed),
                validate_non_negative("caloriesBurned", calories_burned),
                validate_sleep_hours(sleep_hours),
            ],
        )?;

        Ok(Record::Activity(ActivityRecord {
            member_id: member_id.to_string(),
            date,
            calories_consumed,
            calories_burned,
            sleep_hours,
        }))
    }

    fn schema(&self) -> SchemaTag {
        SchemaTag::Activity
    }
}

// ============================================================================
// TESTS
// ============================================================================
