//! Purpose: Decode (and build) anonymous-schema BSV tables.
//! Exports: `decode_table`, `Table`, `TableHeader`, `ColumnSchema`, `ColumnKind`, `Value`, `Row`, `TableBuilder`.
//! Role: Pure, reentrant decoder; the same buffer may be decoded from many call sites.
//! Invariants: Every decoded row has exactly one field per column, typed by its schema entry.
//! Invariants: Rows keep input order; no sorting and no deduplication.
//! Invariants: Type-tag predicates are closed-form bit tests; do not rewrite them as ranges.
use crate::core::cursor::{ByteCursor, DEFAULT_VLQ_MAX_BYTES, MAX_UNUM_BYTES};
use crate::core::error::{Error, ErrorKind};

pub const BSV_MAGIC: u8 = 0xBF;
pub const BSV_FORMAT_VERSION: u8 = 1;
pub const BSV_FORMAT_ANONYMOUS: u8 = 1;

const TAG_TEXT: u8 = 0x40;
const TAG_FIXED_EXCEPTION: u8 = 0x51;

/// True when a fixed-size length follows the tag in the schema section.
pub fn tag_has_fixed_size(tag: u8) -> bool {
    (tag.wrapping_sub(0x21) & 0xCF) == 0 && tag != TAG_FIXED_EXCEPTION
}

pub fn tag_is_text(tag: u8) -> bool {
    tag == TAG_TEXT || tag & 0xF0 == 0x40
}

pub fn tag_is_vlq(tag: u8) -> bool {
    matches!(tag, 0x11..=0x13) || tag & 0xF0 == 0x10
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Text,
    Vlq,
    Fixed(u64),
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnSchema {
    pub tag: u8,
    pub fixed_size: Option<u64>,
}

impl ColumnSchema {
    pub fn new(tag: u8) -> Self {
        Self {
            tag,
            fixed_size: None,
        }
    }

    pub fn with_fixed_size(tag: u8, size: u64) -> Self {
        Self {
            tag,
            fixed_size: Some(size),
        }
    }

    pub fn text() -> Self {
        Self::new(TAG_TEXT)
    }

    pub fn vlq() -> Self {
        Self::new(0x11)
    }

    pub fn fixed(size: u64) -> Self {
        Self::with_fixed_size(0x21, size)
    }

    /// Per-column dispatch, evaluated in priority order: text, VLQ, fixed width.
    pub fn kind(&self) -> ColumnKind {
        if tag_is_text(self.tag) {
            ColumnKind::Text
        } else if tag_is_vlq(self.tag) {
            ColumnKind::Vlq
        } else if let Some(size) = self.fixed_size {
            ColumnKind::Fixed(size)
        } else {
            ColumnKind::Unknown
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Text(String),
    Uint(u64),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Uint(_) => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(value) => Some(*value),
            Value::Text(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Row {
    fields: Vec<Value>,
    offset: u64,
}

impl Row {
    pub fn new(fields: Vec<Value>) -> Self {
        Self { fields, offset: 0 }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Byte offset of the row's first field in the decoded buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableHeader {
    /// Informational; parsing is not bounded by it.
    pub header_len: u16,
    pub row_count: u64,
    /// Advisory only.
    pub max_row_size: u64,
    pub schema_version: u64,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Table {
    pub header: TableHeader,
    pub rows: Vec<Row>,
}

pub fn decode_table(buf: &[u8]) -> Result<Table, Error> {
    if buf.len() < 2 {
        return Err(Error::new(ErrorKind::Format)
            .with_message("BSV data too short")
            .with_offset(0));
    }
    if buf[0] != BSV_MAGIC {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!(
                "invalid BSV magic: expected 0x{BSV_MAGIC:02X}, got 0x{:02X}",
                buf[0]
            ))
            .with_offset(0));
    }
    let version = buf[1] >> 4;
    let format = buf[1] & 0x0F;
    if version != BSV_FORMAT_VERSION {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!(
                "unsupported BSV version {version} (supported: {BSV_FORMAT_VERSION})"
            ))
            .with_offset(1));
    }
    if format != BSV_FORMAT_ANONYMOUS {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!(
                "unsupported BSV format kind {format} (only anonymous schema {BSV_FORMAT_ANONYMOUS} is supported)"
            ))
            .with_offset(1));
    }

    let mut cursor = ByteCursor::at(buf, 2);
    let header = read_header(&mut cursor)?;
    check_row_budget(&header, &cursor)?;

    let capacity = usize::try_from(header.row_count)
        .unwrap_or(usize::MAX)
        .min(cursor.remaining());
    let mut rows = Vec::with_capacity(capacity);
    for row_index in 0..header.row_count {
        rows.push(read_row(&mut cursor, &header.columns, row_index)?);
    }

    Ok(Table { header, rows })
}

/// Rejects row counts the remaining input cannot hold before any row is read.
/// Tables with an unknown column are left to fail on their first row.
fn check_row_budget(header: &TableHeader, cursor: &ByteCursor<'_>) -> Result<(), Error> {
    if header.row_count == 0 {
        return Ok(());
    }
    let mut min_row_bytes: u64 = 0;
    for column in &header.columns {
        let width = match column.kind() {
            ColumnKind::Text | ColumnKind::Vlq => 1,
            ColumnKind::Fixed(size) => size,
            ColumnKind::Unknown => return Ok(()),
        };
        min_row_bytes = min_row_bytes.saturating_add(width);
    }
    let offset = cursor.position() as u64;
    if min_row_bytes == 0 {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!(
                "BSV table declares {} rows but its columns occupy no bytes",
                header.row_count
            ))
            .with_offset(offset));
    }
    let remaining = cursor.remaining() as u64;
    if header.row_count > remaining / min_row_bytes {
        return Err(Error::new(ErrorKind::Format)
            .with_message(format!(
                "BSV table declares {} rows of at least {min_row_bytes} bytes but only {remaining} bytes remain",
                header.row_count
            ))
            .with_offset(offset));
    }
    Ok(())
}

fn read_header(cursor: &mut ByteCursor<'_>) -> Result<TableHeader, Error> {
    let header_len = cursor.read_unum(2)? as u16;
    let row_count = cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?;
    let max_row_size = cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?;
    let schema_version = cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?;
    let schema_count = cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?;

    let capacity = usize::try_from(schema_count)
        .unwrap_or(usize::MAX)
        .min(cursor.remaining());
    let mut columns = Vec::with_capacity(capacity);
    for _ in 0..schema_count {
        let tag = cursor.read_byte()?;
        let fixed_size = if tag_has_fixed_size(tag) {
            Some(cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?)
        } else {
            None
        };
        columns.push(ColumnSchema { tag, fixed_size });
    }

    Ok(TableHeader {
        header_len,
        row_count,
        max_row_size,
        schema_version,
        columns,
    })
}

fn read_row(
    cursor: &mut ByteCursor<'_>,
    columns: &[ColumnSchema],
    row_index: u64,
) -> Result<Row, Error> {
    let offset = cursor.position() as u64;
    let mut fields = Vec::with_capacity(columns.len());
    for (column_index, column) in columns.iter().enumerate() {
        let value = match column.kind() {
            ColumnKind::Text => Value::Text(cursor.read_text()?),
            ColumnKind::Vlq => Value::Uint(cursor.read_vlq(DEFAULT_VLQ_MAX_BYTES)?),
            ColumnKind::Fixed(size) => {
                let width = usize::try_from(size).unwrap_or(usize::MAX);
                Value::Uint(cursor.read_unum(width)?)
            }
            ColumnKind::Unknown => {
                return Err(Error::new(ErrorKind::Format)
                    .with_message(format!(
                        "unknown BSV type tag 0x{:02X} (row {row_index}, column {column_index})",
                        column.tag
                    ))
                    .with_offset(cursor.position() as u64));
            }
        };
        fields.push(value);
    }
    Ok(Row { fields, offset })
}

/// Encodes anonymous-schema tables in the layout `decode_table` reads.
#[derive(Clone, Debug, Default)]
pub struct TableBuilder {
    schema_version: u64,
    columns: Vec<ColumnSchema>,
    rows: Vec<Vec<Value>>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row(mut self, fields: Vec<Value>) -> Self {
        self.rows.push(fields);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut schema = Vec::new();
        for column in &self.columns {
            schema.push(column.tag);
            match (tag_has_fixed_size(column.tag), column.fixed_size) {
                (true, Some(size)) => write_vlq(&mut schema, size)?,
                (true, None) => {
                    return Err(encode_error(format!(
                        "type tag 0x{:02X} requires a fixed size",
                        column.tag
                    )));
                }
                (false, Some(_)) => {
                    return Err(encode_error(format!(
                        "type tag 0x{:02X} cannot carry a fixed size",
                        column.tag
                    )));
                }
                (false, None) => {}
            }
        }

        let mut body = Vec::new();
        let mut max_row_size = 0usize;
        for (row_index, fields) in self.rows.iter().enumerate() {
            if fields.len() != self.columns.len() {
                return Err(encode_error(format!(
                    "row {row_index} has {} fields, schema has {}",
                    fields.len(),
                    self.columns.len()
                )));
            }
            let start = body.len();
            for (column, value) in self.columns.iter().zip(fields) {
                write_field(&mut body, column, value)?;
            }
            max_row_size = max_row_size.max(body.len() - start);
        }

        let mut counts = Vec::new();
        write_vlq(&mut counts, self.rows.len() as u64)?;
        write_vlq(&mut counts, max_row_size as u64)?;
        write_vlq(&mut counts, self.schema_version)?;
        write_vlq(&mut counts, self.columns.len() as u64)?;

        let header_len = 4 + counts.len() + schema.len();
        let header_len = u16::try_from(header_len)
            .map_err(|_| encode_error("BSV header exceeds 65535 bytes"))?;

        let mut out = Vec::with_capacity(usize::from(header_len) + body.len());
        out.push(BSV_MAGIC);
        out.push((BSV_FORMAT_VERSION << 4) | BSV_FORMAT_ANONYMOUS);
        out.extend_from_slice(&header_len.to_be_bytes());
        out.extend_from_slice(&counts);
        out.extend_from_slice(&schema);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn write_field(out: &mut Vec<u8>, column: &ColumnSchema, value: &Value) -> Result<(), Error> {
    match (column.kind(), value) {
        (ColumnKind::Text, Value::Text(text)) => {
            if text.as_bytes().contains(&0) {
                return Err(encode_error("text fields cannot contain NUL"));
            }
            out.extend_from_slice(text.as_bytes());
            out.push(0);
            Ok(())
        }
        (ColumnKind::Vlq, Value::Uint(value)) => write_vlq(out, *value),
        (ColumnKind::Fixed(size), Value::Uint(value)) => {
            let width = usize::try_from(size).unwrap_or(usize::MAX);
            if width > MAX_UNUM_BYTES {
                return Err(encode_error(format!(
                    "fixed width {size} exceeds {MAX_UNUM_BYTES} bytes"
                )));
            }
            if width < MAX_UNUM_BYTES && *value >> (width * 8) != 0 {
                return Err(encode_error(format!(
                    "value {value} does not fit in {width} bytes"
                )));
            }
            out.extend_from_slice(&value.to_be_bytes()[MAX_UNUM_BYTES - width..]);
            Ok(())
        }
        (ColumnKind::Unknown, _) => Err(encode_error(format!(
            "cannot encode values for type tag 0x{:02X}",
            column.tag
        ))),
        _ => Err(encode_error(format!(
            "value {value:?} does not match type tag 0x{:02X}",
            column.tag
        ))),
    }
}

fn write_vlq(out: &mut Vec<u8>, value: u64) -> Result<(), Error> {
    let max_bits = 7 * DEFAULT_VLQ_MAX_BYTES;
    if value >> max_bits != 0 {
        return Err(encode_error(format!(
            "value {value} exceeds {max_bits}-bit variable-length range"
        )));
    }
    let mut groups = Vec::with_capacity(DEFAULT_VLQ_MAX_BYTES);
    let mut rest = value;
    loop {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    let last = groups.len() - 1;
    for (index, group) in groups.iter().rev().enumerate() {
        out.push(if index == last { *group } else { *group | 0x80 });
    }
    Ok(())
}

fn encode_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Usage).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::{
        ColumnKind, ColumnSchema, TableBuilder, Value, decode_table, tag_has_fixed_size,
        tag_is_text, tag_is_vlq, write_vlq,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn fixed_size_predicate_matches_bit_pattern() {
        let tags: Vec<u8> = (0..=u8::MAX).filter(|tag| tag_has_fixed_size(*tag)).collect();
        assert_eq!(tags, vec![0x21, 0x31, 0x41]);
        assert!(!tag_has_fixed_size(0x51));
    }

    #[test]
    fn text_and_vlq_predicates() {
        assert!(tag_is_text(0x40));
        assert!(tag_is_text(0x4F));
        assert!(!tag_is_text(0x50));
        assert!(tag_is_vlq(0x11));
        assert!(tag_is_vlq(0x10));
        assert!(tag_is_vlq(0x1F));
        assert!(!tag_is_vlq(0x21));
    }

    #[test]
    fn dispatch_prefers_text_over_fixed_size() {
        let column = ColumnSchema::with_fixed_size(0x41, 4);
        assert_eq!(column.kind(), ColumnKind::Text);
        assert_eq!(ColumnSchema::new(0x51).kind(), ColumnKind::Unknown);
        assert_eq!(ColumnSchema::fixed(8).kind(), ColumnKind::Fixed(8));
        assert_eq!(ColumnSchema::new(0x13).kind(), ColumnKind::Vlq);
    }

    #[test]
    fn vlq_encoding_matches_decoder_layout() {
        let mut out = Vec::new();
        write_vlq(&mut out, 130).expect("vlq");
        assert_eq!(out, vec![0x81, 0x02]);

        out.clear();
        write_vlq(&mut out, 5).expect("vlq");
        assert_eq!(out, vec![0x05]);

        out.clear();
        let err = write_vlq(&mut out, 1 << 56).expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn decodes_hand_written_table() {
        let buf = [
            0xBF, 0x11, // magic, version 1 / anonymous
            0x00, 0x0C, // header length
            0x02, // rows
            0x09, // max row size
            0x00, // schema version
            0x03, // columns
            0x40, // text
            0x11, // vlq
            0x21, 0x02, // fixed width, 2 bytes
            b'a', 0x00, 0x81, 0x02, 0x12, 0x34, //
            b'b', b'c', 0x00, 0x05, 0x00, 0x01,
        ];
        let table = decode_table(&buf).expect("decode");
        assert_eq!(table.header.header_len, 12);
        assert_eq!(table.header.row_count, 2);
        assert_eq!(table.header.max_row_size, 9);
        assert_eq!(
            table.header.columns,
            vec![
                ColumnSchema::new(0x40),
                ColumnSchema::new(0x11),
                ColumnSchema::with_fixed_size(0x21, 2),
            ]
        );
        assert_eq!(
            table.rows[0].fields(),
            &[Value::text("a"), Value::Uint(130), Value::Uint(0x1234)]
        );
        assert_eq!(
            table.rows[1].fields(),
            &[Value::text("bc"), Value::Uint(5), Value::Uint(1)]
        );
        assert_eq!(table.rows[0].offset(), 12);
        assert_eq!(table.rows[1].offset(), 18);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = decode_table(&[0xBE, 0x11, 0x00]).expect_err("magic");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(0));
        assert!(err.message().unwrap_or_default().contains("0xBE"));
    }

    #[test]
    fn rejects_unsupported_version_and_kind() {
        let err = decode_table(&[0xBF, 0x21, 0x00]).expect_err("version");
        assert!(err.message().unwrap_or_default().contains("version 2"));

        let err = decode_table(&[0xBF, 0x12, 0x00]).expect_err("format");
        assert!(err.message().unwrap_or_default().contains("format kind 2"));
        assert_eq!(err.offset(), Some(1));
    }

    #[test]
    fn rejects_short_buffer() {
        let err = decode_table(&[0xBF]).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn carved_out_tag_reads_no_size_and_fails_on_rows() {
        let empty = [0xBF, 0x11, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x51];
        let table = decode_table(&empty).expect("schema only");
        assert_eq!(table.header.columns, vec![ColumnSchema::new(0x51)]);
        assert!(table.rows.is_empty());

        let with_row = [0xBF, 0x11, 0x00, 0x08, 0x01, 0x01, 0x00, 0x01, 0x51, 0x07];
        let err = decode_table(&with_row).expect_err("unknown tag");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.message().unwrap_or_default().contains("0x51"));
        assert_eq!(err.offset(), Some(9));
    }

    #[test]
    fn truncated_row_is_format_error() {
        let bytes = TableBuilder::new()
            .column(ColumnSchema::text())
            .column(ColumnSchema::fixed(8))
            .row(vec![Value::text("x"), Value::Uint(7)])
            .encode()
            .expect("encode");
        let err = decode_table(&bytes[..bytes.len() - 3]).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.offset().is_some());
    }

    #[test]
    fn rows_without_width_are_rejected() {
        // 2^21 - 1 rows, no columns.
        let no_columns = [0xBF, 0x11, 0x00, 0x00, 0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x00];
        let err = decode_table(&no_columns).expect_err("zero width");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(10));

        let zero_fixed = [0xBF, 0x11, 0x00, 0x00, 0x7F, 0x00, 0x00, 0x01, 0x21, 0x00];
        let err = decode_table(&zero_fixed).expect_err("zero fixed");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.message().unwrap_or_default().contains("no bytes"));

        let no_rows = [0xBF, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(decode_table(&no_rows).expect("empty").rows.is_empty());
    }

    #[test]
    fn row_count_beyond_input_fails_before_reading() {
        // 2^56 - 1 rows of one VLQ column, two bytes of data.
        let mut buf = vec![0xBF, 0x11, 0x00, 0x00];
        buf.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]);
        buf.extend_from_slice(&[0x00, 0x00, 0x01, 0x11, 0x01, 0x02]);
        let err = decode_table(&buf).expect_err("too many rows");
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.offset(), Some(16));
        assert!(err.message().unwrap_or_default().contains("2 bytes remain"));
    }

    #[test]
    fn builder_round_trips_every_family() {
        let columns = [
            ColumnSchema::text(),
            ColumnSchema::new(0x4A),
            ColumnSchema::vlq(),
            ColumnSchema::new(0x1C),
            ColumnSchema::fixed(8),
            ColumnSchema::with_fixed_size(0x31, 3),
            ColumnSchema::with_fixed_size(0x41, 2),
        ];
        let rows = vec![
            vec![
                Value::text("master"),
                Value::text(""),
                Value::Uint(0),
                Value::Uint((1 << 56) - 1),
                Value::Uint(u64::MAX),
                Value::Uint(0xABCDEF),
                Value::text("fixed-tag text"),
            ],
            vec![
                Value::text("第二"),
                Value::text("x"),
                Value::Uint(300),
                Value::Uint(1),
                Value::Uint(0xDEADBEEF),
                Value::Uint(0),
                Value::text(""),
            ],
        ];
        let mut builder = TableBuilder::new().schema_version(3);
        for column in columns {
            builder = builder.column(column);
        }
        for row in &rows {
            builder = builder.row(row.clone());
        }
        let table = decode_table(&builder.encode().expect("encode")).expect("decode");
        assert_eq!(table.header.schema_version, 3);
        assert_eq!(table.header.columns, columns.to_vec());
        let decoded: Vec<Vec<Value>> = table.rows.iter().map(|row| row.fields().to_vec()).collect();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn builder_rejects_mismatched_values() {
        let err = TableBuilder::new()
            .column(ColumnSchema::fixed(1))
            .row(vec![Value::Uint(256)])
            .encode()
            .expect_err("overflow");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = TableBuilder::new()
            .column(ColumnSchema::new(0x21))
            .encode()
            .expect_err("missing size");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = TableBuilder::new()
            .column(ColumnSchema::text())
            .row(vec![Value::Uint(1)])
            .encode()
            .expect_err("type mismatch");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
