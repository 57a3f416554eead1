//! Purpose: Lock the BSV wire contract and content addressing through the public API.
//! Exports: Integration tests only (no runtime exports).
//! Role: Catch drift in tag dispatch, header layout, and hname derivation.
//! Invariants: Byte fixtures are written out by hand, independent of `TableBuilder`.
//! Invariants: Known hname vectors stay pinned.

use mdbfetch::api::{
    ColumnKind, ColumnSchema, ErrorKind, TableBuilder, Value, decode_table, hname,
    parse_content_manifest, parse_root_manifest,
};

fn header(row_count: u8, schema: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xBF, 0x11, 0x00, 0x00, row_count, 0x20, 0x00];
    bytes.extend_from_slice(schema);
    bytes
}

#[test]
fn hand_written_root_table_decodes() {
    // text, vlq, fixed(8)
    let mut bytes = header(2, &[0x03, 0x40, 0x11, 0x21, 0x08]);
    bytes.extend_from_slice(b"Windows\0");
    bytes.extend_from_slice(&[0x87, 0x68]);
    bytes.extend_from_slice(&0xDEAD_BEEFu64.to_be_bytes());
    bytes.extend_from_slice(b"iOS\0");
    bytes.push(0x05);
    bytes.extend_from_slice(&1u64.to_be_bytes());

    let table = decode_table(&bytes).expect("decode");
    assert_eq!(table.header.row_count, 2);
    assert_eq!(table.header.max_row_size, 0x20);
    assert_eq!(
        table
            .header
            .columns
            .iter()
            .map(|column| column.kind())
            .collect::<Vec<_>>(),
        [ColumnKind::Text, ColumnKind::Vlq, ColumnKind::Fixed(8)]
    );

    let roots = parse_root_manifest(&bytes).expect("roots");
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].platform, "Windows");
    assert_eq!(roots[0].size, 1000);
    assert_eq!(roots[0].checksum, 0xDEAD_BEEF);
    assert_eq!(roots[0].hname(), "EAOQ3DBNJATH6OEEKH66B7KJZC2YGZ7E");
    assert_eq!(roots[1].size, 5);
}

#[test]
fn sized_text_tag_reads_as_text() {
    // 0x41 carries a size in the schema but dispatches as text.
    let mut bytes = header(1, &[0x02, 0x41, 0x02, 0x31, 0x04]);
    bytes.extend_from_slice(b"abc\0");
    bytes.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]);

    let table = decode_table(&bytes).expect("decode");
    assert_eq!(table.header.columns[0].fixed_size, Some(2));
    assert_eq!(table.rows[0].get(0), Some(&Value::text("abc")));
    assert_eq!(table.rows[0].get(1), Some(&Value::Uint(256)));
}

#[test]
fn tag_0x51_has_no_size_and_fails_on_read() {
    // Schema-only: 0x51 consumes no size byte, so 0x40 is the next column.
    let schema_only = header(0, &[0x02, 0x51, 0x40]);
    let table = decode_table(&schema_only).expect("schema only");
    assert_eq!(table.header.columns.len(), 2);
    assert_eq!(table.header.columns[0].fixed_size, None);
    assert_eq!(table.header.columns[0].kind(), ColumnKind::Unknown);

    let mut with_row = header(1, &[0x02, 0x51, 0x40]);
    with_row.extend_from_slice(b"x\0");
    let err = decode_table(&with_row).expect_err("unknown tag");
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.message().unwrap_or_default().contains("0x51"));
    assert_eq!(err.offset(), Some(10));
}

#[test]
fn truncated_row_is_format_error() {
    let mut bytes = header(2, &[0x01, 0x11]);
    bytes.push(0x01);
    let err = decode_table(&bytes).expect_err("truncated");
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn wrong_version_nibble_is_rejected() {
    let err = decode_table(&[0xBF, 0x21, 0x00, 0x00]).expect_err("version");
    assert_eq!(err.kind(), ErrorKind::Format);
    assert_eq!(err.offset(), Some(1));
}

#[test]
fn content_manifest_prefers_full_row_columns() {
    let table = TableBuilder::new()
        .column(ColumnSchema::text())
        .column(ColumnSchema::text())
        .column(ColumnSchema::text())
        .column(ColumnSchema::vlq())
        .column(ColumnSchema::vlq())
        .column(ColumnSchema::fixed(8))
        .column(ColumnSchema::fixed(8))
        .row(vec![
            Value::text("master.mdb.lz4"),
            Value::text("dep"),
            Value::text("master"),
            Value::Uint(9),
            Value::Uint(777),
            Value::Uint(0xC0FFEE),
            Value::Uint(3),
        ])
        .encode()
        .expect("encode");
    let entries = parse_content_manifest(&table).expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "master.mdb.lz4");
    assert_eq!(entries[0].size, 777);
    assert_eq!(entries[0].checksum, 0xC0FFEE);
}

#[test]
fn hname_vectors_are_stable() {
    let cases: [(u64, u64, &[u8], &str); 4] = [
        (0xDEAD_BEEF, 1000, b"Windows", "EAOQ3DBNJATH6OEEKH66B7KJZC2YGZ7E"),
        (0xDEAD_BEEF, 1001, b"Windows", "ZKALAXSKMEHZZ4K77UGH7NAAYYXISAYW"),
        (0, 0, b"", "4EU7E7CRAO6FZRCLZXYKCXQWBVCFAZX7"),
        (
            0x0102_0304_0506_0708,
            4096,
            b"master",
            "AYZWIEGSQQJFIZ6TLAX3D2ICG3QETNOZ",
        ),
    ];
    for (checksum, size, name, expected) in cases {
        let value = hname(checksum, size, name);
        assert_eq!(value, expected);
        assert_eq!(value.len(), 32);
    }
}
