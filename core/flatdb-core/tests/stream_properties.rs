// Property tests for the byte stream adapters

use flatdb_core::stream::{BomSkipReader, RaggedRowReader, count_unquoted};
use proptest::prelude::*;
use std::io::{Cursor, Read, Seek, SeekFrom};

fn field() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9 ]{0,6}",
        "[a-z]{1,3},[a-z]{1,3}".prop_map(|s| format!("\"{s}\"")),
    ]
}

fn line(max_fields: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(field(), 1..=max_fields)
}

fn normalize(text: &str) -> String {
    let mut out = String::new();
    RaggedRowReader::new(Cursor::new(text.as_bytes().to_vec()), b',')
        .read_to_string(&mut out)
        .unwrap();
    out
}

proptest! {
    #[test]
    fn test_data_lines_reach_header_width(
        header in line(6),
        rows in prop::collection::vec(line(9), 0..12),
    ) {
        let expected = header.len() - 1;
        let mut text = header.join(",");
        text.push('\n');
        for row in &rows {
            text.push_str(&row.join(","));
            text.push('\n');
        }

        let out = normalize(&text);
        let lines: Vec<&str> = out.lines().collect();
        prop_assert_eq!(lines.len(), rows.len() + 1);
        prop_assert_eq!(lines[0], header.join(","));
        for (row, line) in rows.iter().zip(&lines[1..]) {
            let original = row.join(",");
            let found = count_unquoted(line.as_bytes(), b',', b'"');
            prop_assert!(line.starts_with(&original));
            if row.len() - 1 <= expected {
                prop_assert_eq!(found, expected);
            } else {
                prop_assert_eq!(found, row.len() - 1);
                prop_assert_eq!(*line, original.as_str());
            }
        }
    }

    #[test]
    fn test_rewind_replays_identical_bytes(
        header in line(4),
        rows in prop::collection::vec(line(6), 0..6),
    ) {
        let mut text = header.join(",");
        for row in &rows {
            text.push('\n');
            text.push_str(&row.join(","));
        }
        let mut reader = RaggedRowReader::new(Cursor::new(text.into_bytes()), b',');
        let mut first = Vec::new();
        reader.read_to_end(&mut first).unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut second = Vec::new();
        reader.read_to_end(&mut second).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_bom_is_stripped_and_rest_kept(body in "[ -~]{0,40}", bom in any::<bool>()) {
        let mut bytes = Vec::new();
        if bom {
            bytes.extend_from_slice("\u{FEFF}".as_bytes());
        }
        bytes.extend_from_slice(body.as_bytes());

        let mut reader = BomSkipReader::new(Cursor::new(bytes));
        prop_assert_eq!(reader.has_bom().unwrap(), bom);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        prop_assert_eq!(out, body);
    }
}

#[test]
fn test_short_row_is_padded() {
    assert_eq!(normalize("A,B,C\n1,2\n3,4,5\n"), "A,B,C\n1,2,\n3,4,5\n");
}
