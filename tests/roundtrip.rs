use sas7bdat_io::{
    Column, ColumnMeta, ColumnValues, ReadOptions, SasFrame, VariableKind, WriteOptions,
    read_sas7bdat, write_sas7bdat,
};
use tempfile::tempdir;

fn numeric_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column {
        meta: ColumnMeta {
            name: name.to_owned(),
            label: String::new(),
            format: String::new(),
            kind: VariableKind::Numeric,
            width: 8,
            offset: 0,
            display_width: 8,
            decimals: 0,
        },
        values: ColumnValues::Numeric(values),
    }
}

fn character_column(name: &str, width: u32, values: Vec<&str>) -> Column {
    Column {
        meta: ColumnMeta {
            name: name.to_owned(),
            label: String::new(),
            format: String::new(),
            kind: VariableKind::Character,
            width,
            offset: 0,
            display_width: width as u16,
            decimals: 0,
        },
        values: ColumnValues::Character(values.into_iter().map(str::to_owned).collect()),
    }
}

fn small_frame() -> SasFrame {
    let mut frame = SasFrame {
        columns: vec![
            numeric_column("a", vec![Some(1.0), None, Some(2.5)]),
            character_column("s", 4, vec!["x", "", "yy"]),
        ],
        ..SasFrame::default()
    };
    frame.attributes.dataset = "ROUNDTRIP".to_owned();
    frame.deleted = vec![false; 3];
    frame.valid = vec![true; 3];
    frame
}

fn assert_values_eq(read: &SasFrame, written: &SasFrame) {
    assert_eq!(read.column_count(), written.column_count());
    for (got, want) in read.columns.iter().zip(&written.columns) {
        assert_eq!(got.meta.name, want.meta.name);
        assert_eq!(got.values, want.values, "column {}", want.meta.name);
    }
}

#[test]
fn numeric_and_character_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roundtrip.sas7bdat");
    let frame = small_frame();

    write_sas7bdat(&path, &frame, &WriteOptions::new()).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    assert_eq!(read.row_count(), 3);
    assert_values_eq(&read, &frame);
    assert_eq!(read.deleted, vec![false, false, false]);
    assert_eq!(read.valid, vec![true, true, true]);

    let attrs = &read.attributes;
    assert_eq!(attrs.dataset, "ROUNDTRIP");
    assert_eq!(attrs.sasfile, "SAS FILE");
    assert_eq!(attrs.filetype, "DATA");
    assert_eq!(attrs.encoding, "UTF-8");
    assert_eq!(attrs.compression, "");
    assert_eq!(attrs.proc, "DATASTEP");
    assert_eq!(attrs.row_count, 3);
    assert_eq!(attrs.row_length, 12);
    assert_eq!(attrs.deleted_rows, 0);
    assert_eq!(attrs.varnames, vec!["a", "s"]);
    assert_eq!(attrs.vartyps, vec![1, 2]);
    assert_eq!(attrs.colwidth, vec![8, 4]);
    assert_eq!(attrs.header_size, 65536);
    assert_eq!(attrs.page_size, 65536);
    assert_eq!(attrs.page_count, 1);
}

#[test]
fn bit32_profile_round_trips_the_same_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("narrow.sas7bdat");
    let frame = small_frame();

    write_sas7bdat(&path, &frame, &WriteOptions::new().with_bit32(true)).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    assert_values_eq(&read, &frame);
    assert_eq!(read.attributes.header_size, 1024);
    assert_eq!(read.attributes.page_size, 8192);
}

#[test]
fn labels_and_formats_survive_the_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("labeled.sas7bdat");

    let mut frame = SasFrame {
        columns: vec![
            numeric_column("height", vec![Some(1.82), Some(1.65)]),
            character_column("species", 8, vec!["setosa", "virginic"]),
        ],
        ..SasFrame::default()
    };
    frame.columns[0].meta.label = "Body height".to_owned();
    frame.columns[0].meta.format = "BEST".to_owned();
    frame.columns[0].meta.decimals = 2;
    frame.columns[1].meta.label = "Species name".to_owned();
    frame.columns[1].meta.format = "$CHAR".to_owned();

    write_sas7bdat(&path, &frame, &WriteOptions::new()).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    assert_eq!(read.columns[0].meta.label, "Body height");
    assert_eq!(read.columns[0].meta.format, "BEST");
    assert_eq!(read.columns[0].meta.display_width, 8);
    assert_eq!(read.columns[0].meta.decimals, 2);
    assert_eq!(read.columns[1].meta.label, "Species name");
    assert_eq!(read.columns[1].meta.format, "$CHAR");
    assert_eq!(read.attributes.labels, vec!["Body height", "Species name"]);
    assert_eq!(read.attributes.formats, vec!["BEST", "$CHAR"]);
    assert_eq!(read.attributes.fmt32, vec![8.2, 0.0]);
    assert_eq!(read.attributes.fmtkeys, vec![0.0, 8.0]);
}

#[test]
fn rows_spill_onto_additional_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paged.sas7bdat");

    let n = 3000usize;
    let frame = SasFrame {
        columns: vec![numeric_column(
            "seq",
            (0..n).map(|i| Some(i as f64)).collect(),
        )],
        ..SasFrame::default()
    };

    let options = WriteOptions::new().with_page_size(4096).with_header_size(1024);
    write_sas7bdat(&path, &frame, &options).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    assert!(read.attributes.page_count > 1, "expected a multi-page file");
    assert_eq!(read.row_count(), n);
    let ColumnValues::Numeric(values) = &read.columns[0].values else {
        panic!("numeric column expected");
    };
    for (i, value) in values.iter().enumerate() {
        assert_eq!(*value, Some(i as f64), "row {i}");
    }
    // Every extra page is a plain data page.
    assert!(
        read.attributes.page_types[1..].iter().all(|t| *t == 256),
        "page types: {:?}",
        read.attributes.page_types
    );
}

#[test]
fn selection_is_a_pure_projection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("selected.sas7bdat");

    let frame = SasFrame {
        columns: vec![
            numeric_column("a", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            character_column("s", 2, vec!["p", "q", "r", "t"]),
            numeric_column("b", vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0)]),
        ],
        ..SasFrame::default()
    };
    write_sas7bdat(&path, &frame, &WriteOptions::new()).unwrap();

    let full = read_sas7bdat(&path, &ReadOptions::new()).unwrap();
    let narrowed = read_sas7bdat(
        &path,
        &ReadOptions::new()
            .with_row_range(2, 3)
            .with_columns(["s", "b"]),
    )
    .unwrap();

    assert_eq!(narrowed.row_count(), 2);
    assert_eq!(narrowed.column_count(), 2);
    assert_eq!(
        narrowed.columns[0].values,
        ColumnValues::Character(vec!["q".to_owned(), "r".to_owned()])
    );
    assert_eq!(
        narrowed.columns[1].values,
        ColumnValues::Numeric(vec![Some(20.0), Some(30.0)])
    );
    // The full varname list rides along even when columns are narrowed.
    assert_eq!(narrowed.attributes.varnames, full.attributes.varnames);
    assert_eq!(narrowed.deleted, vec![false, false]);
    assert_eq!(narrowed.valid, vec![true, true]);

    // Projection equals slicing the full read.
    let ColumnValues::Numeric(full_b) = &full.columns[2].values else {
        panic!("numeric column expected");
    };
    let ColumnValues::Numeric(narrow_b) = &narrowed.columns[1].values else {
        panic!("numeric column expected");
    };
    assert_eq!(&full_b[1..3], narrow_b.as_slice());
}

#[test]
fn single_column_dataset_omits_the_column_list() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("single.sas7bdat");

    let frame = SasFrame {
        columns: vec![numeric_column("only", vec![Some(42.0)])],
        ..SasFrame::default()
    };
    write_sas7bdat(&path, &frame, &WriteOptions::new()).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    assert_eq!(read.row_count(), 1);
    assert!(read.attributes.column_list.is_empty());
    let ColumnValues::Numeric(values) = &read.columns[0].values else {
        panic!("numeric column expected");
    };
    assert_eq!(values, &vec![Some(42.0)]);
}

#[test]
fn attributes_serialize_to_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("json.sas7bdat");
    write_sas7bdat(&path, &small_frame(), &WriteOptions::new()).unwrap();
    let read = read_sas7bdat(&path, &ReadOptions::new()).unwrap();

    let json = serde_json::to_value(&read.attributes).unwrap();
    assert_eq!(json["dataset"], "ROUNDTRIP");
    assert_eq!(json["varnames"][1], "s");
    assert_eq!(json["encoding"], "UTF-8");
}
