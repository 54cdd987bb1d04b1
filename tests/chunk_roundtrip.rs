//! # Chunk Round-Trip Test Suite
//!
//! End-to-end coverage of the chunk engine driven the way the surrounding
//! system drives it: a column is serialized into the timestamped stream
//! framing, decoded back through `StreamReader`, and materialized into a
//! chunk whose views must reproduce the source rows exactly.

use chunkstore::{
    ChunkBuilder, ChunkFile, ColumnBatch, ColumnData, DataType, FieldDef, Metric, SparseVector,
    StreamReader, StreamWriter,
};

fn stream_source(batch: &ColumnBatch) -> StreamReader {
    let bytes = StreamWriter::with_timestamps(1, 2).encode(batch);
    StreamReader::new(&bytes).unwrap()
}

#[test]
fn int64_field_round_trip() {
    let data = vec![1i64, 2, 3, 4, 5];
    let batch = ColumnBatch::new(ColumnData::Int64(data.clone())).unwrap();
    let field = FieldDef::new("a", 1, DataType::Int64, false).unwrap();

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();

    let span = chunk.as_fixed_width().unwrap().span();
    assert_eq!(span.row_count(), data.len());
    for (i, expected) in data.iter().enumerate() {
        let bytes: [u8; 8] = span.row(i).unwrap().try_into().unwrap();
        assert_eq!(i64::from_le_bytes(bytes), *expected);
    }
}

#[test]
fn variable_field_round_trip() {
    let data = vec!["test1", "test2", "test3", "test4", "test5"];
    let batch = ColumnBatch::new(ColumnData::String(
        data.iter().map(|s| s.to_string()).collect(),
    ))
    .unwrap();
    let field = FieldDef::new("a", 1, DataType::String, false).unwrap();

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();

    let (views, _) = chunk.as_string().unwrap().string_views(None).unwrap();
    assert_eq!(views, data);
}

#[test]
fn json_field_ranges_and_bounds() {
    let row_num = 100usize;
    let json_str = "{\"key\": \"value\"}";
    let data: Vec<String> = (0..row_num).map(|_| json_str.to_string()).collect();
    let batch = ColumnBatch::new(ColumnData::Json(data)).unwrap();

    // nullable = false
    {
        let field = FieldDef::new("a", 1, DataType::Json, false).unwrap();
        let mut source = stream_source(&batch);
        let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();
        let json_chunk = chunk.as_json().unwrap();

        let (views, _) = json_chunk.string_views(None).unwrap();
        assert_eq!(views.len(), row_num);
        assert!(views.iter().all(|v| *v == json_str));

        let (views, _) = json_chunk.string_views(Some((10, 20))).unwrap();
        assert_eq!(views.len(), 20);
        assert!(views.iter().all(|v| *v == json_str));
    }

    // nullable = true, no input validity: every row padded valid
    {
        let field = FieldDef::new("a", 1, DataType::Json, true).unwrap();
        let mut source = stream_source(&batch);
        let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();
        let json_chunk = chunk.as_json().unwrap();

        let (views, valid) = json_chunk.string_views(None).unwrap();
        assert_eq!(views.len(), row_num);
        assert!(valid.iter().all(|&v| v));

        let (views, valid) = json_chunk.string_views(Some((10, 20))).unwrap();
        assert_eq!(views.len(), 20);
        assert!(valid.iter().all(|&v| v));

        for range in [(-1i64, 5i64), (0, row_num as i64 + 1), (95, 11)] {
            let result = json_chunk.string_views(Some(range));
            assert!(result.is_err(), "range {:?} should fail", range);
            assert!(result.unwrap_err().to_string().contains("out of range"));
        }
    }
}

#[test]
fn null_field_round_trip() {
    let data = vec![1i64, 2, 3, 4, 5];
    let batch =
        ColumnBatch::with_packed_validity(ColumnData::Int64(data), &[0x13]).unwrap();
    let field = FieldDef::new("a", 1, DataType::Int64, true).unwrap();

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();

    let span = chunk.as_fixed_width().unwrap().span();
    assert_eq!(span.row_count(), 5);

    let expected_data = [1i64, 2, 0, 0, 5];
    let expected_valid = [true, true, false, false, true];
    assert_eq!(span.typed::<i64>().unwrap(), &expected_data);
    for (i, &valid) in expected_valid.iter().enumerate() {
        assert_eq!(span.is_valid(i), valid);
    }
    assert_eq!(span.valid_data().unwrap(), &expected_valid);
}

fn string_array_row(values: &[&str]) -> Vec<u8> {
    let mut builder = chunkstore::ArrayBuilder::new(DataType::String);
    for v in values {
        builder.push_str(v);
    }
    builder.build()
}

#[test]
fn array_field_round_trip() {
    let elems = ["test_array1", "test_array2", "test_array3", "test_array4", "test_array5"];
    let batch =
        ColumnBatch::new(ColumnData::Array(vec![string_array_row(&elems)])).unwrap();
    let field = FieldDef::new_array("a", 1, DataType::String, false).unwrap();

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();

    let (views, _) = chunk.as_array().unwrap().views(None).unwrap();
    assert_eq!(views.len(), 1);
    let arr = &views[0];
    for (i, expected) in elems.iter().enumerate() {
        assert_eq!(arr.get_str(i).unwrap(), *expected);
    }
}

#[test]
fn array_views_with_ranges_and_bounds() {
    let elems = ["a", "b", "c", "d", "e"];
    let array_count = 10usize;
    let rows: Vec<Vec<u8>> = (0..array_count).map(|_| string_array_row(&elems)).collect();
    let batch = ColumnBatch::new(ColumnData::Array(rows)).unwrap();
    let field = FieldDef::new_array("field1", 1, DataType::String, true).unwrap();

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();
    let array_chunk = chunk.as_array().unwrap();

    let (views, _) = array_chunk.views(None).unwrap();
    assert_eq!(views.len(), array_count);
    for arr in &views {
        for (j, expected) in elems.iter().enumerate() {
            assert_eq!(arr.get_str(j).unwrap(), *expected);
        }
    }

    let (views, _) = array_chunk.views(Some((2, 5))).unwrap();
    assert_eq!(views.len(), 5);
    for arr in &views {
        for (j, expected) in elems.iter().enumerate() {
            assert_eq!(arr.get_str(j).unwrap(), *expected);
        }
    }

    assert!(array_chunk.views(Some((-1, 5))).is_err());
    assert!(array_chunk.views(Some((0, array_count as i64 + 1))).is_err());
    assert!(array_chunk.views(Some((5, 7))).is_err());
}

#[test]
fn sparse_float_field_round_trip() {
    let n_rows = 100usize;
    let dim = 1000u32;
    let rows: Vec<SparseVector> = (0..n_rows)
        .map(|i| {
            let base = (i % 7) as u32;
            SparseVector::from_pairs(&[
                (base, i as f32),
                (base + 13, 0.25 * i as f32),
                (base + 700, -1.0),
            ])
            .unwrap()
        })
        .collect();
    let batch = ColumnBatch::new(ColumnData::SparseFloatVector(rows.clone())).unwrap();
    let field = FieldDef::new_sparse_float_vector("a", 1, dim, Metric::Ip, false);

    let mut source = stream_source(&batch);
    let chunk = ChunkBuilder::new(&field)
        .with_dim(dim)
        .build(&mut source)
        .unwrap();

    let views = chunk.as_sparse_float_vector().unwrap().rows();
    assert_eq!(views.len(), n_rows);
    for (view, expected) in views.iter().zip(&rows) {
        assert_eq!(view.len(), expected.len());
        for (j, want) in expected.iter().enumerate() {
            let got = view.get(j).unwrap();
            assert_eq!(got.index, want.index);
            assert_eq!(got.value, want.value);
        }
    }
}

#[test]
fn multiple_chunks_in_one_mapped_file() {
    let dir = tempfile::tempdir().unwrap();
    let chunk_file = ChunkFile::create(dir.path().join("multi_chunk_mmap")).unwrap();
    let page_size = chunkstore::storage::page_size();

    let field = FieldDef::new("a", 1, DataType::Int64, false).unwrap();
    let data = vec![1i64, 2, 3, 4, 5];
    let batch = ColumnBatch::new(ColumnData::Int64(data.clone())).unwrap();

    let chunk = chunk_file
        .append(&field, &mut stream_source(&batch))
        .unwrap();
    assert!(chunk.is_mapped());
    assert_eq!(chunk.size() % page_size, 0);

    let data2 = vec![60i64, 70, 80];
    let batch2 = ColumnBatch::new(ColumnData::Int64(data2.clone())).unwrap();
    let chunk2 = chunk_file
        .append(&field, &mut stream_source(&batch2))
        .unwrap();
    assert_eq!(chunk2.size() % page_size, 0);
    assert_eq!(chunk_file.len(), (chunk.size() + chunk2.size()) as u64);

    // Both chunks read back their own rows, uncorrupted by the neighbor.
    chunk.prefetch();
    let span = chunk.as_fixed_width().unwrap().span();
    assert_eq!(span.typed::<i64>().unwrap(), data.as_slice());
    let span2 = chunk2.as_fixed_width().unwrap().span();
    assert_eq!(span2.typed::<i64>().unwrap(), data2.as_slice());

    // Unmapping the first chunk leaves the second intact.
    drop(chunk);
    let span2 = chunk2.as_fixed_width().unwrap().span();
    assert_eq!(span2.typed::<i64>().unwrap(), data2.as_slice());
}

#[test]
fn mapped_variable_chunk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let chunk_file = ChunkFile::create(dir.path().join("var_chunks")).unwrap();

    let field = FieldDef::new("s", 1, DataType::String, true).unwrap();
    let values: Vec<String> = (0..500).map(|i| format!("payload-{:04}", i)).collect();
    let validity: Vec<bool> = (0..500).map(|i| i % 5 != 0).collect();
    let batch =
        ColumnBatch::with_validity(ColumnData::String(values.clone()), validity.clone()).unwrap();

    let chunk = chunk_file
        .append(&field, &mut stream_source(&batch))
        .unwrap();

    let (views, valid) = chunk.as_string().unwrap().string_views(None).unwrap();
    assert_eq!(valid, validity);
    for (i, view) in views.iter().enumerate() {
        if validity[i] {
            assert_eq!(*view, values[i]);
        } else {
            assert_eq!(*view, "");
        }
    }
}

#[test]
fn construction_failure_leaves_no_chunk() {
    let field = FieldDef::new("a", 1, DataType::Int64, false).unwrap();
    let batch = ColumnBatch::new(ColumnData::Double(vec![1.0])).unwrap();

    let mut source = stream_source(&batch);
    let result = ChunkBuilder::new(&field).build(&mut source);
    assert!(result.is_err());

    // A retry requires a fresh batch source.
    let good = ColumnBatch::new(ColumnData::Int64(vec![9])).unwrap();
    let mut source = stream_source(&good);
    let chunk = ChunkBuilder::new(&field).build(&mut source).unwrap();
    assert_eq!(chunk.row_count(), 1);
}
