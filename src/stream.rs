//! Arrow C Data Interface export.
//!
//! Query results cross the ADBC boundary as an `ArrowArrayStream`: three
//! callbacks (`get_schema`, `get_next`, `release`) plus a `private_data`
//! pointer owning the reader. `arrow::ffi_stream` installs the callbacks;
//! the exported stream deep-copies the schema on every `get_schema` call and
//! signals end-of-stream by handing out a released (`release == null`)
//! array.

use arrow::ffi_stream::FFI_ArrowArrayStream;

use crate::ipc::IpcStreamReader;

/// Export a reader as a C stream. Ownership of the reader (and the IPC bytes
/// it holds) transfers into the stream's `private_data`; the consumer frees
/// everything through the stream's `release` callback.
pub fn export_reader(reader: IpcStreamReader) -> FFI_ArrowArrayStream {
    FFI_ArrowArrayStream::new(Box::new(reader))
}

/// A zero-initialized stream with a null `release` pointer.
///
/// Handed out when a query failed before producing a result: consumers that
/// only look at the stream see "no more data", while the error travels
/// through the ADBC status.
pub fn empty_stream() -> FFI_ArrowArrayStream {
    FFI_ArrowArrayStream::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::ffi_stream::ArrowArrayStreamReader;
    use arrow_array::{Int64Array, RecordBatch, RecordBatchReader};
    use arrow_ipc::writer::StreamWriter;
    use arrow_schema::{DataType, Field, Schema, SchemaRef};

    fn sample_stream() -> (SchemaRef, RecordBatch, Vec<u8>) {
        let schema = Arc::new(Schema::new(vec![Field::new("test", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        let mut bytes = Vec::new();
        let mut writer = StreamWriter::try_new(&mut bytes, &schema).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
        drop(writer);

        (schema, batch, bytes)
    }

    #[test]
    fn test_export_import_roundtrip() {
        let (schema, batch, bytes) = sample_stream();
        let reader = IpcStreamReader::new(bytes).unwrap();

        let exported = export_reader(reader);
        let mut imported = ArrowArrayStreamReader::try_new(exported).unwrap();

        assert_eq!(imported.schema(), schema);
        let first = imported.next().unwrap().unwrap();
        assert_eq!(first, batch);
        assert!(imported.next().is_none());
    }

    #[test]
    fn test_schema_stable_across_calls() {
        let (schema, _, bytes) = sample_stream();
        let reader = IpcStreamReader::new(bytes).unwrap();
        let imported = ArrowArrayStreamReader::try_new(export_reader(reader)).unwrap();

        // Each get_schema call produces an independent copy; they must be
        // structurally identical.
        let first = imported.schema();
        let second = imported.schema();
        assert_eq!(first, second);
        assert_eq!(first, schema);
    }

    #[test]
    fn test_empty_stream_has_null_release() {
        let stream = empty_stream();
        assert!(stream.release.is_none());
    }
}
