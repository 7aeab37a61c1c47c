//! Streaming decoder for Arrow IPC bytes.
//!
//! `IpcStreamReader` owns the batch-stream bytes accumulated by the client
//! and walks them message by message: a continuation marker (`0xFFFFFFFF`),
//! a little-endian FlatBuffer size, the FlatBuffer metadata (8-byte aligned),
//! then the raw body. The first message must be the schema; every following
//! message yields one `RecordBatch` until the end-of-stream marker
//! (size zero).

use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::{ArrowError, Field, Schema, SchemaRef};
use tracing::trace;

use crate::error::IpcError;
use crate::ipc::batch::decode_record_batch;
use crate::types::LogicalType;

const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// One step of the message walk.
enum Step<'a> {
    /// End-of-stream marker (or a cleanly exhausted buffer)
    Eos,
    /// A framed message: FlatBuffer metadata, body slice, next cursor
    Message {
        message: arrow_ipc::Message<'a>,
        body: &'a [u8],
        next_offset: usize,
    },
}

/// Read the framed message starting at `offset`.
fn read_message_at(buf: &[u8], offset: usize) -> Result<Step<'_>, IpcError> {
    if offset == buf.len() {
        // A well-formed stream ends with an EOS marker, but a buffer that is
        // exhausted exactly at a message boundary is also treated as ended.
        return Ok(Step::Eos);
    }
    if offset + 8 > buf.len() {
        return Err(IpcError::TruncatedStream { offset });
    }

    let continuation = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
    if continuation != CONTINUATION_MARKER {
        return Err(IpcError::InvalidContinuation { offset });
    }

    let metadata_len = u32::from_le_bytes(buf[offset + 4..offset + 8].try_into().unwrap()) as usize;
    if metadata_len == 0 {
        return Ok(Step::Eos);
    }

    let meta_start = offset + 8;
    let meta_end = meta_start
        .checked_add(metadata_len)
        .filter(|end| *end <= buf.len())
        .ok_or(IpcError::TruncatedStream { offset })?;

    let message = arrow_ipc::root_as_message(&buf[meta_start..meta_end])
        .map_err(|e| IpcError::Flatbuffer(e.to_string()))?;

    let body_len = usize::try_from(message.bodyLength())
        .map_err(|_| IpcError::Flatbuffer(format!("negative body length {}", message.bodyLength())))?;

    // The cursor advances to the next 8-byte boundary after the metadata
    // block; the body follows immediately.
    let body_start = meta_end.div_ceil(8) * 8;
    let body_end = body_start
        .checked_add(body_len)
        .filter(|end| *end <= buf.len())
        .ok_or(IpcError::TruncatedStream { offset: meta_end })?;

    Ok(Step::Message {
        message,
        body: &buf[body_start..body_end],
        next_offset: body_end,
    })
}

/// Streaming reader over the batch IPC bytes of one query.
///
/// The schema is decoded exactly once, at construction; batches reference it
/// by field index. The reader owns the byte buffer and every batch it has
/// not yet handed out; produced batches own copies of their buffers.
pub struct IpcStreamReader {
    buf: Vec<u8>,
    offset: usize,
    schema: SchemaRef,
    columns: Vec<LogicalType>,
    finished: bool,
}

impl std::fmt::Debug for IpcStreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStreamReader")
            .field("len", &self.buf.len())
            .field("offset", &self.offset)
            .field("schema", &self.schema)
            .field("finished", &self.finished)
            .finish()
    }
}

impl IpcStreamReader {
    /// Construct a reader over a complete batch IPC stream.
    ///
    /// Parses the leading schema message eagerly so that an unsupported or
    /// malformed schema fails the query instead of the first fetch.
    pub fn new(bytes: Vec<u8>) -> Result<Self, IpcError> {
        if bytes.is_empty() {
            return Err(IpcError::EmptyStream);
        }

        let (schema, columns, offset) = match read_message_at(&bytes, 0)? {
            Step::Eos => return Err(IpcError::MissingSchema),
            Step::Message {
                message,
                next_offset,
                ..
            } => {
                if message.header_type() != arrow_ipc::MessageHeader::Schema {
                    return Err(IpcError::MissingSchema);
                }
                let ipc_schema = message
                    .header_as_schema()
                    .ok_or_else(|| IpcError::Flatbuffer("schema header unreadable".to_string()))?;
                let ipc_fields = ipc_schema
                    .fields()
                    .ok_or_else(|| IpcError::Flatbuffer("schema without field list".to_string()))?;

                let mut fields = Vec::with_capacity(ipc_fields.len());
                let mut columns = Vec::with_capacity(ipc_fields.len());
                for ipc_field in ipc_fields {
                    let logical = LogicalType::from_ipc_field(&ipc_field)?;
                    fields.push(Field::new(
                        ipc_field.name().unwrap_or_default(),
                        logical.to_arrow(),
                        ipc_field.nullable(),
                    ));
                    columns.push(logical);
                }
                trace!(fields = fields.len(), "decoded IPC schema");
                (Arc::new(Schema::new(fields)), columns, next_offset)
            }
        };

        Ok(Self {
            buf: bytes,
            offset,
            schema,
            columns,
            finished: false,
        })
    }

    /// The decoded result schema. Stable across calls.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Whether the end-of-stream marker has been consumed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next record batch, or `None` at end of stream.
    ///
    /// Batches come back in wire order. After the first `None` (or any
    /// error) every subsequent call reports end of stream.
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>, IpcError> {
        if self.finished {
            return Ok(None);
        }

        let result = self.advance();
        if result.is_err() {
            self.finished = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<RecordBatch>, IpcError> {
        match read_message_at(&self.buf, self.offset)? {
            Step::Eos => {
                trace!(offset = self.offset, "IPC end of stream");
                self.finished = true;
                Ok(None)
            }
            Step::Message {
                message,
                body,
                next_offset,
            } => match message.header_type() {
                arrow_ipc::MessageHeader::RecordBatch => {
                    let ipc_batch = message.header_as_record_batch().ok_or_else(|| {
                        IpcError::Flatbuffer("record batch header unreadable".to_string())
                    })?;
                    let batch = decode_record_batch(ipc_batch, body, &self.schema, &self.columns)?;
                    trace!(rows = batch.num_rows(), "decoded record batch");
                    self.offset = next_offset;
                    Ok(Some(batch))
                }
                arrow_ipc::MessageHeader::Schema => Err(IpcError::DuplicateSchema),
                arrow_ipc::MessageHeader::DictionaryBatch => Err(IpcError::UnsupportedType(
                    "dictionary batch message".to_string(),
                )),
                other => Err(IpcError::Flatbuffer(format!(
                    "unexpected message header {other:?}"
                ))),
            },
        }
    }
}

impl Iterator for IpcStreamReader {
    type Item = Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => Some(Err(ArrowError::IpcError(e.to_string()))),
        }
    }
}

impl RecordBatchReader for IpcStreamReader {
    fn schema(&self) -> SchemaRef {
        IpcStreamReader::schema(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{
        Array, BinaryArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
        Time64MicrosecondArray, TimestampMicrosecondArray, UInt32Array,
    };
    use arrow_ipc::writer::StreamWriter;
    use arrow_schema::{DataType, TimeUnit};

    fn stream_bytes(schema: &SchemaRef, batches: &[RecordBatch]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = StreamWriter::try_new(&mut out, schema).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.finish().unwrap();
        drop(writer);
        out
    }

    fn int64_batch(values: &[i64]) -> (SchemaRef, RecordBatch) {
        let schema = Arc::new(Schema::new(vec![Field::new("test", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(Int64Array::from(values.to_vec()))],
        )
        .unwrap();
        (schema, batch)
    }

    /// Byte length of the leading schema message (prefix + padded metadata).
    fn schema_message_len(bytes: &[u8]) -> usize {
        assert_eq!(&bytes[..4], &[0xFF; 4]);
        let size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        (8 + size).div_ceil(8) * 8
    }

    #[test]
    fn test_single_int64_batch() {
        let (schema, batch) = int64_batch(&[1]);
        let bytes = stream_bytes(&schema, &[batch.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.schema(), schema);

        let decoded = reader.next_batch().unwrap().unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.num_rows(), 1);
        assert_eq!(decoded.column(0).null_count(), 0);

        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.is_finished());
        // End of stream is sticky.
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_negative_int64_value() {
        let (schema, batch) = int64_batch(&[-99]);
        let bytes = stream_bytes(&schema, &[batch]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        let decoded = reader.next_batch().unwrap().unwrap();
        let column = decoded
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(column.value(0), -99);
    }

    #[test]
    fn test_multiple_batches_in_wire_order() {
        let (schema, first) = int64_batch(&[1, 2, 3]);
        let (_, second) = int64_batch(&[4, 5]);
        let bytes = stream_bytes(&schema, &[first.clone(), second.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap(), first);
        assert_eq!(reader.next_batch().unwrap().unwrap(), second);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_utf8_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("s", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(StringArray::from(vec!["hello"]))],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        let decoded = reader.next_batch().unwrap().unwrap();
        let column = decoded
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(column.value(0), "hello");
        assert_eq!(column.value_offsets(), &[0, 5]);
    }

    #[test]
    fn test_strings_with_embedded_nul() {
        let schema = Arc::new(Schema::new(vec![Field::new("s", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(StringArray::from(vec!["a\0b", ""]))],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        let decoded = reader.next_batch().unwrap().unwrap();
        let column = decoded
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(column.value(0), "a\0b");
        assert_eq!(column.value(1), "");
    }

    #[test]
    fn test_heterogeneous_row() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
            Field::new("c", DataType::Float64, true),
            Field::new("d", DataType::Boolean, true),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["x"])),
                Arc::new(Float64Array::from(vec![3.25])),
                Arc::new(BooleanArray::from(vec![true])),
            ],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap(), batch);
    }

    #[test]
    fn test_nulls_propagate_per_field() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("i", DataType::Int64, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None, Some(3)])),
                Arc::new(StringArray::from(vec![None, Some("x"), None])),
            ],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        let decoded = reader.next_batch().unwrap().unwrap();
        assert_eq!(decoded.column(0).null_count(), 1);
        assert_eq!(decoded.column(1).null_count(), 2);
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_temporal_types_keep_parameters() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("d", DataType::Date32, true),
            Field::new("t", DataType::Time64(TimeUnit::Microsecond), true),
            Field::new(
                "ts",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                true,
            ),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Date32Array::from(vec![20090])),
                Arc::new(Time64MicrosecondArray::from(vec![11_045_000_000i64])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![1_735_786_645_000_000i64])
                        .with_timezone("UTC"),
                ),
            ],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.schema(), schema);
        let decoded = reader.next_batch().unwrap().unwrap();
        assert_eq!(decoded, batch);

        let ts = decoded
            .column(2)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(ts.value(0), 1_735_786_645_000_000);
    }

    #[test]
    fn test_unsigned_and_binary_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("u", DataType::UInt32, true),
            Field::new("b", DataType::Binary, true),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(UInt32Array::from(vec![7, 8])),
                Arc::new(BinaryArray::from_vec(vec![&[0x00, 0xFF][..], &[][..]])),
            ],
        )
        .unwrap();
        let bytes = stream_bytes(&schema, &[batch.clone()]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap(), batch);
    }

    #[test]
    fn test_schema_only_stream_yields_no_batches() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "h",
            DataType::Float16,
            true,
        )]));
        let bytes = stream_bytes(&schema, &[]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.schema(), schema);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let err = IpcStreamReader::new(Vec::new()).unwrap_err();
        assert!(matches!(err, IpcError::EmptyStream));
    }

    #[test]
    fn test_stream_without_schema_rejected() {
        let (schema, batch) = int64_batch(&[1]);
        let bytes = stream_bytes(&schema, &[batch]);
        let body = bytes[schema_message_len(&bytes)..].to_vec();

        let err = IpcStreamReader::new(body).unwrap_err();
        assert!(matches!(err, IpcError::MissingSchema));
    }

    #[test]
    fn test_corrupt_continuation_marker() {
        let (schema, batch) = int64_batch(&[1]);
        let mut bytes = stream_bytes(&schema, &[batch]);
        bytes[0] = 0x00;

        let err = IpcStreamReader::new(bytes).unwrap_err();
        assert!(matches!(err, IpcError::InvalidContinuation { offset: 0 }));
    }

    #[test]
    fn test_duplicate_schema_rejected() {
        let (schema, batch) = int64_batch(&[1]);
        let bytes = stream_bytes(&schema, &[batch]);
        let schema_len = schema_message_len(&bytes);

        // [schema][schema][batch][EOS]
        let mut doubled = bytes[..schema_len].to_vec();
        doubled.extend_from_slice(&bytes);

        let mut reader = IpcStreamReader::new(doubled).unwrap();
        let err = reader.next_batch().unwrap_err();
        assert!(matches!(err, IpcError::DuplicateSchema));
        // Errors are sticky: the stream reports EOS afterwards.
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_two_concatenated_streams_lose_the_batch() {
        // The server's schema-only stream followed by the batch stream: a
        // reader treating the concatenation as one stream stops at the first
        // EOS and never sees the batch. The client must forward only the
        // batch stream.
        let (schema, batch) = int64_batch(&[1]);
        let schema_only = stream_bytes(&schema, &[]);
        let batch_stream = stream_bytes(&schema, &[batch]);

        let mut concatenated = schema_only;
        concatenated.extend_from_slice(&batch_stream);

        let mut reader = IpcStreamReader::new(concatenated).unwrap();
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.is_finished());
    }

    #[test]
    fn test_trailing_bytes_after_eos_ignored() {
        let (schema, batch) = int64_batch(&[1, 2]);
        let mut bytes = stream_bytes(&schema, &[batch.clone()]);
        bytes.extend_from_slice(&[0xAB; 16]);

        let mut reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(reader.next_batch().unwrap().unwrap(), batch);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let (schema, batch) = int64_batch(&[1]);
        let bytes = stream_bytes(&schema, &[batch]);
        let truncated = bytes[..bytes.len() - 5].to_vec();

        let mut reader = IpcStreamReader::new(truncated).unwrap();
        // The batch still decodes; the mangled EOS marker does not.
        assert!(reader.next_batch().unwrap().is_some());
        let err = reader.next_batch().unwrap_err();
        assert!(matches!(err, IpcError::TruncatedStream { .. }));
    }

    #[test]
    fn test_unsupported_schema_type_rejected() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "d",
            DataType::Decimal128(10, 2),
            true,
        )]));
        let bytes = stream_bytes(&schema, &[]);

        let err = IpcStreamReader::new(bytes).unwrap_err();
        assert!(matches!(err, IpcError::UnsupportedType(_)));
    }

    #[test]
    fn test_date64_rejected() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "d",
            DataType::Date64,
            true,
        )]));
        let bytes = stream_bytes(&schema, &[]);

        let err = IpcStreamReader::new(bytes).unwrap_err();
        assert!(matches!(err, IpcError::UnsupportedType(_)));
    }

    #[test]
    fn test_record_batch_reader_iteration() {
        let (schema, first) = int64_batch(&[1]);
        let (_, second) = int64_batch(&[2]);
        let bytes = stream_bytes(&schema, &[first, second]);

        let reader = IpcStreamReader::new(bytes).unwrap();
        assert_eq!(RecordBatchReader::schema(&reader), schema);
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_rows() + batches[1].num_rows(), 2);
    }
}
