//! Record batch body decoding.
//!
//! A `RecordBatch` message carries FlatBuffer metadata (row count, one
//! `FieldNode` per field, a flat list of `Buffer` descriptors) and a body of
//! concatenated, 8-byte-aligned buffers. Each field consumes a validity
//! buffer plus its type's data buffers, in depth-first order. Buffers are
//! copied out of the body; the produced arrays own their memory.

use std::sync::Arc;

use arrow_array::{make_array, RecordBatch, RecordBatchOptions};
use arrow_buffer::Buffer;
use arrow_data::ArrayData;
use arrow_schema::SchemaRef;

use crate::error::IpcError;
use crate::types::LogicalType;

/// Decode one record batch from its FlatBuffer metadata and raw body.
pub(crate) fn decode_record_batch(
    batch: arrow_ipc::RecordBatch<'_>,
    body: &[u8],
    schema: &SchemaRef,
    columns: &[LogicalType],
) -> Result<RecordBatch, IpcError> {
    if batch.compression().is_some() {
        return Err(IpcError::CompressedBody);
    }

    let rows = usize::try_from(batch.length())
        .map_err(|_| IpcError::MalformedBatch(format!("negative length {}", batch.length())))?;

    let nodes = batch
        .nodes()
        .ok_or_else(|| IpcError::MalformedBatch("missing field nodes".to_string()))?;
    let buffers = batch
        .buffers()
        .ok_or_else(|| IpcError::MalformedBatch("missing buffer descriptors".to_string()))?;

    if nodes.len() != columns.len() {
        return Err(IpcError::MalformedBatch(format!(
            "expected {} field nodes, got {}",
            columns.len(),
            nodes.len()
        )));
    }

    let expected_buffers: usize = columns.iter().map(|c| 1 + c.data_buffer_count()).sum();
    if buffers.len() != expected_buffers {
        return Err(IpcError::MalformedBatch(format!(
            "expected {} buffers, got {}",
            expected_buffers,
            buffers.len()
        )));
    }

    let mut arrays = Vec::with_capacity(columns.len());
    let mut buffer_index = 0;

    for (field_index, logical) in columns.iter().enumerate() {
        let node = nodes.get(field_index);
        if node.length() != batch.length() {
            return Err(IpcError::MalformedBatch(format!(
                "field node {} length {} differs from batch length {}",
                field_index,
                node.length(),
                batch.length()
            )));
        }
        let null_count = usize::try_from(node.null_count()).map_err(|_| {
            IpcError::MalformedBatch(format!(
                "negative null count {} in field node {field_index}",
                node.null_count()
            ))
        })?;

        let field_name = schema.field(field_index).name().clone();

        let validity_desc = buffers.get(buffer_index);
        let validity = checked_slice(body, validity_desc.offset(), validity_desc.length(), buffer_index)?;
        buffer_index += 1;

        // null_count == 0 permits an absent or empty validity buffer.
        let validity = if null_count == 0 {
            None
        } else {
            if validity.len() < rows.div_ceil(8) {
                return Err(IpcError::MalformedBatch(format!(
                    "validity bitmap for '{field_name}' too short: {} bytes for {rows} rows",
                    validity.len()
                )));
            }
            Some(Buffer::from(validity))
        };

        let array = match logical {
            LogicalType::Utf8 | LogicalType::Binary => {
                let offsets_desc = buffers.get(buffer_index);
                let offsets =
                    checked_slice(body, offsets_desc.offset(), offsets_desc.length(), buffer_index)?;
                buffer_index += 1;

                let values_desc = buffers.get(buffer_index);
                let values =
                    checked_slice(body, values_desc.offset(), values_desc.length(), buffer_index)?;
                buffer_index += 1;

                validate_offsets(&field_name, offsets, rows, values.len())?;

                build_array(
                    logical,
                    rows,
                    null_count,
                    validity,
                    vec![Buffer::from(offsets), Buffer::from(values)],
                )?
            }
            LogicalType::Bool => {
                let values_desc = buffers.get(buffer_index);
                let values =
                    checked_slice(body, values_desc.offset(), values_desc.length(), buffer_index)?;
                buffer_index += 1;

                if values.len() < rows.div_ceil(8) {
                    return Err(IpcError::MalformedBatch(format!(
                        "value bitmap for '{field_name}' too short: {} bytes for {rows} rows",
                        values.len()
                    )));
                }
                build_array(logical, rows, null_count, validity, vec![Buffer::from(values)])?
            }
            fixed => {
                let width = fixed
                    .fixed_width_bytes()
                    .expect("non-fixed types handled above");

                let values_desc = buffers.get(buffer_index);
                let values =
                    checked_slice(body, values_desc.offset(), values_desc.length(), buffer_index)?;
                buffer_index += 1;

                if values.len() < rows * width {
                    return Err(IpcError::MalformedBatch(format!(
                        "value buffer for '{field_name}' too short: {} bytes for {rows} rows of width {width}",
                        values.len()
                    )));
                }
                build_array(logical, rows, null_count, validity, vec![Buffer::from(values)])?
            }
        };

        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    RecordBatch::try_new_with_options(Arc::clone(schema), arrays, &options)
        .map_err(IpcError::from)
}

fn build_array(
    logical: &LogicalType,
    rows: usize,
    null_count: usize,
    validity: Option<Buffer>,
    data_buffers: Vec<Buffer>,
) -> Result<arrow_array::ArrayRef, IpcError> {
    let mut builder = ArrayData::builder(logical.to_arrow())
        .len(rows)
        .null_count(null_count)
        .null_bit_buffer(validity);
    for buffer in data_buffers {
        builder = builder.add_buffer(buffer);
    }
    let data = builder.build()?;
    Ok(make_array(data))
}

/// Slice `body[offset .. offset + length]` after checking the descriptor.
///
/// The offset must be non-negative, 8-byte aligned, and the slice must fall
/// entirely within the body.
pub(crate) fn checked_slice(
    body: &[u8],
    offset: i64,
    length: i64,
    index: usize,
) -> Result<&[u8], IpcError> {
    let (offset, length) = match (usize::try_from(offset), usize::try_from(length)) {
        (Ok(o), Ok(l)) => (o, l),
        _ => {
            return Err(IpcError::MalformedBatch(format!(
                "negative buffer descriptor at index {index}: offset {offset}, length {length}"
            )));
        }
    };

    if offset % 8 != 0 {
        return Err(IpcError::UnalignedBuffer { index, offset });
    }

    let end = offset.checked_add(length).filter(|end| *end <= body.len());
    match end {
        Some(end) => Ok(&body[offset..end]),
        None => Err(IpcError::BufferOutOfBounds {
            index,
            offset,
            length,
            body_len: body.len(),
        }),
    }
}

/// Validate an i32 offsets buffer for a variable-length column.
///
/// Requires `(rows + 1)` little-endian offsets, monotonically non-decreasing,
/// starting at or above zero, with the final offset equal to the value
/// buffer length.
pub(crate) fn validate_offsets(
    field: &str,
    offsets_bytes: &[u8],
    rows: usize,
    values_len: usize,
) -> Result<(), IpcError> {
    let needed = (rows + 1) * 4;
    if offsets_bytes.len() < needed {
        return Err(IpcError::MalformedBatch(format!(
            "offsets buffer for '{field}' too short: {} bytes for {rows} rows",
            offsets_bytes.len()
        )));
    }

    let mut prev: i32 = 0;
    let mut last: i32 = 0;
    for (i, chunk) in offsets_bytes[..needed].chunks_exact(4).enumerate() {
        let value = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if value < 0 || (i > 0 && value < prev) {
            return Err(IpcError::NonMonotonicOffsets {
                field: field.to_string(),
            });
        }
        prev = value;
        last = value;
    }

    if last as usize != values_len {
        return Err(IpcError::OffsetMismatch {
            field: field.to_string(),
            expected: last as usize,
            actual: values_len,
        });
    }
    Ok(())
}
