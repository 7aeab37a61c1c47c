//! Type mapping between the Arrow Native wire schema and Arrow data types.
//!
//! The driver supports a closed set of logical types. Anything outside the
//! set (nested types, decimals, dictionary encoding) is rejected as
//! unsupported when the schema message is decoded, never silently coerced.

use std::sync::Arc;

use arrow_schema::{DataType, TimeUnit};

use crate::error::IpcError;

/// Logical column type supported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalType {
    /// Fixed-width integer (8/16/32/64 bits, signed or unsigned)
    Int { bits: u8, signed: bool },
    /// IEEE float (16/32/64 bits)
    Float { bits: u8 },
    /// Bit-packed boolean
    Bool,
    /// Variable-length UTF-8 string with i32 offsets
    Utf8,
    /// Variable-length binary with i32 offsets
    Binary,
    /// Days since the UNIX epoch
    Date32,
    /// 64-bit time of day
    Time64 { unit: TimeUnit },
    /// 64-bit timestamp, optionally zoned
    Timestamp {
        unit: TimeUnit,
        timezone: Option<String>,
    },
}

impl LogicalType {
    /// Decode a FlatBuffer schema field's type into the supported set.
    ///
    /// Temporal unit and timezone parameters are propagated from the
    /// metadata; they are never defaulted.
    pub fn from_ipc_field(field: &arrow_ipc::Field) -> Result<Self, IpcError> {
        if field.dictionary().is_some() {
            return Err(IpcError::UnsupportedType(
                "dictionary-encoded field".to_string(),
            ));
        }

        match field.type_type() {
            arrow_ipc::Type::Int => {
                let int = field.type_as_int().unwrap();
                let bits = match int.bitWidth() {
                    8 => 8,
                    16 => 16,
                    32 => 32,
                    64 => 64,
                    other => {
                        return Err(IpcError::UnsupportedType(format!(
                            "Int with bit width {other}"
                        )));
                    }
                };
                Ok(LogicalType::Int {
                    bits,
                    signed: int.is_signed(),
                })
            }
            arrow_ipc::Type::FloatingPoint => {
                let fp = field.type_as_floating_point().unwrap();
                let bits = match fp.precision() {
                    arrow_ipc::Precision::HALF => 16,
                    arrow_ipc::Precision::SINGLE => 32,
                    arrow_ipc::Precision::DOUBLE => 64,
                    other => {
                        return Err(IpcError::UnsupportedType(format!(
                            "FloatingPoint precision {other:?}"
                        )));
                    }
                };
                Ok(LogicalType::Float { bits })
            }
            arrow_ipc::Type::Bool => Ok(LogicalType::Bool),
            arrow_ipc::Type::Utf8 => Ok(LogicalType::Utf8),
            arrow_ipc::Type::Binary => Ok(LogicalType::Binary),
            arrow_ipc::Type::Date => {
                let date = field.type_as_date().unwrap();
                match date.unit() {
                    arrow_ipc::DateUnit::DAY => Ok(LogicalType::Date32),
                    other => Err(IpcError::UnsupportedType(format!("Date unit {other:?}"))),
                }
            }
            arrow_ipc::Type::Time => {
                let time = field.type_as_time().unwrap();
                if time.bitWidth() != 64 {
                    return Err(IpcError::UnsupportedType(format!(
                        "Time with bit width {}",
                        time.bitWidth()
                    )));
                }
                let unit = match time.unit() {
                    arrow_ipc::TimeUnit::MICROSECOND => TimeUnit::Microsecond,
                    arrow_ipc::TimeUnit::NANOSECOND => TimeUnit::Nanosecond,
                    other => {
                        return Err(IpcError::UnsupportedType(format!(
                            "Time64 unit {other:?}"
                        )));
                    }
                };
                Ok(LogicalType::Time64 { unit })
            }
            arrow_ipc::Type::Timestamp => {
                let ts = field.type_as_timestamp().unwrap();
                let unit = ipc_time_unit(ts.unit())?;
                Ok(LogicalType::Timestamp {
                    unit,
                    timezone: ts.timezone().map(|tz| tz.to_string()),
                })
            }
            other => Err(IpcError::UnsupportedType(format!("{other:?}"))),
        }
    }

    /// Map a supported Arrow `DataType` back into the logical set.
    pub fn from_arrow(data_type: &DataType) -> Result<Self, IpcError> {
        match data_type {
            DataType::Int8 => Ok(LogicalType::Int {
                bits: 8,
                signed: true,
            }),
            DataType::Int16 => Ok(LogicalType::Int {
                bits: 16,
                signed: true,
            }),
            DataType::Int32 => Ok(LogicalType::Int {
                bits: 32,
                signed: true,
            }),
            DataType::Int64 => Ok(LogicalType::Int {
                bits: 64,
                signed: true,
            }),
            DataType::UInt8 => Ok(LogicalType::Int {
                bits: 8,
                signed: false,
            }),
            DataType::UInt16 => Ok(LogicalType::Int {
                bits: 16,
                signed: false,
            }),
            DataType::UInt32 => Ok(LogicalType::Int {
                bits: 32,
                signed: false,
            }),
            DataType::UInt64 => Ok(LogicalType::Int {
                bits: 64,
                signed: false,
            }),
            DataType::Float16 => Ok(LogicalType::Float { bits: 16 }),
            DataType::Float32 => Ok(LogicalType::Float { bits: 32 }),
            DataType::Float64 => Ok(LogicalType::Float { bits: 64 }),
            DataType::Boolean => Ok(LogicalType::Bool),
            DataType::Utf8 => Ok(LogicalType::Utf8),
            DataType::Binary => Ok(LogicalType::Binary),
            DataType::Date32 => Ok(LogicalType::Date32),
            DataType::Time64(unit) => Ok(LogicalType::Time64 { unit: *unit }),
            DataType::Timestamp(unit, tz) => Ok(LogicalType::Timestamp {
                unit: *unit,
                timezone: tz.as_ref().map(|t| t.to_string()),
            }),
            other => Err(IpcError::UnsupportedType(format!("{other:?}"))),
        }
    }

    /// The Arrow `DataType` this logical type materializes as.
    pub fn to_arrow(&self) -> DataType {
        match self {
            LogicalType::Int { bits: 8, signed: true } => DataType::Int8,
            LogicalType::Int { bits: 16, signed: true } => DataType::Int16,
            LogicalType::Int { bits: 32, signed: true } => DataType::Int32,
            LogicalType::Int { bits: 64, signed: true } => DataType::Int64,
            LogicalType::Int { bits: 8, signed: false } => DataType::UInt8,
            LogicalType::Int { bits: 16, signed: false } => DataType::UInt16,
            LogicalType::Int { bits: 32, signed: false } => DataType::UInt32,
            LogicalType::Int { signed: false, .. } => DataType::UInt64,
            LogicalType::Int { .. } => DataType::Int64,
            LogicalType::Float { bits: 16 } => DataType::Float16,
            LogicalType::Float { bits: 32 } => DataType::Float32,
            LogicalType::Float { .. } => DataType::Float64,
            LogicalType::Bool => DataType::Boolean,
            LogicalType::Utf8 => DataType::Utf8,
            LogicalType::Binary => DataType::Binary,
            LogicalType::Date32 => DataType::Date32,
            LogicalType::Time64 { unit } => DataType::Time64(*unit),
            LogicalType::Timestamp { unit, timezone } => DataType::Timestamp(
                *unit,
                timezone.as_deref().map(Arc::from),
            ),
        }
    }

    /// Number of data buffers (validity bitmap excluded) this type consumes
    /// from a record batch body.
    pub fn data_buffer_count(&self) -> usize {
        match self {
            LogicalType::Utf8 | LogicalType::Binary => 2,
            _ => 1,
        }
    }

    /// Byte width of one value for fixed-width types; `None` for bit-packed
    /// booleans and variable-length types.
    pub fn fixed_width_bytes(&self) -> Option<usize> {
        match self {
            LogicalType::Int { bits, .. } | LogicalType::Float { bits } => {
                Some(usize::from(*bits) / 8)
            }
            LogicalType::Date32 => Some(4),
            LogicalType::Time64 { .. } | LogicalType::Timestamp { .. } => Some(8),
            LogicalType::Bool | LogicalType::Utf8 | LogicalType::Binary => None,
        }
    }
}

fn ipc_time_unit(unit: arrow_ipc::TimeUnit) -> Result<TimeUnit, IpcError> {
    match unit {
        arrow_ipc::TimeUnit::SECOND => Ok(TimeUnit::Second),
        arrow_ipc::TimeUnit::MILLISECOND => Ok(TimeUnit::Millisecond),
        arrow_ipc::TimeUnit::MICROSECOND => Ok(TimeUnit::Microsecond),
        arrow_ipc::TimeUnit::NANOSECOND => Ok(TimeUnit::Nanosecond),
        other => Err(IpcError::UnsupportedType(format!("TimeUnit {other:?}"))),
    }
}
