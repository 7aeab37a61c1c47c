//! ADBC FFI-compatible trait implementations.
//!
//! This module provides wrapper types that implement the `adbc_core` traits,
//! enabling the cubearrow-rs driver to be exported as a C-compatible shared
//! library. The driver is synchronous end to end, so the wrappers delegate
//! straight to the native objects.
//!
//! # FFI Export
//!
//! Built with `--features ffi`, the library exports the entry point
//! `CubeArrowDriverInit` for ADBC driver managers:
//!
//! ```bash
//! cargo build --release --features ffi
//! ```
//!
//! # Connection URI Format
//!
//! ```text
//! cube://[token@]host[:port][/database][?param=value&...]
//! ```
//!
//! The token can alternatively be supplied through the standard password
//! option or `adbc.cube.token`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use adbc_core::error::{Error as AdbcError, Result as AdbcResult, Status as AdbcStatus};
use adbc_core::options::{
    InfoCode, ObjectDepth, OptionConnection, OptionDatabase, OptionStatement, OptionValue,
};
use adbc_core::{Optionable, PartitionedResult};
use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::Schema;

use crate::adbc::Connection as CubeConnection;
use crate::connection::ConnectionParams;
use crate::error::{AdbcStatusCode, CubeError};
use crate::ipc::IpcStreamReader;

/// Convert a CubeError to an ADBC Error, preserving the status taxonomy.
fn to_adbc_error(err: CubeError) -> AdbcError {
    let status = match err.to_adbc_code() {
        AdbcStatusCode::InvalidArgument => AdbcStatus::InvalidArguments,
        AdbcStatusCode::InvalidState => AdbcStatus::InvalidState,
        AdbcStatusCode::Unauthenticated => AdbcStatus::Unauthenticated,
        AdbcStatusCode::Io => AdbcStatus::IO,
        AdbcStatusCode::Protocol => AdbcStatus::InvalidData,
        AdbcStatusCode::Unsupported => AdbcStatus::NotImplemented,
        AdbcStatusCode::ServerError => AdbcStatus::Internal,
    };
    AdbcError::with_message_and_status(err.to_string(), status)
}

fn not_implemented(what: &str) -> AdbcError {
    AdbcError::with_message_and_status(format!("{what} not supported"), AdbcStatus::NotImplemented)
}

fn expect_string(value: OptionValue, what: &str) -> AdbcResult<String> {
    match value {
        OptionValue::String(s) => Ok(s),
        _ => Err(AdbcError::with_message_and_status(
            format!("{what} must be a string"),
            AdbcStatus::InvalidArguments,
        )),
    }
}

// -----------------------------------------------------------------------------
// FFI Driver
// -----------------------------------------------------------------------------

/// FFI-compatible ADBC Driver wrapper, loaded via `CubeArrowDriverInit`.
#[derive(Debug, Default)]
pub struct FfiDriver;

impl adbc_core::Driver for FfiDriver {
    type DatabaseType = FfiDatabase;

    fn new_database(&mut self) -> AdbcResult<Self::DatabaseType> {
        Ok(FfiDatabase::default())
    }

    fn new_database_with_opts(
        &mut self,
        opts: impl IntoIterator<Item = (OptionDatabase, OptionValue)>,
    ) -> AdbcResult<Self::DatabaseType> {
        let mut database = FfiDatabase::default();
        for (key, value) in opts {
            database.set_option(key, value)?;
        }
        Ok(database)
    }
}

// -----------------------------------------------------------------------------
// FFI Database
// -----------------------------------------------------------------------------

/// FFI-compatible ADBC Database wrapper.
///
/// Stores the connection URI and option overrides; connections are created
/// on demand. The primary option is `OptionDatabase::Uri` carrying a
/// `cube://` connection string.
#[derive(Debug, Default)]
pub struct FfiDatabase {
    /// Connection URI (cube://token@host:port/database)
    uri: Option<String>,
    /// Token override (password option or adbc.cube.token)
    token: Option<String>,
    /// Database override (adbc.cube.database)
    database: Option<String>,
    /// Custom options
    options: HashMap<String, OptionValue>,
}

impl FfiDatabase {
    /// Resolve stored options into validated connection parameters.
    fn build_params(&self) -> AdbcResult<ConnectionParams> {
        let uri = self.uri.as_ref().ok_or_else(|| {
            AdbcError::with_message_and_status(
                "Database URI not set. Set the uri option to cube://...",
                AdbcStatus::InvalidState,
            )
        })?;

        if self.token.is_none() && self.database.is_none() {
            return ConnectionParams::from_str(uri)
                .map_err(|e| to_adbc_error(CubeError::Connection(e)));
        }

        let mut builder = ConnectionParams::builder();
        // Start from the URI where it parses; overrides win.
        if let Ok(params) = ConnectionParams::from_str(uri) {
            builder = builder
                .host(&params.host)
                .port(params.port)
                .token(params.token());
            if let Some(db) = &params.database {
                builder = builder.database(db);
            }
            if let Some(t) = params.timeout {
                builder = builder.timeout(t);
            }
        } else {
            // The URI may omit the token when it is passed as an option.
            let trimmed = uri.strip_prefix("cube://").unwrap_or(uri);
            let (host_part, _) = trimmed.split_once('?').unwrap_or((trimmed, ""));
            let (host_port, database) = match host_part.split_once('/') {
                Some((hp, db)) if !db.is_empty() => (hp, Some(db)),
                Some((hp, _)) => (hp, None),
                None => (host_part, None),
            };
            match host_port.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        AdbcError::with_message_and_status(
                            format!("invalid port in URI '{uri}'"),
                            AdbcStatus::InvalidArguments,
                        )
                    })?;
                    builder = builder.host(host).port(port);
                }
                None => builder = builder.host(host_port),
            }
            if let Some(db) = database {
                builder = builder.database(db);
            }
        }

        if let Some(token) = &self.token {
            builder = builder.token(token);
        }
        if let Some(database) = &self.database {
            builder = builder.database(database);
        }

        builder
            .build()
            .map_err(|e| to_adbc_error(CubeError::Connection(e)))
    }
}

impl Optionable for FfiDatabase {
    type Option = OptionDatabase;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> AdbcResult<()> {
        match key {
            OptionDatabase::Uri => {
                self.uri = Some(expect_string(value, "URI")?);
            }
            OptionDatabase::Password => {
                self.token = Some(expect_string(value, "Password")?);
            }
            OptionDatabase::Other(key) if key == "adbc.cube.token" => {
                self.token = Some(expect_string(value, "adbc.cube.token")?);
            }
            OptionDatabase::Other(key) if key == "adbc.cube.database" => {
                self.database = Some(expect_string(value, "adbc.cube.database")?);
            }
            OptionDatabase::Other(key) => {
                self.options.insert(key, value);
            }
            _ => {
                return Err(not_implemented("database option"));
            }
        }
        Ok(())
    }

    fn get_option_string(&self, key: Self::Option) -> AdbcResult<String> {
        match key {
            OptionDatabase::Uri => self.uri.clone().ok_or_else(|| {
                AdbcError::with_message_and_status("URI not set", AdbcStatus::NotFound)
            }),
            OptionDatabase::Password => Err(AdbcError::with_message_and_status(
                "Token cannot be retrieved",
                AdbcStatus::InvalidArguments,
            )),
            OptionDatabase::Other(key) => match self.options.get(&key) {
                Some(OptionValue::String(s)) => Ok(s.clone()),
                _ => Err(AdbcError::with_message_and_status(
                    format!("Option {key} not found or not a string"),
                    AdbcStatus::NotFound,
                )),
            },
            _ => Err(AdbcError::with_message_and_status(
                "Option not found",
                AdbcStatus::NotFound,
            )),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> AdbcResult<Vec<u8>> {
        if let OptionDatabase::Other(key) = key {
            if let Some(OptionValue::Bytes(b)) = self.options.get(&key) {
                return Ok(b.clone());
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not bytes",
            AdbcStatus::NotFound,
        ))
    }

    fn get_option_int(&self, key: Self::Option) -> AdbcResult<i64> {
        if let OptionDatabase::Other(key) = key {
            if let Some(OptionValue::Int(i)) = self.options.get(&key) {
                return Ok(*i);
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not an integer",
            AdbcStatus::NotFound,
        ))
    }

    fn get_option_double(&self, key: Self::Option) -> AdbcResult<f64> {
        if let OptionDatabase::Other(key) = key {
            if let Some(OptionValue::Double(d)) = self.options.get(&key) {
                return Ok(*d);
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not a double",
            AdbcStatus::NotFound,
        ))
    }
}

impl adbc_core::Database for FfiDatabase {
    type ConnectionType = FfiConnection;

    fn new_connection(&self) -> AdbcResult<Self::ConnectionType> {
        Ok(FfiConnection::new(self.build_params()?))
    }

    fn new_connection_with_opts(
        &self,
        opts: impl IntoIterator<Item = (OptionConnection, OptionValue)>,
    ) -> AdbcResult<Self::ConnectionType> {
        let mut connection = FfiConnection::new(self.build_params()?);
        for (key, value) in opts {
            connection.set_option(key, value)?;
        }
        Ok(connection)
    }
}

// -----------------------------------------------------------------------------
// FFI Connection
// -----------------------------------------------------------------------------

/// FFI-compatible ADBC Connection wrapper.
///
/// The wire connection is established lazily, on the first statement.
pub struct FfiConnection {
    params: ConnectionParams,
    inner: Option<CubeConnection>,
    options: HashMap<String, OptionValue>,
}

impl FfiConnection {
    fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            inner: None,
            options: HashMap::new(),
        }
    }

    fn ensure_connected(&mut self) -> AdbcResult<&mut CubeConnection> {
        if self.inner.is_none() {
            let connection = CubeConnection::connect(&self.params).map_err(to_adbc_error)?;
            self.inner = Some(connection);
        }
        Ok(self.inner.as_mut().unwrap())
    }
}

impl Optionable for FfiConnection {
    type Option = OptionConnection;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> AdbcResult<()> {
        match key {
            OptionConnection::AutoCommit => {
                // Cube queries are read-only and auto-committed.
                let v = expect_string(value, "AutoCommit")?;
                if v == "true" || v == "1" {
                    Ok(())
                } else {
                    Err(not_implemented("disabling auto-commit"))
                }
            }
            OptionConnection::Other(key) => {
                self.options.insert(key, value);
                Ok(())
            }
            _ => Err(not_implemented("connection option")),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> AdbcResult<String> {
        match key {
            OptionConnection::AutoCommit => Ok("true".to_string()),
            OptionConnection::Other(key) => match self.options.get(&key) {
                Some(OptionValue::String(s)) => Ok(s.clone()),
                _ => Err(AdbcError::with_message_and_status(
                    format!("Option {key} not found"),
                    AdbcStatus::NotFound,
                )),
            },
            _ => Err(AdbcError::with_message_and_status(
                "Option not found",
                AdbcStatus::NotFound,
            )),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> AdbcResult<Vec<u8>> {
        if let OptionConnection::Other(key) = key {
            if let Some(OptionValue::Bytes(b)) = self.options.get(&key) {
                return Ok(b.clone());
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not bytes",
            AdbcStatus::NotFound,
        ))
    }

    fn get_option_int(&self, key: Self::Option) -> AdbcResult<i64> {
        if let OptionConnection::Other(key) = key {
            if let Some(OptionValue::Int(i)) = self.options.get(&key) {
                return Ok(*i);
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not an integer",
            AdbcStatus::NotFound,
        ))
    }

    fn get_option_double(&self, key: Self::Option) -> AdbcResult<f64> {
        if let OptionConnection::Other(key) = key {
            if let Some(OptionValue::Double(d)) = self.options.get(&key) {
                return Ok(*d);
            }
        }
        Err(AdbcError::with_message_and_status(
            "Option not found or not a double",
            AdbcStatus::NotFound,
        ))
    }
}

/// A simple RecordBatchReader implementation that yields batches from a Vec.
struct VecRecordBatchReader {
    schema: Arc<Schema>,
    batches: std::vec::IntoIter<RecordBatch>,
}

impl VecRecordBatchReader {
    fn new(schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches: batches.into_iter(),
        }
    }
}

impl Iterator for VecRecordBatchReader {
    type Item = Result<RecordBatch, arrow_schema::ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next().map(Ok)
    }
}

impl RecordBatchReader for VecRecordBatchReader {
    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }
}

impl adbc_core::Connection for FfiConnection {
    type StatementType = FfiStatement;

    fn new_statement(&mut self) -> AdbcResult<Self::StatementType> {
        self.ensure_connected()?;
        Ok(FfiStatement::new(self.params.clone()))
    }

    fn cancel(&mut self) -> AdbcResult<()> {
        Err(not_implemented("cancel"))
    }

    fn get_info(
        &self,
        _codes: Option<std::collections::HashSet<InfoCode>>,
    ) -> AdbcResult<impl RecordBatchReader + Send> {
        use arrow_array::builder::{StringBuilder, UInt32Builder};
        use arrow_schema::{DataType, Field};

        let schema = Arc::new(Schema::new(vec![
            Field::new("info_name", DataType::UInt32, false),
            Field::new("info_value", DataType::Utf8, true),
        ]));

        let mut name_builder = UInt32Builder::new();
        let mut value_builder = StringBuilder::new();

        name_builder.append_value(0); // VendorName
        value_builder.append_value("Cube");

        name_builder.append_value(100); // DriverName
        value_builder.append_value("cubearrow-rs");

        name_builder.append_value(101); // DriverVersion
        value_builder.append_value(env!("CARGO_PKG_VERSION"));

        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(name_builder.finish()),
                Arc::new(value_builder.finish()),
            ],
        )
        .map_err(|e| AdbcError::with_message_and_status(e.to_string(), AdbcStatus::Internal))?;

        Ok(VecRecordBatchReader::new(schema, vec![batch]))
    }

    fn get_objects(
        &self,
        _depth: ObjectDepth,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _table_type: Option<Vec<&str>>,
        _column_name: Option<&str>,
    ) -> AdbcResult<impl RecordBatchReader + Send> {
        Err::<VecRecordBatchReader, _>(not_implemented("get_objects"))
    }

    fn get_table_schema(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: &str,
    ) -> AdbcResult<Schema> {
        Err(not_implemented("get_table_schema"))
    }

    fn get_table_types(&self) -> AdbcResult<impl RecordBatchReader + Send> {
        use arrow_array::builder::StringBuilder;
        use arrow_schema::{DataType, Field};

        let schema = Arc::new(Schema::new(vec![Field::new(
            "table_type",
            DataType::Utf8,
            false,
        )]));

        let mut builder = StringBuilder::new();
        builder.append_value("TABLE");
        builder.append_value("VIEW");

        let batch = RecordBatch::try_new(Arc::clone(&schema), vec![Arc::new(builder.finish())])
            .map_err(|e| AdbcError::with_message_and_status(e.to_string(), AdbcStatus::Internal))?;

        Ok(VecRecordBatchReader::new(schema, vec![batch]))
    }

    fn get_statistic_names(&self) -> AdbcResult<impl RecordBatchReader + Send> {
        use arrow_schema::{DataType, Field};
        let schema = Arc::new(Schema::new(vec![
            Field::new("statistic_name", DataType::Utf8, false),
            Field::new("statistic_key", DataType::Int16, false),
        ]));
        Ok(VecRecordBatchReader::new(schema, vec![]))
    }

    fn get_statistics(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _approximate: bool,
    ) -> AdbcResult<impl RecordBatchReader + Send> {
        Err::<VecRecordBatchReader, _>(not_implemented("get_statistics"))
    }

    fn commit(&mut self) -> AdbcResult<()> {
        Err(not_implemented("transactions"))
    }

    fn rollback(&mut self) -> AdbcResult<()> {
        Err(not_implemented("transactions"))
    }

    fn read_partition(
        &self,
        _partition: impl AsRef<[u8]>,
    ) -> AdbcResult<impl RecordBatchReader + Send> {
        Err::<VecRecordBatchReader, _>(not_implemented("partitioned results"))
    }
}

// -----------------------------------------------------------------------------
// FFI Statement
// -----------------------------------------------------------------------------

/// FFI-compatible ADBC Statement wrapper.
///
/// Executes SQL and returns results as an Arrow record batch stream. Each
/// execute opens its own wire connection so the returned reader is
/// independent of the statement's lifetime.
pub struct FfiStatement {
    params: ConnectionParams,
    sql: Option<String>,
    options: HashMap<String, OptionValue>,
}

impl FfiStatement {
    fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            sql: None,
            options: HashMap::new(),
        }
    }
}

impl Optionable for FfiStatement {
    type Option = OptionStatement;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> AdbcResult<()> {
        let key = match key {
            OptionStatement::Other(k) => k,
            other => other.as_ref().to_string(),
        };
        self.options.insert(key, value);
        Ok(())
    }

    fn get_option_string(&self, key: Self::Option) -> AdbcResult<String> {
        let key = match key {
            OptionStatement::Other(ref k) => k.as_str(),
            ref other => other.as_ref(),
        };
        match self.options.get(key) {
            Some(OptionValue::String(s)) => Ok(s.clone()),
            _ => Err(AdbcError::with_message_and_status(
                "Option not found or not a string",
                AdbcStatus::NotFound,
            )),
        }
    }

    fn get_option_bytes(&self, key: Self::Option) -> AdbcResult<Vec<u8>> {
        let key = match key {
            OptionStatement::Other(ref k) => k.as_str(),
            ref other => other.as_ref(),
        };
        match self.options.get(key) {
            Some(OptionValue::Bytes(b)) => Ok(b.clone()),
            _ => Err(AdbcError::with_message_and_status(
                "Option not found or not bytes",
                AdbcStatus::NotFound,
            )),
        }
    }

    fn get_option_int(&self, key: Self::Option) -> AdbcResult<i64> {
        let key = match key {
            OptionStatement::Other(ref k) => k.as_str(),
            ref other => other.as_ref(),
        };
        match self.options.get(key) {
            Some(OptionValue::Int(i)) => Ok(*i),
            _ => Err(AdbcError::with_message_and_status(
                "Option not found or not an integer",
                AdbcStatus::NotFound,
            )),
        }
    }

    fn get_option_double(&self, key: Self::Option) -> AdbcResult<f64> {
        let key = match key {
            OptionStatement::Other(ref k) => k.as_str(),
            ref other => other.as_ref(),
        };
        match self.options.get(key) {
            Some(OptionValue::Double(d)) => Ok(*d),
            _ => Err(AdbcError::with_message_and_status(
                "Option not found or not a double",
                AdbcStatus::NotFound,
            )),
        }
    }
}

impl adbc_core::Statement for FfiStatement {
    fn bind(&mut self, _batch: RecordBatch) -> AdbcResult<()> {
        Err(not_implemented("parameter binding"))
    }

    fn bind_stream(&mut self, _reader: Box<dyn RecordBatchReader + Send>) -> AdbcResult<()> {
        Err(not_implemented("parameter binding"))
    }

    fn execute(&mut self) -> AdbcResult<impl RecordBatchReader + Send> {
        let sql = self.sql.clone().ok_or_else(|| {
            AdbcError::with_message_and_status("SQL query not set", AdbcStatus::InvalidState)
        })?;

        let reader: IpcStreamReader = {
            let mut connection =
                CubeConnection::connect(&self.params).map_err(to_adbc_error)?;
            let reader = connection.query(&sql).map_err(to_adbc_error)?;
            connection.close();
            reader
        };
        Ok(reader)
    }

    fn execute_update(&mut self) -> AdbcResult<Option<i64>> {
        Err(not_implemented("execute_update"))
    }

    fn execute_schema(&mut self) -> AdbcResult<Schema> {
        Err(not_implemented("execute_schema"))
    }

    fn execute_partitions(&mut self) -> AdbcResult<PartitionedResult> {
        Err(not_implemented("partitioned execution"))
    }

    fn get_parameter_schema(&self) -> AdbcResult<Schema> {
        Err(not_implemented("get_parameter_schema"))
    }

    fn prepare(&mut self) -> AdbcResult<()> {
        if self.sql.is_none() {
            return Err(AdbcError::with_message_and_status(
                "SQL query not set",
                AdbcStatus::InvalidState,
            ));
        }
        Ok(())
    }

    fn set_sql_query(&mut self, query: impl AsRef<str>) -> AdbcResult<()> {
        self.sql = Some(query.as_ref().to_string());
        Ok(())
    }

    fn set_substrait_plan(&mut self, _plan: impl AsRef<[u8]>) -> AdbcResult<()> {
        Err(not_implemented("Substrait plans"))
    }

    fn cancel(&mut self) -> AdbcResult<()> {
        Err(not_implemented("cancel"))
    }
}

// -----------------------------------------------------------------------------
// FFI Export
// -----------------------------------------------------------------------------

// Export the driver using the adbc_ffi macro.
adbc_ffi::export_driver!(CubeArrowDriverInit, FfiDriver);
