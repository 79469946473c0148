// querytree/src/backup/source.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, Kind, Type};
use postgres::{Client, NoTls, Portal, Row, Transaction};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::backup::validate::EXPECTED_COLUMNS;
use crate::config::{ConnectionSettings, QUERY_FILE_NAME, SETTINGS_FILE_NAME};
use crate::errors::{BackupError, Result};

/// Rows fetched from the server per round trip.
pub const DEFAULT_FETCH_SIZE: i32 = 500;

/// One result row: where the file goes, what it is called and what it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub folder: String,
    pub file_name: String,
    pub content: String,
}

/// Column and row counts known before any row is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultShape {
    pub column_count: usize,
    pub row_count: u64,
}

/// Forward-only stream of rows with its shape available up front.
pub trait RowSource: Iterator<Item = Result<ExportRow>> {
    fn shape(&self) -> ResultShape;
}

/// An open database session. Dropping it releases the connection.
pub trait Database {
    type Rows<'a>: RowSource
    where
        Self: 'a;

    fn execute(&mut self, query: &str) -> Result<Self::Rows<'_>>;
}

/// PostgreSQL session over the synchronous `postgres` client.
pub struct PgDatabase {
    client: Client,
    fetch_size: i32,
}

impl PgDatabase {
    pub fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let connection_error = |source| BackupError::Connection {
            name: SETTINGS_FILE_NAME.to_string(),
            source,
        };
        let client = settings
            .pg_config()
            .map_err(connection_error)?
            .connect(NoTls)
            .map_err(connection_error)?;

        Ok(PgDatabase {
            client,
            fetch_size: DEFAULT_FETCH_SIZE,
        })
    }
}

impl Database for PgDatabase {
    type Rows<'a> = PgRows<'a>;

    fn execute(&mut self, query: &str) -> Result<PgRows<'_>> {
        PgRows::open(&mut self.client, query, self.fetch_size)
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        println!("Отключение от базы данных выполнено");
    }
}

/// Rows of a single statement, pulled from a portal in batches.
///
/// Runs inside a transaction that is rolled back when the rows are dropped.
pub struct PgRows<'a> {
    // declared before the transaction so the portal is closed first
    portal: Option<Portal>,
    transaction: Transaction<'a>,
    buffer: VecDeque<Row>,
    fetch_size: i32,
    exhausted: bool,
    shape: ResultShape,
}

impl<'a> PgRows<'a> {
    /// Prepares `query` and, if it yields three columns, fetches the first batch.
    ///
    /// `row_count` is the size of that first batch: exact for results that fit in
    /// one batch, and zero only for an empty result. A statement with the wrong
    /// number of columns is never executed.
    pub fn open(client: &'a mut Client, query: &str, fetch_size: i32) -> Result<Self> {
        let mut transaction = client.transaction()?;
        // the extended protocol accepts one statement only
        let statement = transaction
            .prepare(query)
            .map_err(|source| BackupError::Query {
                name: QUERY_FILE_NAME.to_string(),
                source,
            })?;
        let column_count = statement.columns().len();

        let mut rows = PgRows {
            portal: None,
            transaction,
            buffer: VecDeque::new(),
            fetch_size: fetch_size.max(1),
            exhausted: true,
            shape: ResultShape {
                column_count,
                row_count: 0,
            },
        };

        if column_count == EXPECTED_COLUMNS {
            rows.portal = Some(rows.transaction.bind(&statement, &[])?);
            rows.exhausted = false;
            rows.fetch_batch()?;
            rows.shape.row_count = rows.buffer.len() as u64;
        }
        Ok(rows)
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let Some(portal) = &self.portal else {
            self.exhausted = true;
            return Ok(());
        };
        let batch = self.transaction.query_portal(portal, self.fetch_size)?;
        self.exhausted = batch.len() < self.fetch_size as usize;
        self.buffer.extend(batch);
        Ok(())
    }
}

impl Iterator for PgRows<'_> {
    type Item = Result<ExportRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_batch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let row = self.buffer.pop_front()?;
        Some(export_row(&row))
    }
}

impl RowSource for PgRows<'_> {
    fn shape(&self) -> ResultShape {
        self.shape
    }
}

fn export_row(row: &Row) -> Result<ExportRow> {
    Ok(ExportRow {
        folder: cell_text(row, 0)?,
        file_name: cell_text(row, 1)?,
        content: cell_text(row, 2)?,
    })
}

/// Renders a cell as text. NULL becomes an empty string.
fn cell_text(row: &Row, idx: usize) -> Result<String> {
    let cell = row.try_get::<_, Option<CellText>>(idx)?;
    Ok(cell.map(|c| c.0).unwrap_or_default())
}

type ConversionError = Box<dyn std::error::Error + Sync + Send>;

/// Text form of a non-NULL value, decoded from the binary wire format.
///
/// Types without a decoder here fail the row with a database error; such
/// columns can be cast to `text` in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CellText(String);

impl<'a> FromSql<'a> for CellText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, ConversionError> {
        let text = match *ty {
            Type::BOOL => bool::from_sql(ty, raw)?.to_string(),
            Type::INT2 => i16::from_sql(ty, raw)?.to_string(),
            Type::INT4 => i32::from_sql(ty, raw)?.to_string(),
            Type::INT8 => i64::from_sql(ty, raw)?.to_string(),
            Type::OID => u32::from_sql(ty, raw)?.to_string(),
            Type::FLOAT4 => f32::from_sql(ty, raw)?.to_string(),
            Type::FLOAT8 => f64::from_sql(ty, raw)?.to_string(),
            Type::NUMERIC => Decimal::from_sql(ty, raw)?.to_string(),
            Type::JSON | Type::JSONB => serde_json::Value::from_sql(ty, raw)?.to_string(),
            Type::DATE => NaiveDate::from_sql(ty, raw)?.to_string(),
            Type::TIME => NaiveTime::from_sql(ty, raw)?.to_string(),
            Type::TIMESTAMP => NaiveDateTime::from_sql(ty, raw)?.to_string(),
            Type::TIMESTAMPTZ => DateTime::<Utc>::from_sql(ty, raw)?
                .format("%Y-%m-%d %H:%M:%S%.f%:z")
                .to_string(),
            Type::UUID => Uuid::from_sql(ty, raw)?.to_string(),
            Type::BYTEA => String::from_utf8_lossy(raw).into_owned(),
            // text-like types and enum labels travel as UTF-8
            _ if <&str as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_)) => {
                std::str::from_utf8(raw)?.to_string()
            }
            _ => return Err(format!("значения типа {} не поддерживаются", ty).into()),
        };
        Ok(CellText(text))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// In-memory session used by tests in place of a live server.
#[cfg(test)]
pub mod memory {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    pub struct MemoryRows {
        rows: std::vec::IntoIter<Result<ExportRow>>,
        shape: ResultShape,
        pulled: Rc<Cell<usize>>,
    }

    impl Iterator for MemoryRows {
        type Item = Result<ExportRow>;

        fn next(&mut self) -> Option<Self::Item> {
            let row = self.rows.next()?;
            self.pulled.set(self.pulled.get() + 1);
            Some(row)
        }
    }

    impl RowSource for MemoryRows {
        fn shape(&self) -> ResultShape {
            self.shape
        }
    }

    /// Serves a fixed result for any query and records what happened to it.
    pub struct MemoryDatabase {
        pub column_count: usize,
        pub rows: Vec<Result<ExportRow>>,
        pub queries: Rc<std::cell::RefCell<Vec<String>>>,
        pub pulled: Rc<Cell<usize>>,
        pub closed: Rc<Cell<bool>>,
    }

    impl MemoryDatabase {
        pub fn new(column_count: usize, rows: Vec<Result<ExportRow>>) -> Self {
            MemoryDatabase {
                column_count,
                rows,
                queries: Rc::default(),
                pulled: Rc::default(),
                closed: Rc::default(),
            }
        }
    }

    impl Database for MemoryDatabase {
        type Rows<'a> = MemoryRows;

        fn execute(&mut self, query: &str) -> Result<MemoryRows> {
            self.queries.borrow_mut().push(query.to_string());
            let rows = std::mem::take(&mut self.rows);
            Ok(MemoryRows {
                shape: ResultShape {
                    column_count: self.column_count,
                    row_count: rows.len() as u64,
                },
                rows: rows.into_iter(),
                pulled: Rc::clone(&self.pulled),
            })
        }
    }

    impl Drop for MemoryDatabase {
        fn drop(&mut self) {
            self.closed.set(true);
        }
    }
}
