//! # SQLite access
//!
//! A process-lifetime database handle, provisioned either by downloading a
//! SQL script into an in-memory store or by opening an existing file.
//! Results are rendered as text because they are handed straight back to
//! the model as tool output.

use crate::error::{self, Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Chinook sample database, as a SQLite script
pub const CHINOOK_SCRIPT_URL: &str = "https://raw.githubusercontent.com/lerocha/chinook-database/master/ChinookDatabase/DataSources/Chinook_Sqlite.sql";

/// Rows shown per table in `table_info`
const SAMPLE_ROWS_IN_TABLE_INFO: usize = 3;
/// Sample values are clipped to this many characters
const SAMPLE_VALUE_MAX_LEN: usize = 100;
/// String values in query results are clipped to this many characters
const MAX_STRING_LENGTH: usize = 300;

/// Where the database comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    /// Download a SQL script and run it into a fresh in-memory database
    RemoteScript { url: String },
    /// Open an existing SQLite file
    LocalFile { path: PathBuf },
}

impl DatabaseSource {
    pub fn chinook() -> Self {
        DatabaseSource::RemoteScript {
            url: CHINOOK_SCRIPT_URL.to_string(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        DatabaseSource::LocalFile { path: path.into() }
    }

    pub fn describe(&self) -> String {
        match self {
            DatabaseSource::RemoteScript { url } => format!("script {}", url),
            DatabaseSource::LocalFile { path } => format!("file {}", path.display()),
        }
    }
}

/// Shared SQLite handle used by the SQL tools
#[derive(Debug)]
pub struct SqlDatabase {
    conn: Mutex<Connection>,
}

impl SqlDatabase {
    /// Produce a queryable database from `source`.
    pub async fn provision(source: &DatabaseSource) -> Result<Self> {
        tracing::info!(source = %source.describe(), "provisioning database");
        let db = match source {
            DatabaseSource::RemoteScript { url } => {
                let script = fetch_script(url).await?;
                Self::from_script(&script).map_err(|e| e.with_context("url", url.as_str()))?
            }
            DatabaseSource::LocalFile { path } => Self::open(path)?,
        };
        Ok(db)
    }

    /// Materialize `sql` in a new in-memory database.
    pub fn from_script(sql: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::database_unavailable(e.to_string())
                .with_operation("database::from_script")
                .set_source(e)
        })?;
        conn.execute_batch(sql).map_err(|e| {
            Error::database_unavailable(format!("script failed: {}", e))
                .with_operation("database::from_script")
                .set_source(e)
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Open an existing database file. A missing file is an error, not a
    /// silently created empty database.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::database_unavailable("database file does not exist")
                .with_operation("database::open")
                .with_context("path", path.display().to_string()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            Error::database_unavailable(e.to_string())
                .with_operation("database::open")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn dialect(&self) -> &'static str {
        "sqlite"
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::unexpected("database connection lock poisoned"))
    }

    /// User tables, sorted by name
    pub fn table_names(&self) -> Result<Vec<String>> {
        const QUERY: &str = "SELECT name FROM sqlite_master \
                             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let conn = self.conn()?;
        let mut stmt = conn.prepare(QUERY).map_err(|e| error::sqlite_failed(QUERY, e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| error::sqlite_failed(QUERY, e))?;
        Ok(names)
    }

    /// DDL plus a few sample rows for each requested table (all tables when
    /// `names` is `None`). Unknown names are an error.
    pub fn table_info(&self, names: Option<&[String]>) -> Result<String> {
        let all = self.table_names()?;
        let selected: Vec<&String> = match names {
            None => all.iter().collect(),
            Some(requested) => {
                let missing: Vec<&str> = requested
                    .iter()
                    .filter(|n| !all.contains(n))
                    .map(|n| n.as_str())
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::table_not_found(missing.join(", "))
                        .with_operation("database::table_info"));
                }
                all.iter().filter(|n| requested.contains(n)).collect()
            }
        };

        let conn = self.conn()?;
        let mut blocks = Vec::with_capacity(selected.len());
        for table in selected {
            let ddl: String = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .map_err(|e| error::sqlite_failed("sqlite_master", e))?;
            let samples = sample_rows(&conn, table)?;
            blocks.push(format!("{}\n\n/*\n{}\n*/", ddl.trim(), samples));
        }
        Ok(blocks.join("\n\n"))
    }

    /// Like `table_info`, but failures come back as an `Error: ...` string.
    pub fn table_info_no_throw(&self, names: Option<&[String]>) -> String {
        self.table_info(names).unwrap_or_else(|e| format!("Error: {}", e.message()))
    }

    /// Run one statement. Rows are rendered as a list of tuples; statements
    /// that produce no rows yield an empty string.
    ///
    /// Input holding more than one statement is rejected before anything
    /// runs.
    pub fn run(&self, query: &str) -> Result<String> {
        let conn = self.conn()?;
        let mut batch = Batch::new(&conn, query);
        let mut stmt = match batch.next().map_err(|e| error::sqlite_failed(query, e))? {
            Some(stmt) => stmt,
            None => {
                return Err(Error::query_failed(query, "query is empty")
                    .with_operation("database::run"))
            }
        };
        // Trailing whitespace, comments and semicolons prepare to nothing
        if !matches!(batch.next(), Ok(None)) {
            return Err(
                Error::query_failed(query, "You can only execute one statement at a time.")
                    .with_operation("database::run"),
            );
        }

        if stmt.column_count() == 0 {
            stmt.execute([]).map_err(|e| error::sqlite_failed(query, e))?;
            return Ok(String::new());
        }

        let columns = stmt.column_count();
        let mut rows = stmt.query([]).map_err(|e| error::sqlite_failed(query, e))?;
        let mut rendered = Vec::new();
        while let Some(row) = rows.next().map_err(|e| error::sqlite_failed(query, e))? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                let value = row.get_ref(i).map_err(|e| error::sqlite_failed(query, e))?;
                values.push(repr_value(value));
            }
            rendered.push(if values.len() == 1 {
                format!("({},)", values[0])
            } else {
                format!("({})", values.join(", "))
            });
        }

        if rendered.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("[{}]", rendered.join(", ")))
        }
    }

    /// Like `run`, but failures come back as an `Error: ...` string the
    /// model can read and react to.
    pub fn run_no_throw(&self, query: &str) -> String {
        self.run(query).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "query failed");
            format!("Error: {}", e.message())
        })
    }
}

async fn fetch_script(url: &str) -> Result<String> {
    let unavailable = |e: reqwest::Error| {
        Error::database_unavailable(format!("failed to fetch SQL script: {}", e))
            .with_operation("database::fetch_script")
            .with_context("url", url)
            .set_source(e)
    };

    let response = reqwest::get(url).await.map_err(unavailable)?;
    let response = response.error_for_status().map_err(unavailable)?;
    let script = response.text().await.map_err(unavailable)?;
    tracing::debug!(bytes = script.len(), "fetched SQL script");
    Ok(script)
}

fn sample_rows(conn: &Connection, table: &str) -> Result<String> {
    let query = format!(
        "SELECT * FROM {} LIMIT {}",
        quote_identifier(table),
        SAMPLE_ROWS_IN_TABLE_INFO
    );
    let mut stmt = conn.prepare(&query).map_err(|e| error::sqlite_failed(&query, e))?;
    let header = stmt
        .column_names()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("\t");
    let columns = stmt.column_count();

    let mut lines = vec![
        format!("{} rows from {} table:", SAMPLE_ROWS_IN_TABLE_INFO, table),
        header,
    ];
    let mut rows = stmt.query([]).map_err(|e| error::sqlite_failed(&query, e))?;
    while let Some(row) = rows.next().map_err(|e| error::sqlite_failed(&query, e))? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value = row.get_ref(i).map_err(|e| error::sqlite_failed(&query, e))?;
            values.push(clip(&str_value(value), SAMPLE_VALUE_MAX_LEN));
        }
        lines.push(values.join("\t"));
    }
    Ok(lines.join("\n"))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Clip long strings at a word boundary, marking the cut with `...`.
fn truncate_words(s: &str, max_chars: usize) -> String {
    const SUFFIX: &str = "...";
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars - SUFFIX.len()).collect();
    let head = match head.rsplit_once(' ') {
        Some((before, _)) => before.to_string(),
        None => head,
    };
    format!("{}{}", head, SUFFIX)
}

/// Shortest round-trip digits, switching to scientific notation below 1e-4
/// and from 1e16 up, with a signed two-digit exponent (`1e+16`, `2.5e-07`)
fn format_real(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:e}", f);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if f != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Plain rendering, used for sample rows
fn str_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format_real(f),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => repr_bytes(b),
    }
}

/// Literal rendering, used inside result tuples
fn repr_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Text(t) => {
            let text = String::from_utf8_lossy(t);
            repr_str(&truncate_words(&text, MAX_STRING_LENGTH))
        }
        other => str_value(other),
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn repr_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('\'');
    out
}
