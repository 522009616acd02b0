//! # Command Vocabulary
//!
//! Purpose: Build the newline-terminated text commands the server accepts,
//! byte-for-byte, from typed inputs.
//!
//! ## Design Principles
//! 1. **Validate Once**: `DbName` and `Command::new` reject line breaks up front,
//!    so the per-verb constructors are infallible.
//! 2. **One Line, One Reply**: A `Command` is exactly one wire line; a `Batch`
//!    is an ordered list of lines closed by the sentinel.
//! 3. **Deterministic Text**: Formatting never depends on locale or state.
//!
//! ## Grammar
//!
//! ```text
//! INFO | PING | HELP | PERF
//! ADD <record>[ INTO <db>]
//! BULKADD[ INTO <db>] \n <record> \n ... \n DDAKLUB
//! GET <n|ALL>[ FROM <a> TO <b>] AS <JSON|CSV>
//! CLEAR[ ALL] | FLUSH[ ALL] | COUNT[ ALL[ IN MEM]]
//! CREATE <db> | USE <db> | EXISTS <db>
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use crate::update::Update;

/// Terminator line that closes a `BULKADD` batch.
pub const BATCH_SENTINEL: &str = "DDAKLUB";

/// Validated database name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbName(String);

impl DbName {
    /// Validates a database name.
    ///
    /// Names must be non-empty and free of whitespace and `;`, which the
    /// server uses as token and statement separators.
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProtocolError::EmptyName);
        }
        if name.contains(['\n', '\r']) {
            return Err(ProtocolError::EmbeddedNewline);
        }
        if name.chars().any(|c| c.is_whitespace() || c == ';') {
            return Err(ProtocolError::InvalidName(name));
        }
        Ok(DbName(name))
    }

    /// Returns the name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DbName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How many records a `GET` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetCount {
    All,
    Last(u32),
}

/// Payload format requested from `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetFormat {
    Json,
    Csv,
}

/// Parameters of a textual `GET` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetQuery {
    pub count: GetCount,
    pub format: GetFormat,
    /// Optional `[from, to]` epoch range in seconds.
    pub range: Option<(u64, u64)>,
}

impl GetQuery {
    /// `GET ALL AS JSON`
    pub fn all_json() -> Self {
        GetQuery {
            count: GetCount::All,
            format: GetFormat::Json,
            range: None,
        }
    }

    /// `GET <n> AS JSON`
    pub fn last_json(n: u32) -> Self {
        GetQuery {
            count: GetCount::Last(n),
            format: GetFormat::Json,
            range: None,
        }
    }

    /// Restricts the query to an epoch range (seconds).
    pub fn between(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    /// Switches the payload format.
    pub fn as_format(mut self, format: GetFormat) -> Self {
        self.format = format;
        self
    }
}

/// One command line, without its terminating newline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Wraps arbitrary command text after checking it is a single line.
    pub fn new(text: impl Into<String>) -> ProtocolResult<Self> {
        let text = text.into();
        if text.contains(['\n', '\r']) {
            return Err(ProtocolError::EmbeddedNewline);
        }
        Ok(Command(text))
    }

    // Callers guarantee `text` is a single line.
    fn trusted(text: String) -> Self {
        Command(text)
    }

    pub fn info() -> Self {
        Command::trusted("INFO".into())
    }

    pub fn ping() -> Self {
        Command::trusted("PING".into())
    }

    pub fn help() -> Self {
        Command::trusted("HELP".into())
    }

    pub fn perf() -> Self {
        Command::trusted("PERF".into())
    }

    /// `ADD <record>` into the connection's current database.
    pub fn add(update: &Update) -> Self {
        Command::trusted(format!("ADD {}", update))
    }

    /// `ADD <record> INTO <db>`
    pub fn insert(update: &Update, db: &DbName) -> Self {
        Command::trusted(format!("ADD {} INTO {}", update, db))
    }

    pub fn get(query: GetQuery) -> Self {
        let mut text = String::from("GET ");
        match query.count {
            GetCount::All => text.push_str("ALL"),
            GetCount::Last(n) => text.push_str(&n.to_string()),
        }
        if let Some((from, to)) = query.range {
            text.push_str(&format!(" FROM {} TO {}", from, to));
        }
        text.push_str(match query.format {
            GetFormat::Json => " AS JSON",
            GetFormat::Csv => " AS CSV",
        });
        Command::trusted(text)
    }

    pub fn clear() -> Self {
        Command::trusted("CLEAR".into())
    }

    pub fn clear_all() -> Self {
        Command::trusted("CLEAR ALL".into())
    }

    pub fn flush() -> Self {
        Command::trusted("FLUSH".into())
    }

    pub fn flush_all() -> Self {
        Command::trusted("FLUSH ALL".into())
    }

    pub fn count() -> Self {
        Command::trusted("COUNT".into())
    }

    pub fn count_all() -> Self {
        Command::trusted("COUNT ALL".into())
    }

    pub fn count_all_in_mem() -> Self {
        Command::trusted("COUNT ALL IN MEM".into())
    }

    pub fn create(db: &DbName) -> Self {
        Command::trusted(format!("CREATE {}", db))
    }

    pub fn use_db(db: &DbName) -> Self {
        Command::trusted(format!("USE {}", db))
    }

    pub fn exists(db: &DbName) -> Self {
        Command::trusted(format!("EXISTS {}", db))
    }

    /// Command text without the newline.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the batch terminator line.
    pub fn is_sentinel(&self) -> bool {
        self.0 == BATCH_SENTINEL
    }

    /// Wire bytes: the text followed by `\n`.
    pub fn to_wire(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.0.len() + 1);
        out.put_slice(self.0.as_bytes());
        out.put_u8(b'\n');
        out.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered batch of lines terminated by [`BATCH_SENTINEL`].
///
/// Only the sentinel's reply is meaningful to the caller; replies to the
/// header and record lines are acknowledgements and are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    lines: Vec<Command>,
}

impl Batch {
    /// `BULKADD`, one record line per update, then the sentinel.
    pub fn bulk_add<'a>(updates: impl IntoIterator<Item = &'a Update>) -> Self {
        Batch::with_header("BULKADD".into(), updates)
    }

    /// `BULKADD INTO <db>`, one record line per update, then the sentinel.
    pub fn bulk_add_into<'a>(updates: impl IntoIterator<Item = &'a Update>, db: &DbName) -> Self {
        Batch::with_header(format!("BULKADD INTO {}", db), updates)
    }

    fn with_header<'a>(header: String, updates: impl IntoIterator<Item = &'a Update>) -> Self {
        let updates = updates.into_iter();
        let mut lines = Vec::with_capacity(updates.size_hint().0 + 2);
        lines.push(Command::trusted(header));
        lines.extend(updates.map(|up| Command::trusted(up.to_record())));
        lines.push(Command::trusted(BATCH_SENTINEL.into()));
        Batch { lines }
    }

    /// Every line in send order, sentinel last.
    pub fn lines(&self) -> &[Command] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<Command> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Update {
        Update {
            ts: 100,
            seq: 1,
            is_trade: true,
            is_bid: false,
            price: 5.0,
            size: 2.5,
        }
    }

    #[test]
    fn simple_verbs() {
        assert_eq!(Command::info().as_str(), "INFO");
        assert_eq!(Command::ping().as_str(), "PING");
        assert_eq!(Command::help().as_str(), "HELP");
        assert_eq!(Command::clear().as_str(), "CLEAR");
        assert_eq!(Command::clear_all().as_str(), "CLEAR ALL");
        assert_eq!(Command::flush().as_str(), "FLUSH");
        assert_eq!(Command::flush_all().as_str(), "FLUSH ALL");
        assert_eq!(Command::count_all_in_mem().as_str(), "COUNT ALL IN MEM");
    }

    #[test]
    fn add_and_insert_text() {
        let db = DbName::new("bnc_btc_eth").unwrap();
        assert_eq!(Command::add(&sample()).as_str(), "ADD 100, 1, t, f, 5.0, 2.5;");
        assert_eq!(
            Command::insert(&sample(), &db).as_str(),
            "ADD 100, 1, t, f, 5.0, 2.5; INTO bnc_btc_eth"
        );
    }

    #[test]
    fn get_queries() {
        assert_eq!(Command::get(GetQuery::all_json()).as_str(), "GET ALL AS JSON");
        assert_eq!(Command::get(GetQuery::last_json(1)).as_str(), "GET 1 AS JSON");
        let ranged = GetQuery::last_json(10)
            .between(1505177459, 1505177460)
            .as_format(GetFormat::Csv);
        assert_eq!(
            Command::get(ranged).as_str(),
            "GET 10 FROM 1505177459 TO 1505177460 AS CSV"
        );
    }

    #[test]
    fn db_commands() {
        let db = DbName::new("orders").unwrap();
        assert_eq!(Command::create(&db).as_str(), "CREATE orders");
        assert_eq!(Command::use_db(&db).as_str(), "USE orders");
        assert_eq!(Command::exists(&db).as_str(), "EXISTS orders");
    }

    #[test]
    fn wire_is_newline_terminated() {
        assert_eq!(&Command::ping().to_wire()[..], b"PING\n");
    }

    #[test]
    fn rejects_line_breaks() {
        assert_eq!(Command::new("PING\nPING"), Err(ProtocolError::EmbeddedNewline));
        assert_eq!(DbName::new("a\r"), Err(ProtocolError::EmbeddedNewline));
        assert_eq!(DbName::new(""), Err(ProtocolError::EmptyName));
        assert!(matches!(DbName::new("a b"), Err(ProtocolError::InvalidName(_))));
    }

    #[test]
    fn bulk_add_batch_layout() {
        let db = DbName::new("book").unwrap();
        let updates = [sample(), Update { seq: 2, ..sample() }];
        let batch = Batch::bulk_add_into(&updates, &db);
        let lines: Vec<&str> = batch.lines().iter().map(Command::as_str).collect();
        assert_eq!(
            lines,
            vec![
                "BULKADD INTO book",
                "100, 1, t, f, 5.0, 2.5;",
                "100, 2, t, f, 5.0, 2.5;",
                "DDAKLUB",
            ]
        );
        assert!(batch.lines().last().unwrap().is_sentinel());
        assert_eq!(Batch::bulk_add(&[]).len(), 2);
    }
}
