//! # Command Facade
//!
//! One method per server verb, shared by single links and pools. Every method
//! queues its command immediately and returns the reply future.

use tsdb_common::{Batch, Command, DbName, GetQuery, Update};

use crate::connection::Connection;
use crate::pool::Pool;
use crate::response::ResponseFuture;

/// Server verbs on top of `submit` / `submit_batch`.
pub trait Commands {
    /// Queues one command line.
    fn submit(&self, command: Command) -> ResponseFuture;

    /// Queues a batch; the future settles with the sentinel's reply.
    fn submit_batch(&self, batch: Batch) -> ResponseFuture;

    fn info(&self) -> ResponseFuture {
        self.submit(Command::info())
    }

    fn ping(&self) -> ResponseFuture {
        self.submit(Command::ping())
    }

    fn help(&self) -> ResponseFuture {
        self.submit(Command::help())
    }

    fn perf(&self) -> ResponseFuture {
        self.submit(Command::perf())
    }

    /// Adds one update to the current database.
    fn add(&self, update: &Update) -> ResponseFuture {
        self.submit(Command::add(update))
    }

    /// Adds one update to `db`.
    fn insert(&self, update: &Update, db: &DbName) -> ResponseFuture {
        self.submit(Command::insert(update, db))
    }

    /// Adds many updates to the current database as one batch.
    fn bulk_add(&self, updates: &[Update]) -> ResponseFuture {
        self.submit_batch(Batch::bulk_add(updates))
    }

    /// Adds many updates to `db` as one batch.
    fn bulk_add_into(&self, updates: &[Update], db: &DbName) -> ResponseFuture {
        self.submit_batch(Batch::bulk_add_into(updates, db))
    }

    /// `GET ALL AS JSON`; decode with [`crate::Response::json`].
    fn get_all(&self) -> ResponseFuture {
        self.submit(Command::get(GetQuery::all_json()))
    }

    /// `GET <n> AS JSON`; decode with [`crate::Response::json`].
    fn get(&self, n: u32) -> ResponseFuture {
        self.submit(Command::get(GetQuery::last_json(n)))
    }

    fn query(&self, query: GetQuery) -> ResponseFuture {
        self.submit(Command::get(query))
    }

    fn clear(&self) -> ResponseFuture {
        self.submit(Command::clear())
    }

    fn clear_all(&self) -> ResponseFuture {
        self.submit(Command::clear_all())
    }

    fn flush(&self) -> ResponseFuture {
        self.submit(Command::flush())
    }

    fn flush_all(&self) -> ResponseFuture {
        self.submit(Command::flush_all())
    }

    fn count(&self) -> ResponseFuture {
        self.submit(Command::count())
    }

    fn count_all(&self) -> ResponseFuture {
        self.submit(Command::count_all())
    }

    fn count_all_in_mem(&self) -> ResponseFuture {
        self.submit(Command::count_all_in_mem())
    }

    fn create(&self, db: &DbName) -> ResponseFuture {
        self.submit(Command::create(db))
    }

    fn use_db(&self, db: &DbName) -> ResponseFuture {
        self.submit(Command::use_db(db))
    }

    fn exists(&self, db: &DbName) -> ResponseFuture {
        self.submit(Command::exists(db))
    }
}

impl Commands for Connection {
    fn submit(&self, command: Command) -> ResponseFuture {
        Connection::submit(self, command)
    }

    fn submit_batch(&self, batch: Batch) -> ResponseFuture {
        Connection::submit_batch(self, batch)
    }
}

impl Commands for Pool {
    fn submit(&self, command: Command) -> ResponseFuture {
        Pool::submit(self, command)
    }

    fn submit_batch(&self, batch: Batch) -> ResponseFuture {
        Pool::submit_batch(self, batch)
    }
}
