///
/// odbx-driver-sqlite - SQLite Backend
///
/// `SqliteDriver` implements `odbx_driver::Driver` over a bundled SQLite.
/// The DSN is the database path (`:memory:` for a private in-memory
/// database); a `DATABASE=<path>` entry in the driver string takes
/// precedence.
///
/// Beyond plain query execution the driver emulates the parts of the
/// call-level interface the engine relies on:
///
/// - Parameter description and deferred (`put_data`) input
/// - Bound-column fetch with truncation notices
/// - Scrollable cursors when the cursor type is not forward-only
/// - `get_data` in pieces, optionally reporting `NO_TOTAL`
/// - `SQLTables` / `SQLColumns` shaped catalog listings
/// - Cancellation through SQLite's interrupt handle
///

mod catalog;
mod convert;
mod cursor;
mod describe;
mod registry;
mod sqlite;

pub use sqlite::{SqliteDriver, SqliteDriverOptions};
