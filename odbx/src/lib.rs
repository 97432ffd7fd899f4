///
/// odbx - Statement and Cursor Execution Engine
///
/// This crate runs SQL statements against any driver implementing the
/// `odbx_driver::Driver` call-level interface. It includes:
///
/// - types: SQL type / C type / host type resolution and buffer sizing
/// - buffer, param, column: parameter and result buffers
/// - stream: chunked reads of columns too large to bind
/// - projection: compiled findall templates
/// - statement, cursor: the statement lifecycle and row iteration
/// - connection, registry: open connections and executing statements
/// - config: TOML engine configuration
///
/// Entry points:
/// - `Engine::connect`: open a connection
/// - `Engine::prepare` / `Engine::execute`: prepared statements
/// - `Engine::query`: one-shot statements
/// - `Engine::fetch`: explicit cursors
/// - `Engine::cancel`: abort what another thread is executing
///

pub mod buffer;
pub mod column;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod null;
pub mod options;
pub mod param;
pub mod projection;
mod registry;
mod report;
pub mod statement;
pub mod stream;
pub mod types;
pub mod value;

pub use config::{CatalogWidth, EngineConfig};
pub use connection::{ConnectionId, ConnectionRef};
pub use cursor::{Answer, Cursor};
pub use engine::{ConnectionEntry, Engine, Fetched};
pub use error::{OdbxError, Result};
pub use null::NullPolicy;
pub use options::{ConnectOptions, ConnectionInfo, ConnectionOption, FetchMode, OpenMode, StatementOptions};
pub use projection::FindallProgram;
pub use statement::{StatementId, Statistics};
pub use types::{Encoding, HostType, ParamSpec, SqlDecl};
pub use value::{Bindings, Row, Value, Var};
