///
/// odbx-driver - Native SQL Driver Interface
///
/// This crate describes the driver the odbx engine sits on top of. The
/// contract follows the classic call-level interface of ODBC:
///
/// - Every object lives behind an opaque handle (`ConnHandle`, `StmtHandle`)
/// - Every call is synchronous and returns a status (`SqlResult<T>`)
/// - Failures carry no payload; details are pulled with `Driver::diagnostics()`
/// - Column values are either written into bound buffers on fetch, or pulled
///   on demand with `Driver::get_data()` in chunks
///
/// The crate also defines the binary layouts both sides agree on: SQL type
/// ids, C buffer type ids, the date/time/timestamp structs and the
/// length/indicator sentinels.
///

pub mod diag;
pub mod driver;
pub mod handle;
pub mod indicator;
pub mod layout;
pub mod result;
pub mod types;

pub use diag::*;
pub use driver::*;
pub use handle::*;
pub use indicator::*;
pub use layout::*;
pub use result::*;
pub use types::*;
