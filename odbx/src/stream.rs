///
/// Chunked reader for oversized columns.
///
/// Columns that were not bound (size unknown or above the wide-column
/// threshold) are pulled piece by piece after each fetch. The first read
/// goes into a small stack buffer. If the driver says more is coming it
/// either reports the total, in which case one exact allocation receives
/// the rest in place, or `NO_TOTAL`, in which case the buffer grows by
/// doubling until the driver reports completion.
///
/// Every read reserves `pad` terminator bytes at the end of the buffer it
/// is given; the next read writes over them.
///

use odbx_driver::{CType, Driver, Len, NULL_DATA, SqlResult, StmtHandle};
use tracing::trace;

use crate::error::{OdbxError, Result};
use crate::report::driver_error;

/// Size of the first read.
pub const FIRST_READ: usize = 256;

/// First heap buffer size when the total is unknown.
pub const GROWTH_START: usize = 2048;

/// Outcome of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// The last piece, `len` payload bytes.
    Complete { len: usize },
    /// The buffer was filled; `indicator` is what remained before this
    /// read, or `NO_TOTAL`.
    More { indicator: Len },
    Null,
    /// The previous piece was the last one.
    NoData,
}

pub trait ChunkSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<Chunk>;
}

/// `get_data` on one column of the current row.
pub struct GetDataSource<'a> {
    pub driver: &'a dyn Driver,
    pub stmt: StmtHandle,
    pub column: u16,
    pub c_type: CType,
}

impl ChunkSource for GetDataSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<Chunk> {
        let room = buf.len().saturating_sub(self.c_type.terminator_width());
        match self.driver.get_data(self.stmt, self.column, self.c_type, buf) {
            SqlResult::Success(NULL_DATA) | SqlResult::SuccessWithInfo(NULL_DATA) => Ok(Chunk::Null),
            SqlResult::Success(len) => Ok(Chunk::Complete {
                len: usize::try_from(len).map_or(0, |n| n.min(room)),
            }),
            SqlResult::SuccessWithInfo(indicator) => Ok(Chunk::More { indicator }),
            SqlResult::NoData => Ok(Chunk::NoData),
            SqlResult::Error { function } => Err(driver_error(self.driver, self.stmt.into(), function)),
            other => Err(OdbxError::context("get_data", format!("unexpected status {:?}", other.status()))),
        }
    }
}

fn grow(data: &mut Vec<u8>, size: usize) -> Result<()> {
    if size > data.len() {
        data.try_reserve_exact(size - data.len())
            .map_err(|_| OdbxError::Resource("memory"))?;
        data.resize(size, 0);
    }
    Ok(())
}

/// Read a complete value; `None` is SQL NULL.
pub fn read_value(source: &mut dyn ChunkSource, pad: usize) -> Result<Option<Vec<u8>>> {
    let mut first = [0u8; FIRST_READ];
    let indicator = match source.read(&mut first)? {
        Chunk::Null => return Ok(None),
        Chunk::Complete { len } => return Ok(Some(first[..len].to_vec())),
        Chunk::NoData => return Ok(Some(Vec::new())),
        Chunk::More { indicator } => indicator,
    };
    let mut filled = FIRST_READ - pad;
    let mut size = match usize::try_from(indicator) {
        Ok(total) => total + pad,
        Err(_) => GROWTH_START,
    };
    trace!(indicator, size, "reading oversized value");

    let mut data = Vec::new();
    grow(&mut data, size.max(filled + pad + 1))?;
    data[..filled].copy_from_slice(&first[..filled]);
    let mut part = 2;
    loop {
        size = data.len();
        match source.read(&mut data[filled..])? {
            Chunk::Complete { len } => {
                filled += len;
                break;
            }
            Chunk::NoData => break,
            Chunk::More { indicator } => {
                let before = filled;
                filled = size - pad;
                let next = match usize::try_from(indicator) {
                    Ok(remaining) => before + remaining + pad,
                    _ => size * 2,
                };
                trace!(part, filled, next, "partial read");
                grow(&mut data, next.max(filled + pad + 1))?;
            }
            Chunk::Null => return Err(OdbxError::context("get_data", "NULL after partial value")),
        }
        part += 1;
    }
    data.truncate(filled);
    trace!(part, len = filled, "read complete");
    Ok(Some(data))
}
