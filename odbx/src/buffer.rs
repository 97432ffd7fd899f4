///
/// Value buffers.
///
/// A `ValueBuffer` is the storage behind one parameter or result column:
/// a byte buffer of fixed capacity plus the length/indicator the driver
/// reports next to it. Up to `INLINE_BUFFER_SIZE` bytes live inline; larger
/// buffers spill to the heap through a fallible reservation.
///
/// Typed views read and write the fixed-layout C images (integers, doubles,
/// date/time/timestamp structs) so no caller does offset arithmetic.
///

use odbx_driver::{BoundColumn, DateStruct, Len, NULL_DATA, TimeStruct, TimestampStruct};
use smallvec::SmallVec;

use crate::error::{OdbxError, Result};
use crate::types::INLINE_BUFFER_SIZE;

#[derive(Debug, Clone)]
pub struct ValueBuffer {
    data: SmallVec<[u8; INLINE_BUFFER_SIZE]>,
    indicator: Len,
}

impl ValueBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = SmallVec::new();
        data.try_reserve(capacity)
            .map_err(|_| OdbxError::Resource("memory"))?;
        data.resize(capacity, 0);
        Ok(Self { data, indicator: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_inline(&self) -> bool {
        !self.data.spilled()
    }

    pub fn indicator(&self) -> Len {
        self.indicator
    }

    pub fn set_indicator(&mut self, indicator: Len) {
        self.indicator = indicator;
    }

    pub fn set_null(&mut self) {
        self.indicator = NULL_DATA;
    }

    pub fn is_null(&self) -> bool {
        self.indicator == NULL_DATA
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The buffer handed to the driver for one fetch.
    pub fn bind(&mut self, column: u16) -> BoundColumn<'_> {
        BoundColumn {
            column,
            data: &mut self.data,
            indicator: &mut self.indicator,
        }
    }

    /// Payload of variable-length data, cut to what fits in front of a
    /// `pad`-byte terminator.
    pub fn bytes(&self, pad: usize) -> &[u8] {
        let room = self.data.len().saturating_sub(pad);
        let len = usize::try_from(self.indicator).map_or(0, |n| n.min(room));
        &self.data[..len]
    }

    /// Store variable-length data followed by a `pad`-byte terminator.
    /// The caller checks the length against the capacity first.
    pub fn put_bytes(&mut self, bytes: &[u8], pad: usize) -> Result<()> {
        let end = bytes.len() + pad;
        if end > self.data.len() {
            return Err(OdbxError::Representation("column_width"));
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.data[bytes.len()..end].fill(0);
        self.indicator = bytes.len() as Len;
        Ok(())
    }

    fn put_fixed(&mut self, image: &[u8]) -> Result<()> {
        let slot = self
            .data
            .get_mut(..image.len())
            .ok_or(OdbxError::Representation("column_width"))?;
        slot.copy_from_slice(image);
        self.indicator = image.len() as Len;
        Ok(())
    }

    fn fixed<const N: usize>(&self) -> Option<[u8; N]> {
        self.data.get(..N).and_then(|b| b.try_into().ok())
    }

    pub fn i32(&self) -> Option<i32> {
        self.fixed::<4>().map(i32::from_ne_bytes)
    }

    pub fn i64(&self) -> Option<i64> {
        self.fixed::<8>().map(i64::from_ne_bytes)
    }

    pub fn f64(&self) -> Option<f64> {
        self.fixed::<8>().map(f64::from_ne_bytes)
    }

    pub fn date(&self) -> Option<DateStruct> {
        DateStruct::from_bytes(&self.data)
    }

    pub fn time(&self) -> Option<TimeStruct> {
        TimeStruct::from_bytes(&self.data)
    }

    pub fn timestamp(&self) -> Option<TimestampStruct> {
        TimestampStruct::from_bytes(&self.data)
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.put_fixed(&v.to_ne_bytes())
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        self.put_fixed(&v.to_ne_bytes())
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        self.put_fixed(&v.to_ne_bytes())
    }

    pub fn put_date(&mut self, d: &DateStruct) -> Result<()> {
        self.put_fixed(&d.to_bytes())
    }

    pub fn put_time(&mut self, t: &TimeStruct) -> Result<()> {
        self.put_fixed(&t.to_bytes())
    }

    pub fn put_timestamp(&mut self, ts: &TimestampStruct) -> Result<()> {
        self.put_fixed(&ts.to_bytes())
    }
}
