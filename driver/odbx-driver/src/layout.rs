///
/// Fixed-layout date/time structs.
///
/// These are the `DATE_STRUCT`, `TIME_STRUCT` and `SQL_TIMESTAMP_STRUCT`
/// layouts: native-endian fields, no padding (the timestamp's `fraction`
/// falls on a 4-byte boundary). Values cross the driver boundary as byte
/// slices, so each struct converts to and from its exact byte image.
///

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeStruct {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

/// `fraction` is in nanoseconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimestampStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([bytes[at], bytes[at + 1]])
}

impl DateStruct {
    pub const SIZE: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            year: u16_at(bytes, 0) as i16,
            month: u16_at(bytes, 2),
            day: u16_at(bytes, 4),
        })
    }
}

impl TimeStruct {
    pub const SIZE: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.hour.to_ne_bytes());
        out[2..4].copy_from_slice(&self.minute.to_ne_bytes());
        out[4..6].copy_from_slice(&self.second.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            hour: u16_at(bytes, 0),
            minute: u16_at(bytes, 2),
            second: u16_at(bytes, 4),
        })
    }
}

impl TimestampStruct {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
        out[6..8].copy_from_slice(&self.hour.to_ne_bytes());
        out[8..10].copy_from_slice(&self.minute.to_ne_bytes());
        out[10..12].copy_from_slice(&self.second.to_ne_bytes());
        out[12..16].copy_from_slice(&self.fraction.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            year: u16_at(bytes, 0) as i16,
            month: u16_at(bytes, 2),
            day: u16_at(bytes, 4),
            hour: u16_at(bytes, 6),
            minute: u16_at(bytes, 8),
            second: u16_at(bytes, 10),
            fraction: u32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }

    pub fn date(&self) -> DateStruct {
        DateStruct {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    pub fn time(&self) -> TimeStruct {
        TimeStruct {
            hour: self.hour,
            minute: self.minute,
            second: self.second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_match_c_layout() {
        assert_eq!(std::mem::size_of::<DateStruct>(), DateStruct::SIZE);
        assert_eq!(std::mem::size_of::<TimeStruct>(), TimeStruct::SIZE);
        assert_eq!(std::mem::size_of::<TimestampStruct>(), TimestampStruct::SIZE);
    }

    #[test]
    fn test_timestamp_byte_image() {
        let ts = TimestampStruct {
            year: -44,
            month: 3,
            day: 15,
            hour: 23,
            minute: 59,
            second: 58,
            fraction: 999_999_999,
        };
        let bytes = ts.to_bytes();
        assert_eq!(TimestampStruct::from_bytes(&bytes), Some(ts));
        assert_eq!(TimestampStruct::from_bytes(&bytes[..15]), None);
        assert_eq!(ts.date().day, 15);
        assert_eq!(ts.time().second, 58);
    }
}
