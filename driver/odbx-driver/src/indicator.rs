///
/// Length/indicator values.
///
/// A length/indicator travels next to every value buffer. Non-negative
/// values are byte lengths; the negative sentinels below carry out-of-band
/// meaning.
///

pub type Len = isize;

/// The value is SQL NULL.
pub const NULL_DATA: Len = -1;

/// The value will be supplied with `put_data` during execution.
pub const DATA_AT_EXEC: Len = -2;

/// The driver cannot tell how many bytes remain.
pub const NO_TOTAL: Len = -4;

pub const LEN_DATA_AT_EXEC_OFFSET: Len = -100;

/// Indicator announcing a deferred parameter of (optional) total `length`.
pub const fn len_data_at_exec(length: Len) -> Len {
    LEN_DATA_AT_EXEC_OFFSET - length
}

/// True for both deferred-input encodings.
pub fn is_data_at_exec(ind: Len) -> bool {
    ind == DATA_AT_EXEC || ind <= LEN_DATA_AT_EXEC_OFFSET
}
