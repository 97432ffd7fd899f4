///
/// Status of a driver call.
///
/// Mirrors the `SQLRETURN` codes. Only the two success variants carry the
/// call's output; `Error` names the failing function and the caller pulls
/// the details with `Driver::diagnostics()`.
///

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlResult<T> {
    Success(T),
    SuccessWithInfo(T),
    NoData,
    NeedData,
    StillExecuting,
    Error { function: &'static str },
}

impl<T> SqlResult<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SqlResult<U> {
        match self {
            SqlResult::Success(v) => SqlResult::Success(f(v)),
            SqlResult::SuccessWithInfo(v) => SqlResult::SuccessWithInfo(f(v)),
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::NeedData => SqlResult::NeedData,
            SqlResult::StillExecuting => SqlResult::StillExecuting,
            SqlResult::Error { function } => SqlResult::Error { function },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SqlResult::Success(_) | SqlResult::SuccessWithInfo(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SqlResult::Error { .. })
    }

    /// The output of a successful call.
    pub fn value(self) -> Option<T> {
        match self {
            SqlResult::Success(v) | SqlResult::SuccessWithInfo(v) => Some(v),
            _ => None,
        }
    }

    /// Keep the status, drop the payload.
    pub fn status(&self) -> SqlResult<()> {
        match self {
            SqlResult::Success(_) => SqlResult::Success(()),
            SqlResult::SuccessWithInfo(_) => SqlResult::SuccessWithInfo(()),
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::NeedData => SqlResult::NeedData,
            SqlResult::StillExecuting => SqlResult::StillExecuting,
            SqlResult::Error { function } => SqlResult::Error { function },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_status() {
        let r: SqlResult<i32> = SqlResult::SuccessWithInfo(2);
        assert_eq!(r.map(|v| v * 2), SqlResult::SuccessWithInfo(4));

        let r: SqlResult<i32> = SqlResult::Error { function: "SQLFetch" };
        assert_eq!(r.map(|v| v + 1), SqlResult::Error { function: "SQLFetch" });
        assert_eq!(SqlResult::<i32>::NoData.value(), None);
        assert!(SqlResult::Success(()).is_success());
    }
}
