///
/// Driver status reporting.
///
/// Every driver call goes through `report`: success-with-info is logged as
/// a notice and treated as success, errors become `OdbxError::Driver`
/// built from the first diagnostic record of the handle, `NoData` and
/// `NeedData` are passed through for the caller to interpret.
///

use odbx_driver::{DiagHandle, Driver, SqlResult};
use tracing::info;

use crate::error::{OdbxError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reported<T> {
    Done(T),
    NoData,
    NeedData,
}

pub(crate) fn report<T>(
    driver: &dyn Driver,
    handle: DiagHandle,
    silent: bool,
    rc: SqlResult<T>,
) -> Result<Reported<T>> {
    match rc {
        SqlResult::Success(v) => Ok(Reported::Done(v)),
        SqlResult::SuccessWithInfo(v) => {
            if !silent {
                log_notices(driver, handle);
            }
            Ok(Reported::Done(v))
        }
        SqlResult::NoData => Ok(Reported::NoData),
        SqlResult::NeedData => Ok(Reported::NeedData),
        SqlResult::StillExecuting => Err(OdbxError::context("still_executing", "asynchronous execution")),
        SqlResult::Error { function } => Err(driver_error(driver, handle, function)),
    }
}

pub(crate) fn log_notices(driver: &dyn Driver, handle: DiagHandle) {
    for rec in driver.diagnostics(handle) {
        info!(target: "odbx::notice", state = %rec.state, native = rec.native, "{}", rec.message);
    }
}

/// Like `report`, for calls that have no business returning anything but
/// success.
pub(crate) fn require<T>(driver: &dyn Driver, handle: DiagHandle, silent: bool, rc: SqlResult<T>) -> Result<T> {
    match report(driver, handle, silent, rc)? {
        Reported::Done(v) => Ok(v),
        Reported::NoData => Err(OdbxError::context("no_data", "unexpected end of data")),
        Reported::NeedData => Err(OdbxError::context("need_data", "unexpected request for data")),
    }
}

pub(crate) fn driver_error(driver: &dyn Driver, handle: DiagHandle, function: &'static str) -> OdbxError {
    match driver.diagnostics(handle).into_iter().next() {
        Some(rec) => OdbxError::Driver {
            state: rec.state,
            native: rec.native,
            message: rec.message,
        },
        None => OdbxError::Driver {
            state: "HY000".to_string(),
            native: 0,
            message: format!("{function} failed"),
        },
    }
}
