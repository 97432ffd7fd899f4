///
/// Process-wide registries.
///
/// Two independent service objects, each behind its own lock:
///
/// - `ConnectionRegistry`: open connections in creation order, looked up
///   by id, alias or DSN
/// - `ExecutingRegistry`: for each worker thread, the statement it is
///   currently blocked on inside the driver, so another thread can cancel
///   it
///
/// Neither lock is held across a driver call.
///

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use odbx_driver::{Driver, StmtHandle};
use tracing::{debug, trace};

use crate::connection::{Connection, ConnectionId, ConnectionRef};
use crate::error::{OdbxError, Result};
use crate::report::require;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<IndexMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn`; its alias must not be taken.
    pub fn insert(&self, conn: Arc<Connection>) -> Result<()> {
        let mut connections = lock(&self.connections);
        if let Some(alias) = conn.alias() {
            if connections.values().any(|c| c.alias().as_deref() == Some(alias.as_str())) {
                return Err(alias_in_use(&alias));
            }
        }
        connections.insert(conn.id(), conn);
        Ok(())
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        lock(&self.connections).shift_remove(&id)
    }

    pub fn get(&self, conn: &ConnectionRef) -> Result<Arc<Connection>> {
        let connections = lock(&self.connections);
        let found = match conn {
            ConnectionRef::Id(id) => connections.get(id).cloned(),
            ConnectionRef::Alias(alias) => connections
                .values()
                .find(|c| c.alias().as_deref() == Some(alias.as_str()))
                .cloned(),
        };
        found.ok_or_else(|| OdbxError::Existence {
            kind: "odbc_connection",
            name: conn.to_string(),
        })
    }

    /// The most recently opened connection to `dsn`.
    pub fn find_dsn(&self, dsn: &str) -> Option<Arc<Connection>> {
        lock(&self.connections).values().rev().find(|c| c.dsn() == dsn).cloned()
    }

    /// Give `conn` the alias `alias`. A connection keeps the alias it was
    /// given first, and an alias names one connection at most.
    pub fn assign_alias(&self, conn: &Connection, alias: &str) -> Result<()> {
        let connections = lock(&self.connections);
        match conn.alias() {
            Some(current) if current == alias => return Ok(()),
            Some(_) => {
                return Err(OdbxError::Permission {
                    action: "redefine",
                    kind: "connection_alias",
                    name: alias.to_string(),
                });
            }
            None => {}
        }
        if connections.values().any(|c| c.alias().as_deref() == Some(alias)) {
            return Err(alias_in_use(alias));
        }
        conn.set_alias(alias);
        debug!(connection = %conn.id(), alias, "alias assigned");
        Ok(())
    }

    /// Open connections in creation order.
    pub fn list(&self) -> Vec<Arc<Connection>> {
        lock(&self.connections).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn alias_in_use(alias: &str) -> OdbxError {
    OdbxError::Permission {
        action: "reuse",
        kind: "connection_alias",
        name: alias.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct ExecutingRegistry {
    executing: Mutex<HashMap<ThreadId, StmtHandle>>,
}

/// Marks the current thread as executing a statement until dropped.
#[must_use]
pub struct Executing<'a> {
    registry: &'a ExecutingRegistry,
    thread: ThreadId,
}

impl ExecutingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, stmt: StmtHandle) -> Executing<'_> {
        let thread = thread::current().id();
        lock(&self.executing).insert(thread, stmt);
        trace!(?thread, %stmt, "executing");
        Executing { registry: self, thread }
    }

    pub fn executing(&self, thread: ThreadId) -> Option<StmtHandle> {
        lock(&self.executing).get(&thread).copied()
    }

    /// Ask the driver to abort what `thread` is executing. `false` if the
    /// thread is not inside a driver call. The mark cannot be cleared while
    /// the driver is being asked.
    pub fn cancel(&self, driver: &dyn Driver, thread: ThreadId) -> Result<bool> {
        let executing = lock(&self.executing);
        let Some(&stmt) = executing.get(&thread) else {
            return Ok(false);
        };
        debug!(?thread, %stmt, "cancelling");
        require(driver, stmt.into(), true, driver.cancel(stmt))?;
        drop(executing);
        Ok(true)
    }
}

impl Drop for Executing<'_> {
    fn drop(&mut self) {
        lock(&self.registry.executing).remove(&self.thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Settings;
    use crate::null::NullPolicy;
    use crate::types::Encoding;
    use odbx_driver::{ConnHandle, ConnectRequest, FreeStmt};
    use odbx_driver_sqlite::SqliteDriver;
    use std::sync::mpsc;

    fn conn(id: u64, dsn: &str, alias: Option<&str>) -> Arc<Connection> {
        let settings = Settings {
            encoding: Encoding::Utf8,
            null: Arc::new(NullPolicy::default()),
            silent: false,
            wide_column_threshold: 1024,
        };
        Arc::new(Connection::new(
            ConnectionId(id),
            ConnHandle(id),
            dsn,
            alias.map(str::to_string),
            settings,
        ))
    }

    #[test]
    fn test_lookup_by_id_alias_and_dsn() {
        let registry = ConnectionRegistry::new();
        registry.insert(conn(1, "a.db", None)).unwrap();
        registry.insert(conn(2, "b.db", Some("b"))).unwrap();
        registry.insert(conn(3, "a.db", None)).unwrap();

        assert_eq!(registry.get(&ConnectionId(1).into()).unwrap().dsn(), "a.db");
        assert_eq!(registry.get(&"b".into()).unwrap().id(), ConnectionId(2));
        assert_eq!(registry.find_dsn("a.db").unwrap().id(), ConnectionId(3));
        assert!(matches!(
            registry.get(&"missing".into()),
            Err(OdbxError::Existence { kind: "odbc_connection", .. })
        ));

        registry.remove(ConnectionId(2));
        let ids: Vec<_> = registry.list().iter().map(|c| c.id().0).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_alias_rules() {
        let registry = ConnectionRegistry::new();
        let first = conn(1, "a.db", None);
        let second = conn(2, "b.db", Some("b"));
        registry.insert(Arc::clone(&first)).unwrap();
        registry.insert(Arc::clone(&second)).unwrap();

        assert!(matches!(
            registry.insert(conn(3, "c.db", Some("b"))),
            Err(OdbxError::Permission { action: "reuse", .. })
        ));
        assert!(matches!(
            registry.assign_alias(&first, "b"),
            Err(OdbxError::Permission { action: "reuse", .. })
        ));
        registry.assign_alias(&first, "a").unwrap();
        registry.assign_alias(&first, "a").unwrap();
        assert!(matches!(
            registry.assign_alias(&first, "other"),
            Err(OdbxError::Permission { action: "redefine", .. })
        ));
    }

    #[test]
    fn test_executing_mark_is_scoped() {
        let registry = ExecutingRegistry::new();
        let me = thread::current().id();
        {
            let _guard = registry.enter(StmtHandle(7));
            assert_eq!(registry.executing(me), Some(StmtHandle(7)));
        }
        assert_eq!(registry.executing(me), None);
        let driver = SqliteDriver::default();
        assert!(!registry.cancel(&driver, me).unwrap());
    }

    #[test]
    fn test_cancel_only_reaches_the_marked_statement() {
        let driver = SqliteDriver::default();
        let conn = driver.connect(&ConnectRequest::new(":memory:")).value().unwrap();
        let stmt = driver.alloc_statement(conn).value().unwrap();
        let registry = &ExecutingRegistry::new();
        let (marked_tx, marked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        thread::scope(|s| {
            let worker = s.spawn(move || {
                let _guard = registry.enter(stmt);
                marked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
            let id = worker.thread().id();
            marked_rx.recv().unwrap();
            assert!(registry.cancel(&driver, id).unwrap());
            release_tx.send(()).unwrap();
            worker.join().unwrap();
            assert!(!registry.cancel(&driver, id).unwrap());
        });

        // Marks coming and going while another thread cancels.
        thread::scope(|s| {
            let worker = s.spawn(move || {
                for _ in 0..500 {
                    let _guard = registry.enter(stmt);
                }
            });
            let id = worker.thread().id();
            while !worker.is_finished() {
                registry.cancel(&driver, id).unwrap();
            }
            assert!(!registry.cancel(&driver, id).unwrap());
        });
        assert!(driver.free_statement(stmt, FreeStmt::Drop).value().is_some());
    }
}
