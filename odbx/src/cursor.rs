///
/// Answers of an executed statement.
///
/// A `Cursor` walks the result of one execution and yields `Answer`s:
///
/// - one `Answer::Row` per row, the last one flagged so callers know no
///   further row follows without another round trip
/// - a single `Answer::Affected` for statements without a result set
/// - a single `Answer::All` for statements with a findall template
///
/// The row after the one returned is always fetched ahead. Dropping the
/// cursor before the end closes the result set. A cursor belongs to one
/// execution: once its statement is closed and executed again, the old
/// cursor reports a context error and leaves the new result alone.
/// Cursors of statements in explicit fetch mode yield nothing; their rows
/// are pulled with `Engine::fetch`.
///

use std::sync::{Arc, Mutex};

use odbx_driver::FetchOrientation;

use crate::error::{OdbxError, Result};
use crate::registry::lock;
use crate::statement::{Flags, StatementContext, StatementId};
use crate::value::{Bindings, Row, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Row { row: Row, last: bool },
    Affected(i64),
    All(Vec<Value>),
}

impl Answer {
    /// `row(...)`, `affected(N)` or the list of findall instances as
    /// `[](...)`.
    pub fn to_value(&self) -> Value {
        match self {
            Answer::Row { row, .. } => row.to_value(),
            Answer::Affected(n) => Value::compound("affected", vec![Value::Int(*n)]),
            Answer::All(items) => Value::compound("[]", items.clone()),
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Answer::Row { row, .. } => Some(row),
            _ => None,
        }
    }
}

pub struct Cursor {
    ctx: Arc<Mutex<StatementContext>>,
    id: StatementId,
    generation: u64,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(ctx: Arc<Mutex<StatementContext>>) -> Self {
        let (id, generation, explicit) = {
            let guard = lock(&ctx);
            (guard.id(), guard.generation(), guard.flags().contains(Flags::NOAUTO))
        };
        Self {
            ctx,
            id,
            generation,
            done: explicit,
        }
    }

    pub fn statement(&self) -> StatementId {
        self.id
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Names of the result columns, describing the result if needed.
    pub fn column_names(&mut self) -> Result<Vec<String>> {
        let mut ctx = lock(&self.ctx);
        if !ctx.flags().contains(Flags::BOUND) {
            ctx.describe()?;
        }
        Ok(ctx.columns().iter().map(|c| c.name().to_string()).collect())
    }

    /// The next answer that unifies with `pattern`. Bindings made by
    /// answers that do not match are undone; a findall answer is returned
    /// without matching.
    pub fn next_matching(&mut self, pattern: &Value, bindings: &mut Bindings) -> Option<Result<Answer>> {
        loop {
            let answer = match self.next()? {
                Ok(answer) => answer,
                Err(err) => return Some(Err(err)),
            };
            if matches!(answer, Answer::All(_)) {
                return Some(Ok(answer));
            }
            let mark = bindings.mark();
            if pattern.unify_with(&answer.to_value(), bindings) {
                return Some(Ok(answer));
            }
            bindings.undo_to(mark);
        }
    }

    fn finish(&mut self, ctx: &mut StatementContext) {
        ctx.close();
        self.done = true;
    }

    fn advance(&mut self, ctx: &mut StatementContext) -> Result<Option<Answer>> {
        if !ctx.flags().contains(Flags::BOUND) {
            ctx.describe()?;
        }
        if !ctx.has_result() {
            let affected = ctx.affected()?;
            self.finish(ctx);
            return Ok(Some(Answer::Affected(affected)));
        }
        if ctx.is_no_data() {
            self.finish(ctx);
            return Ok(None);
        }
        if ctx.program().is_some() {
            let mut all = Vec::new();
            while ctx.fetch(FetchOrientation::Next)? {
                all.push(ctx.project()?);
            }
            self.finish(ctx);
            return Ok(Some(Answer::All(all)));
        }
        if !ctx.take_prefetched() && !ctx.fetch(FetchOrientation::Next)? {
            self.finish(ctx);
            return Ok(None);
        }
        let row = ctx.row()?;
        if ctx.fetch(FetchOrientation::Next)? {
            ctx.set_flag(Flags::PREFETCHED);
            Ok(Some(Answer::Row { row, last: false }))
        } else {
            self.finish(ctx);
            Ok(Some(Answer::Row { row, last: true }))
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Answer>;

    fn next(&mut self) -> Option<Result<Answer>> {
        if self.done {
            return None;
        }
        let shared = Arc::clone(&self.ctx);
        let mut ctx = lock(&shared);
        if ctx.generation() != self.generation {
            self.done = true;
            return Some(Err(OdbxError::context(
                "stale_cursor",
                format!("{} was executed again", self.id),
            )));
        }
        match self.advance(&mut ctx) {
            Ok(answer) => answer.map(Ok),
            Err(err) => {
                self.finish(&mut ctx);
                Some(Err(err))
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut ctx = lock(&self.ctx);
        if ctx.generation() == self.generation {
            ctx.close();
        }
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("statement", &self.id)
            .field("generation", &self.generation)
            .field("done", &self.done)
            .finish()
    }
}
