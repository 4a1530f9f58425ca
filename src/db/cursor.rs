use rusqlite::types::Value;

use crate::error::Result;
use crate::model::TripleRef;

use super::connection::Connection;

/// Forward-only, read-only lazy sequence of triples matching a pattern.
///
/// Staged triples are yielded first; backend rows follow in fixed-size
/// keyset-paginated pages, each page converted with one batched
/// node-resolution pass. Dropping the cursor early simply stops fetching.
pub struct TripleCursor<'c> {
    conn: &'c Connection,
    staged: std::vec::IntoIter<TripleRef>,
    sql: String,
    params: Vec<Value>,
    page: std::vec::IntoIter<TripleRef>,
    last_id: i64,
    page_size: usize,
    backend_done: bool,
}

impl<'c> TripleCursor<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        staged: Vec<TripleRef>,
        sql: String,
        params: Vec<Value>,
        page_size: usize,
        unmatchable: bool,
    ) -> TripleCursor<'c> {
        TripleCursor {
            conn,
            staged: staged.into_iter(),
            sql,
            params,
            page: Vec::new().into_iter(),
            last_id: -1,
            page_size: page_size.max(1),
            // A pattern bound to an unpersisted node cannot match any row.
            backend_done: unmatchable,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self.conn.fetch_triple_page(
            &self.sql,
            &self.params,
            self.last_id,
            self.page_size,
        )?;
        if page.len() < self.page_size {
            self.backend_done = true;
        }
        if let Some(last) = page.last() {
            self.last_id = last.id();
        }
        self.page = page.into_iter();
        Ok(())
    }
}

impl Iterator for TripleCursor<'_> {
    type Item = Result<TripleRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(triple) = self.staged.next() {
            return Some(Ok(triple));
        }
        loop {
            if let Some(triple) = self.page.next() {
                return Some(Ok(triple));
            }
            if self.backend_done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.backend_done = true;
                return Some(Err(err));
            }
        }
    }
}
