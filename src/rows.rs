//! Streaming iteration over query results.
//!
//! Results are copied out of the database cursor when the iterator is built, so that
//! the pooled connection is released as soon as the query completes and no borrow of
//! it escapes to the caller. The assumption is that callers want a bounded number of
//! rows; bulk extraction would need a different interface.

use streaming_iterator::StreamingIterator;

use crate::row::TableRow;

pub struct TableRowIterator {
    remaining: std::vec::IntoIter<TableRow>,
    item: Option<TableRow>,
}

impl TableRowIterator {
    pub fn new(rows: Vec<TableRow>) -> TableRowIterator {
        TableRowIterator {
            remaining: rows.into_iter(),
            item: None,
        }
    }

    /// Rows not yet visited. Calling this before any `advance` returns the
    /// whole result set.
    pub fn into_vec(self) -> Vec<TableRow> {
        self.remaining.collect()
    }

    pub fn len(&self) -> usize {
        self.remaining.len() + usize::from(self.item.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StreamingIterator for TableRowIterator {
    type Item = TableRow;

    #[inline]
    fn advance(&mut self) {
        self.item = self.remaining.next();
    }

    #[inline]
    fn get(&self) -> Option<&Self::Item> {
        self.item.as_ref()
    }
}
