//! Incremental source: cursor-paginated walk over the works web API.
//!
//! Construction issues a probe query (one row, identifier-only projection) to
//! learn the total result count, used only for progress display. Pages are
//! then requested in ascending indexed-date order, each carrying the opaque
//! cursor returned by the previous page. A page with zero items ends the
//! stream; a page missing its expected structure aborts the whole sync.

use serde_json::Value;
use tracing::info;

use crate::api::{form_query, WorksApi, INITIAL_CURSOR, PAGE_ROWS};
use crate::error::{ApiError, Result};
use crate::source::ItemSource;

/// Item source over the paginated works API.
pub struct IncrementalSource<A: WorksApi> {
    api: A,
    from_date: String,
    filter_clause: Option<String>,
    cursor: String,
    total_pages: u64,
    done: bool,
    show_progress: bool,
}

impl<A: WorksApi> IncrementalSource<A> {
    /// Probe for the total result count and prepare the paged walk.
    pub fn new(
        mut api: A,
        from_date: String,
        filter_clause: Option<String>,
        show_progress: bool,
    ) -> Result<Self> {
        let probe = form_query(&from_date, filter_clause.as_deref(), 1, INITIAL_CURSOR, true);
        let message = api.fetch(&probe)?;

        let total_results = message.total_results.ok_or_else(|| {
            ApiError::MalformedResponse("probe response carries no total-results".into())
        })?;

        let total_pages = total_results.div_ceil(PAGE_ROWS);

        info!(
            total_results,
            total_pages,
            from_date = %from_date,
            filter = filter_clause.as_deref().unwrap_or("none"),
            "Items updated since the from date"
        );

        Ok(Self {
            api,
            from_date,
            filter_clause,
            cursor: INITIAL_CURSOR.to_string(),
            total_pages,
            done: false,
            show_progress,
        })
    }
}

impl<A: WorksApi> ItemSource for IncrementalSource<A> {
    fn estimate_total(&self) -> u64 {
        self.total_pages
    }

    fn unit(&self) -> &'static str {
        "pages"
    }

    fn show_progress(&self) -> bool {
        self.show_progress
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        let query = form_query(
            &self.from_date,
            self.filter_clause.as_deref(),
            PAGE_ROWS,
            &self.cursor,
            false,
        );

        let message = self.api.fetch(&query)?;

        if message.items.is_empty() {
            // the final page's cursor is discarded; the walk is over
            self.done = true;
            return Ok(None);
        }

        self.cursor = message.next_cursor.ok_or_else(|| {
            ApiError::MalformedResponse("page response carries no next-cursor".into())
        })?;

        Ok(Some(message.items))
    }
}
