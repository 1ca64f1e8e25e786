use crate::error::Result;
use crate::fetcher::RowFetcher;
use crate::models::{CategoryFilter, Image};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Outcome of advancing a review cursor
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(Image),
    /// No more images match the session's filters
    Exhausted,
}

/// Forward-only cursor over the review queue
///
/// Pages of `page_size` rows are buffered in memory and refetched at the
/// current offset once drained. The offset counts consumed rows, so it is
/// independent of page boundaries. An empty page ends the cursor for good.
pub struct ReviewCursor {
    fetcher: RowFetcher,
    start_date: DateTime<Utc>,
    category: CategoryFilter,
    page_size: i64,
    offset: i64,
    last_id: Option<i64>,
    buffer: VecDeque<Image>,
    exhausted: bool,
}

impl ReviewCursor {
    pub fn new(
        fetcher: RowFetcher,
        start_date: DateTime<Utc>,
        category: CategoryFilter,
        page_size: i64,
    ) -> Self {
        Self {
            fetcher,
            start_date,
            category,
            page_size,
            offset: 0,
            last_id: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn category(&self) -> &CategoryFilter {
        &self.category
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Yield the next image, fetching a new page when the buffer is empty
    ///
    /// On error the cursor is left as it was and the same offset is retried on
    /// the next call.
    #[instrument(skip(self), fields(offset = self.offset))]
    pub async fn try_advance(&mut self) -> Result<Advance> {
        loop {
            if self.exhausted {
                return Ok(Advance::Exhausted);
            }

            if self.buffer.is_empty() {
                let page = self
                    .fetcher
                    .fetch(self.offset, self.page_size, self.start_date, &self.category)
                    .await?;

                if page.is_empty() {
                    debug!(offset = self.offset, "Review queue exhausted");
                    self.exhausted = true;
                    return Ok(Advance::Exhausted);
                }
                self.buffer.extend(page);
            }

            while let Some(image) = self.buffer.pop_front() {
                self.offset += 1;

                // Rows shift when an earlier image joins the filtered set mid-session
                if matches!(self.last_id, Some(last) if image.id <= last) {
                    debug!(image_id = image.id, "Skipping already reviewed image");
                    continue;
                }

                self.last_id = Some(image.id);
                return Ok(Advance::Next(image));
            }
        }
    }
}
