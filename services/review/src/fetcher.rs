use crate::error::{Result, ReviewError};
use crate::models::{CategoryFilter, Image};
use crate::store::ReviewStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

/// One range query over the image dataset
///
/// Rows are ordered by image id and restricted to `created_time > start_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub offset: i64,
    pub page_size: i64,
    pub start_date: DateTime<Utc>,
    pub category: CategoryFilter,
}

impl PageRequest {
    pub fn new(
        offset: i64,
        page_size: i64,
        start_date: DateTime<Utc>,
        category: CategoryFilter,
    ) -> Result<Self> {
        if offset < 0 {
            return Err(ReviewError::InvalidFilterCriteria(format!(
                "offset must be non-negative, got {offset}"
            )));
        }
        if page_size <= 0 {
            return Err(ReviewError::InvalidFilterCriteria(format!(
                "page size must be positive, got {page_size}"
            )));
        }

        Ok(Self {
            offset,
            page_size,
            start_date,
            category,
        })
    }
}

/// Executes paged reads of the review queue
///
/// An empty page is the only end-of-data signal.
#[derive(Clone)]
pub struct RowFetcher {
    store: Arc<dyn ReviewStore>,
}

impl RowFetcher {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, category), fields(label_id = ?category.label_id()))]
    pub async fn fetch(
        &self,
        offset: i64,
        page_size: i64,
        start_date: DateTime<Utc>,
        category: &CategoryFilter,
    ) -> Result<Vec<Image>> {
        let page = PageRequest::new(offset, page_size, start_date, category.clone())?;
        let rows = self.store.fetch_images(&page).await?;

        debug!(rows = rows.len(), "Fetched image page");

        Ok(rows)
    }
}
