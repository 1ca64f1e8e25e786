use crate::error::{Result, ReviewError};
use crate::models::{CategoryFilter, Label};
use crate::store::ReviewStore;
use tracing::debug;

/// Snapshot of the known labels and their parent groupings
#[derive(Debug, Clone, Default)]
pub struct LabelCatalog {
    labels: Vec<Label>,
}

impl LabelCatalog {
    pub fn new(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    /// Load the catalog from the datastore
    pub async fn load(store: &dyn ReviewStore) -> Result<Self> {
        let labels = store.fetch_labels().await?;
        debug!(label_count = labels.len(), "Label catalog loaded");
        Ok(Self::new(labels))
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Display name of a label, if known
    pub fn name_of(&self, label_id: i32) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.id == label_id)
            .map(|l| l.name.as_str())
    }

    /// Labels directly under `parent`; `None` selects the root labels
    pub fn children_of(&self, parent: Option<i32>) -> Vec<Label> {
        self.labels
            .iter()
            .filter(|l| l.parent == parent)
            .cloned()
            .collect()
    }

    /// Category names offered to the reviewer: the sentinel first, then the
    /// children of the category group label
    pub fn category_options(&self, category_parent: i32, all_categories: &str) -> Vec<String> {
        std::iter::once(all_categories.to_string())
            .chain(
                self.children_of(Some(category_parent))
                    .into_iter()
                    .map(|l| l.name),
            )
            .collect()
    }

    /// Resolve a category name to a filter
    ///
    /// The sentinel disables filtering. Any other name must match exactly one
    /// label.
    pub fn resolve_category(&self, name: &str, all_categories: &str) -> Result<CategoryFilter> {
        if name == all_categories {
            return Ok(CategoryFilter::All);
        }

        let mut matches = self.labels.iter().filter(|l| l.name == name);
        match (matches.next(), matches.next()) {
            (Some(label), None) => Ok(CategoryFilter::Label {
                name: label.name.clone(),
                label_id: label.id,
            }),
            (None, _) => Err(ReviewError::InvalidFilterCriteria(format!(
                "unknown category: {name}"
            ))),
            (Some(_), Some(_)) => Err(ReviewError::InvalidFilterCriteria(format!(
                "category name is ambiguous: {name}"
            ))),
        }
    }
}
