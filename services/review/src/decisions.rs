use crate::annotations::AnnotationStore;
use crate::error::{Result, ReviewError};
use crate::models::{ImageStatus, LabelValue};
use crate::store::ReviewStore;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Decision submission as sent by the reviewer client
///
/// Every field is kept as raw JSON so that missing or mistyped values surface
/// as `MalformedDecisionPayload` instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    pub image_id: Option<Value>,
    pub direction: Option<Value>,
    /// Array of `{id, value}` objects; `value` is `true`/`false` or `1`/`0`
    pub labels: Option<Value>,
}

/// A validated reviewer decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept { image_id: i64 },
    Reject { image_id: i64, labels: Vec<LabelValue> },
}

impl Decision {
    pub fn image_id(&self) -> i64 {
        match self {
            Decision::Accept { image_id } | Decision::Reject { image_id, .. } => *image_id,
        }
    }
}

fn malformed(reason: impl Into<String>) -> ReviewError {
    ReviewError::MalformedDecisionPayload(reason.into())
}

impl TryFrom<DecisionPayload> for Decision {
    type Error = ReviewError;

    /// `right` accepts; any other direction string rejects
    fn try_from(payload: DecisionPayload) -> Result<Self> {
        let image_id = payload
            .image_id
            .as_ref()
            .ok_or_else(|| malformed("missing imageId"))?
            .as_i64()
            .ok_or_else(|| malformed("imageId is not an integer"))?;

        let direction = payload
            .direction
            .as_ref()
            .ok_or_else(|| malformed("missing direction"))?
            .as_str()
            .ok_or_else(|| malformed("direction is not a string"))?;

        // validated for both directions
        let labels = parse_labels(payload.labels)?;

        if direction == "right" {
            Ok(Decision::Accept { image_id })
        } else {
            Ok(Decision::Reject { image_id, labels })
        }
    }
}

fn parse_labels(labels: Option<Value>) -> Result<Vec<LabelValue>> {
    let entries = match labels {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(malformed("labels is not an array")),
    };

    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(entries.len());

    for entry in &entries {
        let entry = entry
            .as_object()
            .ok_or_else(|| malformed("label entry is not an object"))?;
        let label_id = entry
            .get("id")
            .ok_or_else(|| malformed("label without id"))?
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| malformed("label id is not an integer"))?;
        let value = entry
            .get("value")
            .and_then(label_flag)
            .ok_or_else(|| malformed(format!("label {label_id} has no boolean value")))?;
        if !seen.insert(label_id) {
            return Err(malformed(format!("label {label_id} given twice")));
        }
        parsed.push(LabelValue::new(label_id, value));
    }

    Ok(parsed)
}

fn label_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Applies reviewer decisions to image status and manual annotations
///
/// Transitions are `todo -> accepted` and `todo -> rejected`. Re-applying a
/// decision yields the same stored state; concurrent conflicting decisions
/// are not guarded against.
#[derive(Clone)]
pub struct ReviewStateMachine {
    store: Arc<dyn ReviewStore>,
    annotations: AnnotationStore,
}

impl ReviewStateMachine {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        let annotations = AnnotationStore::new(store.clone());
        Self { store, annotations }
    }

    /// Mark an image accepted; annotations are left alone
    #[instrument(skip(self))]
    pub async fn accept(&self, image_id: i64) -> Result<()> {
        self.store
            .update_image_status(image_id, ImageStatus::Accepted)
            .await
    }

    /// Mark an image rejected and, when labels are given, replace its manual
    /// annotations with them
    ///
    /// An empty label list keeps whatever manual annotations the image had.
    /// Annotations are written first, so a failed replacement leaves the
    /// status untouched.
    #[instrument(skip(self, labels), fields(label_count = labels.len()))]
    pub async fn reject(&self, image_id: i64, labels: &[LabelValue]) -> Result<()> {
        if !labels.is_empty() {
            self.annotations
                .set_manual_annotations(image_id, labels)
                .await?;
        }

        self.store
            .update_image_status(image_id, ImageStatus::Rejected)
            .await
    }

    pub async fn apply(&self, decision: &Decision) -> Result<()> {
        match decision {
            Decision::Accept { image_id } => self.accept(*image_id).await?,
            Decision::Reject { image_id, labels } => self.reject(*image_id, labels).await?,
        }

        info!(
            image_id = decision.image_id(),
            decision = ?decision,
            "Review decision recorded"
        );
        metrics::counter!("review.decisions.recorded").increment(1);

        Ok(())
    }
}
