//! Single-item embedding handler.
//!
//! Re-embeds one note, insight, or source on demand, typically after an
//! edit or after the default embedding model changed. The actual embedding
//! and persistence rules live in [`AutoEmbedder`]; this handler only
//! dispatches on the item type and shapes the job result.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::embedding::AutoEmbedder;
use crate::handler::{JobContext, JobHandler, JobOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ItemType {
    Note,
    Insight,
    Source,
}

impl ItemType {
    fn as_str(self) -> &'static str {
        match self {
            ItemType::Note => "note",
            ItemType::Insight => "insight",
            ItemType::Source => "source",
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedItemArgs {
    item_type: ItemType,
    item_id: Uuid,
}

/// Handler for the `embed_item` command.
pub struct EmbedItemHandler {
    auto: Arc<AutoEmbedder>,
}

impl EmbedItemHandler {
    pub fn new(auto: Arc<AutoEmbedder>) -> Self {
        Self { auto }
    }

    fn success(item_type: ItemType, id: Uuid, embedded: bool) -> JobOutcome {
        JobOutcome::Success(json!({
            "success": true,
            "item_type": item_type.as_str(),
            "item_id": id,
            "embedded": embedded,
        }))
    }
}

#[async_trait]
impl JobHandler for EmbedItemHandler {
    fn command_name(&self) -> &'static str {
        "embed_item"
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let args: EmbedItemArgs = match ctx.parse_args() {
            Ok(args) => args,
            Err(e) => return JobOutcome::from_error(&e),
        };

        match args.item_type {
            ItemType::Note => match self.auto.embed_note(args.item_id).await {
                Ok(embedded) => Self::success(args.item_type, args.item_id, embedded),
                Err(e) => JobOutcome::from_error(&e),
            },
            ItemType::Insight => match self.auto.embed_insight(args.item_id).await {
                Ok(embedded) => Self::success(args.item_type, args.item_id, embedded),
                Err(e) => JobOutcome::from_error(&e),
            },
            ItemType::Source => match self.auto.vectorize_source(args.item_id).await {
                Ok(chunk_count) => JobOutcome::Success(json!({
                    "success": true,
                    "item_type": "source",
                    "item_id": args.item_id,
                    "embedded": chunk_count > 0,
                    "chunk_count": chunk_count,
                })),
                Err(e) => JobOutcome::from_error(&e),
            },
        }
    }
}
