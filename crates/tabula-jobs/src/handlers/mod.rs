//! Built-in command handlers.

mod embed_item;
mod generate_podcast;
mod process_source;
mod rebuild_embeddings;

pub use embed_item::EmbedItemHandler;
pub use generate_podcast::GeneratePodcastHandler;
pub use process_source::ProcessSourceHandler;
pub use rebuild_embeddings::RebuildEmbeddingsHandler;

/// Command names served by the built-in handlers, for wiring a
/// `CommandService` that accepts exactly this set.
pub fn builtin_commands() -> Vec<String> {
    ["process_source", "embed_item", "rebuild_embeddings", "generate_podcast"]
        .map(String::from)
        .to_vec()
}
