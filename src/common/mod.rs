pub mod events;
pub mod types;

pub use events::InsertEvent;
pub use types::{ChatMessage, NewMessage, RecordId, UserProfile};
