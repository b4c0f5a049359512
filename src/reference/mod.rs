pub mod api_types;
pub mod client;
pub mod types;

pub use client::AdminApiClient;
pub use types::{active_only, Language, ReferenceItem, ReferenceKind, Role};
