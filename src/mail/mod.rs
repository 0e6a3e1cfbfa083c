//! Mail access layer: provider trait, Gmail backend, content
//! normalization, and thread assembly.

pub mod gmail;
pub mod normalize;
pub mod thread;
pub mod traits;
pub mod types;

pub use gmail::GmailClient;
pub use thread::{AssembledThread, ThreadScenario, assemble};
pub use traits::MailProvider;
pub use types::{ContentType, Message, MessageStub, NormalizedMessage};
