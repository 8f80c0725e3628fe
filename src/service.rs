//! Orchestration services
//!
//! Services tie the store, the pure state machines, the audit trail
//! and the collaborator boundaries together. External calls are always
//! issued outside store transactions; their results land in short
//! follow-up updates.

pub mod actions;
pub mod conversations;

pub use actions::ActionService;
pub use conversations::ConversationService;
