//! Chat turn orchestration.
//!
//! A turn is validated ([`TurnRequest`]), its user message stored and its
//! prompt assembled ([`ChatOrchestrator::begin_turn`]), then the generation
//! stream is relayed as [`StreamEvent`]s and the reply stored
//! ([`ChatOrchestrator::stream_turn`]).

pub mod events;
pub mod orchestrator;
pub mod request;

pub use events::StreamEvent;
pub use orchestrator::{
    ChatBackends, ChatOrchestrator, PreparedTurn, StreamExit, TurnError, TurnOutcome, TurnPhase,
};
pub use request::{TranscriptEntry, TurnRequest};
