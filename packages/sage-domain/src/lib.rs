pub mod citations;
pub mod evidence;
pub mod input_gate;
pub mod query_gate;
pub mod state;
pub mod time_serde;

pub use evidence::{
	DocumentChunk, DocumentContext, DocumentReference, GlossaryTerm, Role, SearchRecord,
	ThinkingKind, ThinkingStep, TurnMessage, WebSource,
};
pub use state::{NextAction, Stage, StateUpdate, TurnState};
