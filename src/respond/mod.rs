//! Response module: routing captured utterances to an answer service
//!
//! - `classify`: question vs lookup heuristic
//! - `orchestrator`: fail-soft call into the chosen service
//! - `offline`: placeholder services for an unwired daemon

mod classify;
mod offline;
mod orchestrator;

pub use classify::Intent;
pub use offline::OfflineServices;
pub use orchestrator::{
    LookupService, QuestionAnswerer, Reply, ResponseOrchestrator, ServiceError, APOLOGY,
};
