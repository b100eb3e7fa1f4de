/// Audio service orchestration
///
/// Wires turn coordination into the capture / recognition / synthesis
/// collaborators, and provides a resilient wrapper that degrades to
/// text interaction when voice I/O is broken.

/// Orchestrator error types
pub mod error;

/// The plain orchestrator
pub mod manager;

/// Resilience wrapper with fallback mode
pub mod resilient;

// Re-export commonly used types
pub use error::{OrchestratorError, OrchestratorResult};
pub use manager::{AudioOrchestrator, OrchestratorEvent};
pub use resilient::{ResilienceOptions, ResilientAudioOrchestrator};
