/// Logging utilities
pub mod logging;

/// Scoped timer guards for state machines
pub mod timer;

// Re-export commonly used types
pub use timer::ScopedTimer;
