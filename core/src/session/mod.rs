//! 面试会话状态机模块
//!
//! 表驱动的有限状态机，驱动整个面试流程：
//!
//! ```text
//! Idle -> Initializing -> AiThinking -> AiSpeaking -> UserListening
//!      -> UserSpeaking -> AiAnalyzing -> RoundComplete
//!      -> (继续) AiThinking / (结束) InterviewEnding
//!      -> GeneratingReport -> Completed
//! ```
//!
//! 任一阶段出错进入 `Error`；`Error` 和 `Completed` 都不是死端，
//! 可以通过 `Retry` / `Reset` / `Restart` 回到活跃循环

/// 面试上下文
pub mod context;

/// 会话事件定义
pub mod events;

/// 会话状态机
pub mod machine;

// Re-export commonly used types
pub use context::{ConversationRecord, InterviewContext};
pub use events::{SessionEvent, SessionEventKind};
pub use machine::{
    transition, InterviewPhase, InterviewProgress, InterviewSessionMachine, SubscriptionId,
};
