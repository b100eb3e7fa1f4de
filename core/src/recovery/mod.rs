//! 错误分类与恢复模块
//!
//! 三层结构：
//!
//! - [`ErrorClassifier`] - 把原始错误映射为带类型和严重程度的
//!   [`ErrorInfo`]，维护有界错误历史
//! - [`RecoveryEngine`] - 针对错误类型生成按优先级排序的恢复操作，
//!   依次执行（同一时刻只允许一次恢复）
//! - [`SessionErrorCoordinator`] - 面向会话层的门面：错误计数、
//!   重试上限、用户通知和健康检查

/// 错误分类器
pub mod classifier;

/// 会话错误协调器
pub mod coordinator;

/// 恢复引擎
pub mod engine;

// Re-export commonly used types
pub use classifier::{ErrorClassifier, ErrorInfo, ErrorKind, Severity};
pub use coordinator::{
    CoordinatorConfig, CoordinatorEvent, ErrorStats, HealthReport, Notification,
    NotificationLevel, SessionErrorCoordinator, SessionSnapshot,
};
pub use engine::{
    RecoveryAction, RecoveryActionKind, RecoveryEngine, RecoveryEvent, RecoveryHooks,
    RecoveryOp, RecoveryOutcome,
};
