//! 轮次协调模块
//!
//! 决定每一时刻"话筒"属于 AI 还是用户：
//! 基于音量阈值做语音活动检测，并维护 5 状态的轮次状态机
//!
//! # 状态
//!
//! - `Idle` - 空闲
//! - `AiSpeaking` - AI 正在说话（暂停语音识别）
//! - `ListeningForUser` - 等待用户说话
//! - `UserSpeaking` - 用户正在说话
//! - `Processing` - 回合交接处理中

/// 轮次协调器
pub mod coordinator;

/// 轮次相关错误类型
pub mod error;

// Re-export commonly used types
pub use coordinator::{TurnConfig, TurnCoordinator, TurnEvent, TurnState};
pub use error::{TurnError, TurnResult};
