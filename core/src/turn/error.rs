use thiserror::Error;

use crate::audio::AudioError;

/// 轮次协调相关错误
#[derive(Error, Debug)]
pub enum TurnError {
    /// 无法获取音频电平采样能力
    #[error("Failed to acquire audio level source: {0}")]
    AudioAcquisition(#[from] AudioError),

    /// 协调器尚未初始化
    #[error("Turn coordinator is not initialized")]
    NotInitialized,

    /// 协调器已初始化
    #[error("Turn coordinator is already initialized")]
    AlreadyInitialized,
}

/// 轮次模块的结果类型
pub type TurnResult<T> = Result<T, TurnError>;
