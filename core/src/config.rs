//! 应用配置模块
//!
//! 聚合各子系统的配置，提供带默认值的整体配置类型。
//! 所有字段都可以通过 JSON 反序列化覆盖，未出现的字段使用默认值
//!
//! # 使用示例
//!
//! ```
//! use vivaflow_lib::config::VivaFlowConfig;
//!
//! // 全默认配置
//! let config = VivaFlowConfig::default();
//! assert_eq!(config.turn.silence_threshold_ms, 3000);
//!
//! // 从 JSON 局部覆盖
//! let config = VivaFlowConfig::from_json(r#"{
//!     "turn": { "volume_threshold": 0.02 }
//! }"#).unwrap();
//! assert_eq!(config.turn.volume_threshold, 0.02);
//! ```

use serde::{Deserialize, Serialize};

use crate::asr::AsrConfig;
use crate::audio::CaptureConfig;
use crate::orchestrator::ResilienceOptions;
use crate::recovery::CoordinatorConfig;
use crate::retry::RetryConfig;
use crate::tts::TtsConfig;
use crate::turn::TurnConfig;

/// 重试预设表
///
/// 四个标准预设的可覆盖版本；不覆盖时与
/// [`RetryConfig`] 的同名构造函数一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPresets {
    /// 网络请求重试
    pub network: RetryConfig,
    /// 音频服务重试
    pub audio: RetryConfig,
    /// 快速重试
    pub fast: RetryConfig,
    /// 长时间重试
    pub persistent: RetryConfig,
}

impl Default for RetryPresets {
    fn default() -> Self {
        Self {
            network: RetryConfig::network(),
            audio: RetryConfig::audio(),
            fast: RetryConfig::fast(),
            persistent: RetryConfig::persistent(),
        }
    }
}

/// 整体配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VivaFlowConfig {
    /// 轮次协调配置
    pub turn: TurnConfig,
    /// 麦克风采集配置
    pub capture: CaptureConfig,
    /// 语音识别配置
    pub asr: AsrConfig,
    /// 语音合成配置
    pub tts: TtsConfig,
    /// 重试预设
    pub retry: RetryPresets,
    /// 错误协调配置
    pub recovery: CoordinatorConfig,
    /// 弹性层配置
    pub resilience: ResilienceOptions,
}

impl VivaFlowConfig {
    /// 从 JSON 字符串加载配置
    ///
    /// 未出现的字段使用默认值
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 序列化为格式化 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = VivaFlowConfig::default();

        assert_eq!(config.turn.silence_threshold_ms, 3000);
        assert_eq!(config.turn.volume_threshold, 0.01);
        assert_eq!(config.turn.resume_delay_ms, 500);
        assert_eq!(config.turn.auto_end_timeout_ms, 5000);

        assert_eq!(config.retry.network.max_attempts, 5);
        assert_eq!(config.retry.audio.max_attempts, 3);
        assert_eq!(config.retry.fast.max_attempts, 2);
        assert_eq!(config.retry.persistent.max_attempts, 10);

        assert!(config.recovery.enable_auto_recovery);
        assert_eq!(config.recovery.max_retry_attempts, 3);
        assert_eq!(config.recovery.retry_delay_ms, 2000);

        assert!(config.resilience.enable_fallback_mode);
    }

    #[test]
    fn test_partial_json_override() {
        let config = VivaFlowConfig::from_json(
            r#"{
                "turn": { "silence_threshold_ms": 2000 },
                "recovery": { "max_retry_attempts": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.turn.silence_threshold_ms, 2000);
        // 未覆盖的字段保持默认
        assert_eq!(config.turn.volume_threshold, 0.01);
        assert_eq!(config.recovery.max_retry_attempts, 5);
        assert!(config.recovery.enable_auto_recovery);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = VivaFlowConfig::default();
        let json = config.to_json().unwrap();
        let restored = VivaFlowConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(VivaFlowConfig::from_json("{ not json").is_err());
    }
}
