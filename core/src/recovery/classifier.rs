use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::session::context::now_ms;

/// 错误历史保留上限
const MAX_HISTORY_SIZE: usize = 100;

/// 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // 音频相关错误
    AudioInitializationFailed,
    AudioServiceError,
    MicrophoneAccessDenied,
    AsrConnectionFailed,
    TtsServiceUnavailable,
    AudioPlaybackFailed,

    // 网络相关错误
    NetworkConnectionFailed,
    ServerTimeout,

    // 面试流程错误
    QuestionGenerationFailed,
    AnswerAnalysisFailed,
    InterviewStateError,

    // 恢复相关错误
    RecoveryFailed,
    NoRecoveryAvailable,
    MaxRetriesExceeded,

    // 未知错误
    Unknown,
}

impl ErrorKind {
    /// 该类型的默认严重程度
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::MicrophoneAccessDenied
            | Self::AsrConnectionFailed
            | Self::AudioInitializationFailed => Severity::Critical,

            Self::TtsServiceUnavailable
            | Self::QuestionGenerationFailed
            | Self::AnswerAnalysisFailed
            | Self::RecoveryFailed
            | Self::MaxRetriesExceeded => Severity::High,

            Self::AudioPlaybackFailed
            | Self::AudioServiceError
            | Self::NetworkConnectionFailed
            | Self::ServerTimeout
            | Self::InterviewStateError
            | Self::NoRecoveryAvailable => Severity::Medium,

            Self::Unknown => Severity::Low,
        }
    }

    /// 面向用户的错误消息
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MicrophoneAccessDenied => "麦克风访问被拒绝，请检查权限设置",
            Self::AsrConnectionFailed => "语音识别服务连接失败，正在尝试重连...",
            Self::TtsServiceUnavailable => "TTS语音合成服务不可用",
            Self::AudioInitializationFailed => "音频服务初始化失败",
            Self::AudioServiceError => "音频服务异常",
            Self::AudioPlaybackFailed => "音频播放失败",
            Self::QuestionGenerationFailed => "问题生成失败，请稍后重试",
            Self::AnswerAnalysisFailed => "答案分析失败，将跳过本次分析",
            Self::NetworkConnectionFailed => "网络连接失败，请检查网络设置",
            Self::ServerTimeout => "服务器响应超时，请稍后重试",
            Self::InterviewStateError => "面试状态异常，正在重置...",
            Self::RecoveryFailed => "自动修复失败，请手动处理",
            Self::NoRecoveryAvailable => "无法自动修复此问题",
            Self::MaxRetriesExceeded => "重试次数已达上限，请检查系统设置",
            Self::Unknown => "发生未知错误",
        }
    }
}

/// 错误严重程度
///
/// 决定面向用户的通知是快速自动消失还是持续显示
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 不影响核心功能，用户可以继续操作
    Low,
    /// 影响部分功能，但可以降级处理
    Medium,
    /// 影响核心功能，需要用户干预
    High,
    /// 严重错误，面试无法继续
    Critical,
}

/// 分类后的错误信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// 错误类型
    pub kind: ErrorKind,
    /// 严重程度
    pub severity: Severity,
    /// 错误消息
    pub message: String,
    /// 发生时间（Unix 毫秒）
    pub timestamp_ms: u64,
    /// 发生错误的操作上下文（如果有）
    pub context: Option<String>,
}

impl ErrorInfo {
    /// 构造一条错误信息
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            timestamp_ms: now_ms(),
            context: None,
        }
    }

    /// 附加操作上下文
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// 错误分类器
///
/// 根据错误消息关键字把原始错误映射为带类型和严重程度的
/// [`ErrorInfo`]，并维护一个有界的错误历史（仅用于展示和调试）
#[derive(Default)]
pub struct ErrorClassifier {
    history: Mutex<VecDeque<ErrorInfo>>,
}

impl ErrorClassifier {
    /// 创建新的分类器
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据消息关键字推断错误类型
    pub fn infer_kind(message: &str) -> ErrorKind {
        let message = message.to_lowercase();

        // 音频相关错误
        if message.contains("microphone") || message.contains("permission") {
            return ErrorKind::MicrophoneAccessDenied;
        }
        if message.contains("websocket") || message.contains("asr") {
            return ErrorKind::AsrConnectionFailed;
        }
        if message.contains("tts") || message.contains("speech") {
            return ErrorKind::TtsServiceUnavailable;
        }
        if message.contains("playback") {
            return ErrorKind::AudioPlaybackFailed;
        }
        if message.contains("audio") {
            return ErrorKind::AudioServiceError;
        }

        // 网络相关错误
        if message.contains("timeout") {
            return ErrorKind::ServerTimeout;
        }
        if message.contains("network") || message.contains("connect") {
            return ErrorKind::NetworkConnectionFailed;
        }

        // 面试流程错误
        if message.contains("question") {
            return ErrorKind::QuestionGenerationFailed;
        }
        if message.contains("analysis") || message.contains("analyze") {
            return ErrorKind::AnswerAnalysisFailed;
        }
        if message.contains("interview") || message.contains("state") {
            return ErrorKind::InterviewStateError;
        }

        ErrorKind::Unknown
    }

    /// 对原始错误做分类
    ///
    /// 没有显式类型时根据消息关键字推断，严重程度取该类型的默认值。
    /// 分类结果会进入错误历史
    pub fn classify(&self, raw: &anyhow::Error, context: Option<String>) -> ErrorInfo {
        let message = raw.to_string();
        let kind = Self::infer_kind(&message);

        let mut info = ErrorInfo::new(kind, kind.default_severity(), message);
        info.context = context;

        self.record(info.clone());
        info
    }

    /// 按显式类型和严重程度分类
    pub fn classify_as(
        &self,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
        context: Option<String>,
    ) -> ErrorInfo {
        let mut info = ErrorInfo::new(kind, severity, message);
        info.context = context;

        self.record(info.clone());
        info
    }

    /// 记录错误历史（保留最近 100 条）
    fn record(&self, info: ErrorInfo) {
        error!(
            kind = ?info.kind,
            severity = ?info.severity,
            message = %info.message,
            "Error classified"
        );

        let mut history = self.history.lock().unwrap();
        history.push_back(info);
        while history.len() > MAX_HISTORY_SIZE {
            history.pop_front();
        }
    }

    /// 获取完整错误历史
    pub fn history(&self) -> Vec<ErrorInfo> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// 获取最近 n 条错误
    pub fn recent(&self, n: usize) -> Vec<ErrorInfo> {
        let history = self.history.lock().unwrap();
        history
            .iter()
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }

    /// 检查历史中是否有严重错误
    pub fn has_critical_errors(&self) -> bool {
        self.history
            .lock()
            .unwrap()
            .iter()
            .any(|info| info.severity == Severity::Critical)
    }

    /// 按类型统计错误次数
    pub fn error_stats(&self) -> HashMap<ErrorKind, usize> {
        let mut stats = HashMap::new();
        for info in self.history.lock().unwrap().iter() {
            *stats.entry(info.kind).or_insert(0) += 1;
        }
        stats
    }

    /// 清除错误历史
    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }
}
