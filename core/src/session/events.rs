use serde::{Deserialize, Serialize};

/// 面试会话事件
///
/// 每个变体携带自己精确的载荷，接收方按变体穷举匹配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// 开始面试
    StartInterview {
        interview_id: String,
        job_position: String,
        resume: String,
        question_bank: Vec<String>,
    },
    /// 初始化成功
    InitSuccess,
    /// 初始化失败
    InitError { error: String },
    /// 问题生成完成
    QuestionGenerated { question: String },
    /// 问题生成失败
    ThinkingError { error: String },
    /// AI 语音播放完成
    SpeakingComplete,
    /// 语音播放/录制失败
    SpeakingError { error: String },
    /// 用户开始说话
    UserStartedSpeaking,
    /// 用户说话结束
    UserFinishedSpeaking { response: String },
    /// 手动停止回答
    ManualStop { response: String },
    /// 监听超时
    ListeningTimeout,
    /// 监听失败
    ListeningError { error: String },
    /// 参考答案生成完成
    AnswerGenerated { answer: String },
    /// 参考答案生成失败
    GenerationError { error: String },
    /// 回答分析完成
    AnalysisComplete,
    /// 回答分析失败
    AnalysisError { error: String },
    /// 继续下一轮
    ContinueInterview,
    /// 结束面试
    EndInterview,
    /// 生成报告
    GenerateReport,
    /// 结束流程失败
    EndingError { error: String },
    /// 报告生成完成
    ReportComplete,
    /// 报告生成失败
    ReportError { error: String },
    /// 重新开始
    Restart,
    /// 从错误状态重试
    Retry,
    /// 重置
    Reset,
}

/// 会话事件类型（不携带载荷，用于转换表查询）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEventKind {
    StartInterview,
    InitSuccess,
    InitError,
    QuestionGenerated,
    ThinkingError,
    SpeakingComplete,
    SpeakingError,
    UserStartedSpeaking,
    UserFinishedSpeaking,
    ManualStop,
    ListeningTimeout,
    ListeningError,
    AnswerGenerated,
    GenerationError,
    AnalysisComplete,
    AnalysisError,
    ContinueInterview,
    EndInterview,
    GenerateReport,
    EndingError,
    ReportComplete,
    ReportError,
    Restart,
    Retry,
    Reset,
}

impl SessionEvent {
    /// 获取事件类型
    pub fn kind(&self) -> SessionEventKind {
        match self {
            Self::StartInterview { .. } => SessionEventKind::StartInterview,
            Self::InitSuccess => SessionEventKind::InitSuccess,
            Self::InitError { .. } => SessionEventKind::InitError,
            Self::QuestionGenerated { .. } => SessionEventKind::QuestionGenerated,
            Self::ThinkingError { .. } => SessionEventKind::ThinkingError,
            Self::SpeakingComplete => SessionEventKind::SpeakingComplete,
            Self::SpeakingError { .. } => SessionEventKind::SpeakingError,
            Self::UserStartedSpeaking => SessionEventKind::UserStartedSpeaking,
            Self::UserFinishedSpeaking { .. } => SessionEventKind::UserFinishedSpeaking,
            Self::ManualStop { .. } => SessionEventKind::ManualStop,
            Self::ListeningTimeout => SessionEventKind::ListeningTimeout,
            Self::ListeningError { .. } => SessionEventKind::ListeningError,
            Self::AnswerGenerated { .. } => SessionEventKind::AnswerGenerated,
            Self::GenerationError { .. } => SessionEventKind::GenerationError,
            Self::AnalysisComplete => SessionEventKind::AnalysisComplete,
            Self::AnalysisError { .. } => SessionEventKind::AnalysisError,
            Self::ContinueInterview => SessionEventKind::ContinueInterview,
            Self::EndInterview => SessionEventKind::EndInterview,
            Self::GenerateReport => SessionEventKind::GenerateReport,
            Self::EndingError { .. } => SessionEventKind::EndingError,
            Self::ReportComplete => SessionEventKind::ReportComplete,
            Self::ReportError { .. } => SessionEventKind::ReportError,
            Self::Restart => SessionEventKind::Restart,
            Self::Retry => SessionEventKind::Retry,
            Self::Reset => SessionEventKind::Reset,
        }
    }

    /// 取出错误事件携带的错误消息
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::InitError { error }
            | Self::ThinkingError { error }
            | Self::SpeakingError { error }
            | Self::ListeningError { error }
            | Self::AnalysisError { error }
            | Self::GenerationError { error }
            | Self::EndingError { error }
            | Self::ReportError { error } => Some(error),
            _ => None,
        }
    }
}
