use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 一轮问答的历史记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// 问题序号（从 0 开始）
    pub question_index: usize,
    /// 面试问题
    pub question: String,
    /// 用户回答
    pub user_response: String,
    /// 参考答案
    pub reference_answer: String,
    /// 记录时间（Unix 毫秒）
    pub timestamp_ms: u64,
}

/// 面试上下文
///
/// 随状态机一起维护的可变记录，生命周期为一次面试会话：
/// `StartInterview` 时创建，`AnswerGenerated` 时追加历史，
/// `Reset` / `Restart` 时重置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewContext {
    /// 面试 ID
    pub interview_id: String,
    /// 目标岗位
    pub job_position: String,
    /// 简历内容
    pub resume: String,
    /// 预置题库
    pub question_bank: Vec<String>,
    /// 当前问题序号（从 0 开始）
    pub current_question_index: usize,
    /// 问题总数
    pub total_questions: usize,
    /// 当前问题
    pub current_question: String,
    /// 当前参考答案
    pub current_answer: String,
    /// 用户本轮回答
    pub user_response: String,
    /// 对话历史
    pub conversation_history: Vec<ConversationRecord>,
    /// 错误消息（如果有）
    pub error_message: Option<String>,
}

impl Default for InterviewContext {
    fn default() -> Self {
        Self {
            interview_id: String::new(),
            job_position: String::new(),
            resume: String::new(),
            question_bank: Vec::new(),
            current_question_index: 0,
            total_questions: 10,
            current_question: String::new(),
            current_answer: String::new(),
            user_response: String::new(),
            conversation_history: Vec::new(),
            error_message: None,
        }
    }
}

impl InterviewContext {
    /// 创建指定题数的上下文
    pub fn with_total_questions(total_questions: usize) -> Self {
        Self {
            total_questions,
            ..Default::default()
        }
    }
}

/// 当前时间的 Unix 毫秒时间戳
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
