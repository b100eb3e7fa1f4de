use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::context::{now_ms, ConversationRecord, InterviewContext};
use super::events::{SessionEvent, SessionEventKind};

/// 面试阶段
///
/// 由会话状态机独占维护的 13 个阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewPhase {
    /// 空闲状态
    Idle,
    /// 初始化面试信息
    Initializing,
    /// AI 分析信息生成问题
    AiThinking,
    /// AI 语音提问
    AiSpeaking,
    /// 等待用户回答
    UserListening,
    /// 用户语音回答
    UserSpeaking,
    /// AI 分析用户回答
    AiAnalyzing,
    /// 生成参考答案
    GeneratingAnswer,
    /// 本轮完成
    RoundComplete,
    /// 面试结束中
    InterviewEnding,
    /// 生成面试报告
    GeneratingReport,
    /// 面试完成
    Completed,
    /// 错误状态
    Error,
}

impl InterviewPhase {
    /// 获取面向用户的阶段描述
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "等待开始面试",
            Self::Initializing => "正在初始化面试信息...",
            Self::AiThinking => "AI面试官正在思考问题...",
            Self::AiSpeaking => "AI面试官正在提问...",
            Self::GeneratingAnswer => "正在生成参考答案...",
            Self::UserListening => "等待您的回答",
            Self::UserSpeaking => "正在录制您的回答...",
            Self::AiAnalyzing => "正在分析您的回答...",
            Self::RoundComplete => "本轮问答完成",
            Self::InterviewEnding => "面试即将结束...",
            Self::GeneratingReport => "正在生成面试报告...",
            Self::Completed => "面试已完成",
            Self::Error => "发生错误，请重试",
        }
    }
}

/// 面试进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterviewProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: u32,
}

/// 状态转换表：`(当前阶段, 事件类型) -> 下一阶段`
///
/// 未列出的组合返回 `None`，表示事件被忽略（不是错误）
pub fn transition(phase: InterviewPhase, event: SessionEventKind) -> Option<InterviewPhase> {
    use InterviewPhase as P;
    use SessionEventKind as E;

    match (phase, event) {
        (P::Idle, E::StartInterview) => Some(P::Initializing),

        (P::Initializing, E::InitSuccess) => Some(P::AiThinking),
        (P::Initializing, E::InitError) => Some(P::Error),

        (P::AiThinking, E::QuestionGenerated) => Some(P::AiSpeaking),
        (P::AiThinking, E::ThinkingError) => Some(P::Error),

        // 播放完成后直接进入用户监听，参考答案在后台生成
        (P::AiSpeaking, E::SpeakingComplete) => Some(P::UserListening),
        (P::AiSpeaking, E::SpeakingError) => Some(P::Error),

        (P::GeneratingAnswer, E::AnswerGenerated) => Some(P::UserListening),
        (P::GeneratingAnswer, E::GenerationError) => Some(P::Error),

        (P::UserListening, E::UserStartedSpeaking) => Some(P::UserSpeaking),
        // 支持直接从监听状态进入分析状态
        (P::UserListening, E::UserFinishedSpeaking) => Some(P::AiAnalyzing),
        // 超时重新提问
        (P::UserListening, E::ListeningTimeout) => Some(P::AiThinking),
        (P::UserListening, E::ListeningError) => Some(P::Error),
        // 答案在后台生成完成，保持当前状态
        (P::UserListening, E::AnswerGenerated) => Some(P::UserListening),

        (P::UserSpeaking, E::UserFinishedSpeaking) => Some(P::AiAnalyzing),
        (P::UserSpeaking, E::ManualStop) => Some(P::AiAnalyzing),
        (P::UserSpeaking, E::SpeakingError) => Some(P::Error),
        (P::UserSpeaking, E::AnswerGenerated) => Some(P::UserSpeaking),

        (P::AiAnalyzing, E::AnalysisComplete) => Some(P::RoundComplete),
        (P::AiAnalyzing, E::AnalysisError) => Some(P::Error),

        (P::RoundComplete, E::ContinueInterview) => Some(P::AiThinking),
        (P::RoundComplete, E::EndInterview) => Some(P::InterviewEnding),

        (P::InterviewEnding, E::GenerateReport) => Some(P::GeneratingReport),
        (P::InterviewEnding, E::EndingError) => Some(P::Error),

        (P::GeneratingReport, E::ReportComplete) => Some(P::Completed),
        (P::GeneratingReport, E::ReportError) => Some(P::Error),

        (P::Completed, E::Restart) => Some(P::Idle),

        (P::Error, E::Retry) => Some(P::AiThinking),
        (P::Error, E::Reset) => Some(P::Idle),

        _ => None,
    }
}

/// 阶段变更回调
pub type PhaseChangeCallback = Box<dyn Fn(InterviewPhase, &InterviewContext) + Send>;

/// 回调订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// 面试会话状态机
///
/// 表驱动的有限状态机，维护面试阶段和上下文。
/// 每次被接受的转换会先更新阶段和上下文，再按订阅顺序同步通知监听器
pub struct InterviewSessionMachine {
    phase: InterviewPhase,
    context: InterviewContext,
    listeners: Vec<(SubscriptionId, PhaseChangeCallback)>,
    next_listener_id: u64,
}

impl InterviewSessionMachine {
    /// 创建新的状态机，初始阶段为 `Idle`
    pub fn new(context: InterviewContext) -> Self {
        Self {
            phase: InterviewPhase::Idle,
            context,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// 订阅阶段变化
    ///
    /// 返回句柄可用于 [`Self::unsubscribe`]
    pub fn on_phase_change<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(InterviewPhase, &InterviewContext) + Send + 'static,
    {
        let id = SubscriptionId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(callback)));
        id
    }

    /// 取消订阅
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    /// 发送事件
    ///
    /// 查转换表执行状态转换并更新上下文。当前阶段没有该事件的
    /// 转换项时返回 `false`，阶段和上下文保持不变——这不是错误，
    /// 只是事件被忽略；调用方应检查返回值以发现编程错误
    pub fn send(&mut self, event: SessionEvent) -> bool {
        let Some(next) = transition(self.phase, event.kind()) else {
            warn!(
                event = ?event.kind(),
                phase = ?self.phase,
                "Invalid session transition, event ignored"
            );
            return false;
        };

        debug!(from = ?self.phase, to = ?next, event = ?event.kind(), "Session transition");
        self.phase = next;
        self.update_context(&event);
        self.notify_phase_change();

        true
    }

    /// 获取当前阶段
    pub fn phase(&self) -> InterviewPhase {
        self.phase
    }

    /// 获取上下文
    pub fn context(&self) -> &InterviewContext {
        &self.context
    }

    /// 根据事件更新上下文
    ///
    /// 纯粹按事件类型决定的确定性变更，与当前阶段无关
    fn update_context(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StartInterview {
                interview_id,
                job_position,
                resume,
                question_bank,
            } => {
                self.context.interview_id = interview_id.clone();
                self.context.job_position = job_position.clone();
                self.context.resume = resume.clone();
                self.context.question_bank = question_bank.clone();
                self.context.current_question_index = 0;
                self.context.conversation_history.clear();
            }

            SessionEvent::QuestionGenerated { question } => {
                self.context.current_question = question.clone();
            }

            SessionEvent::UserFinishedSpeaking { response }
            | SessionEvent::ManualStop { response } => {
                self.context.user_response = response.clone();
            }

            SessionEvent::AnswerGenerated { answer } => {
                self.context.current_answer = answer.clone();
                // 记录对话历史
                self.context.conversation_history.push(ConversationRecord {
                    question_index: self.context.current_question_index,
                    question: self.context.current_question.clone(),
                    user_response: self.context.user_response.clone(),
                    reference_answer: self.context.current_answer.clone(),
                    timestamp_ms: now_ms(),
                });
            }

            SessionEvent::ContinueInterview => {
                self.context.current_question_index += 1;
                self.context.current_question.clear();
                self.context.current_answer.clear();
                self.context.user_response.clear();
            }

            SessionEvent::Retry | SessionEvent::Reset => {
                self.context.error_message = None;
            }

            other => {
                if let Some(error) = other.error_message() {
                    self.context.error_message = Some(error.to_string());
                }
            }
        }
    }

    /// 通知阶段变化
    ///
    /// 在阶段和上下文都更新完成后，按订阅顺序同步调用
    fn notify_phase_change(&self) {
        for (_, callback) in &self.listeners {
            callback(self.phase, &self.context);
        }
    }

    /// 重置状态机
    ///
    /// 回到 `Idle`，上下文恢复默认值（保留原有题数）
    pub fn reset(&mut self) {
        let total_questions = self.context.total_questions;
        self.phase = InterviewPhase::Idle;
        self.context = InterviewContext::with_total_questions(total_questions);
        self.notify_phase_change();
    }

    /// 检查当前阶段是否接受某类事件
    pub fn can_send(&self, event: SessionEventKind) -> bool {
        transition(self.phase, event).is_some()
    }

    /// 获取当前阶段可用的事件类型
    pub fn available_events(&self) -> Vec<SessionEventKind> {
        use SessionEventKind as E;

        const ALL: [E; 25] = [
            E::StartInterview,
            E::InitSuccess,
            E::InitError,
            E::QuestionGenerated,
            E::ThinkingError,
            E::SpeakingComplete,
            E::SpeakingError,
            E::UserStartedSpeaking,
            E::UserFinishedSpeaking,
            E::ManualStop,
            E::ListeningTimeout,
            E::ListeningError,
            E::AnswerGenerated,
            E::GenerationError,
            E::AnalysisComplete,
            E::AnalysisError,
            E::ContinueInterview,
            E::EndInterview,
            E::GenerateReport,
            E::EndingError,
            E::ReportComplete,
            E::ReportError,
            E::Restart,
            E::Retry,
            E::Reset,
        ];

        ALL.into_iter()
            .filter(|event| self.can_send(*event))
            .collect()
    }

    /// 获取当前阶段描述
    pub fn phase_description(&self) -> &'static str {
        self.phase.description()
    }

    /// 检查是否应该结束面试
    ///
    /// `current_question_index` 从 0 开始：`total_questions = 1` 时
    /// `index = 0` 就已经是最后一个问题
    pub fn should_end_interview(&self) -> bool {
        self.context.current_question_index + 1 >= self.context.total_questions
    }

    /// 获取面试进度
    pub fn progress(&self) -> InterviewProgress {
        let total = self.context.total_questions;
        let current = (self.context.current_question_index + 1).min(total);
        let percentage = ((current as f64 / total.max(1) as f64) * 100.0).round() as u32;

        InterviewProgress {
            current,
            total,
            percentage,
        }
    }
}

impl Default for InterviewSessionMachine {
    fn default() -> Self {
        Self::new(InterviewContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn start_event() -> SessionEvent {
        SessionEvent::StartInterview {
            interview_id: "iv-1".to_string(),
            job_position: "后端工程师".to_string(),
            resume: "简历内容".to_string(),
            question_bank: vec!["题目一".to_string()],
        }
    }

    #[test]
    fn test_initial_phase_is_idle() {
        let machine = InterviewSessionMachine::default();
        assert_eq!(machine.phase(), InterviewPhase::Idle);
    }

    #[test]
    fn test_start_interview_seeds_context() {
        let mut machine = InterviewSessionMachine::default();
        assert!(machine.send(start_event()));

        assert_eq!(machine.phase(), InterviewPhase::Initializing);
        assert_eq!(machine.context().interview_id, "iv-1");
        assert_eq!(machine.context().job_position, "后端工程师");
        assert_eq!(machine.context().current_question_index, 0);
        assert!(machine.context().conversation_history.is_empty());
    }

    #[test]
    fn test_invalid_event_is_rejected_without_changes() {
        let mut machine = InterviewSessionMachine::default();

        // AnalysisComplete 在 Idle 阶段没有转换项
        assert!(!machine.send(SessionEvent::AnalysisComplete));
        assert_eq!(machine.phase(), InterviewPhase::Idle);
        assert_eq!(machine.context(), &InterviewContext::default());
    }

    #[test]
    fn test_error_and_recovery_edges() {
        let mut machine = InterviewSessionMachine::default();
        machine.send(start_event());
        machine.send(SessionEvent::InitError {
            error: "初始化失败".to_string(),
        });

        assert_eq!(machine.phase(), InterviewPhase::Error);
        assert_eq!(
            machine.context().error_message.as_deref(),
            Some("初始化失败")
        );

        // Error 不是死端：Retry 回到 AiThinking 并清除错误
        assert!(machine.send(SessionEvent::Retry));
        assert_eq!(machine.phase(), InterviewPhase::AiThinking);
        assert!(machine.context().error_message.is_none());
    }

    #[test]
    fn test_completed_is_not_a_dead_end() {
        let mut machine = InterviewSessionMachine::default();
        machine.phase = InterviewPhase::Completed;

        assert!(machine.send(SessionEvent::Restart));
        assert_eq!(machine.phase(), InterviewPhase::Idle);
    }

    #[test]
    fn test_answer_generated_keeps_listening_state() {
        let mut machine = InterviewSessionMachine::default();
        machine.send(start_event());
        machine.send(SessionEvent::InitSuccess);
        machine.send(SessionEvent::QuestionGenerated {
            question: "问题".to_string(),
        });
        machine.send(SessionEvent::SpeakingComplete);
        assert_eq!(machine.phase(), InterviewPhase::UserListening);

        // 答案在后台生成完成，保持监听状态
        assert!(machine.send(SessionEvent::AnswerGenerated {
            answer: "参考答案".to_string(),
        }));
        assert_eq!(machine.phase(), InterviewPhase::UserListening);
        assert_eq!(machine.context().conversation_history.len(), 1);
    }

    #[test]
    fn test_conversation_history_record() {
        let mut machine = InterviewSessionMachine::default();
        machine.send(start_event());
        machine.send(SessionEvent::InitSuccess);
        machine.send(SessionEvent::QuestionGenerated {
            question: "介绍一下项目".to_string(),
        });
        machine.send(SessionEvent::SpeakingComplete);
        machine.send(SessionEvent::UserStartedSpeaking);
        machine.send(SessionEvent::UserFinishedSpeaking {
            response: "我的项目".to_string(),
        });
        machine.send(SessionEvent::AnswerGenerated {
            answer: "参考".to_string(),
        });

        // AiAnalyzing 阶段没有 AnswerGenerated 转换项，历史不应记录
        assert_eq!(machine.phase(), InterviewPhase::AiAnalyzing);
        assert!(machine.context().conversation_history.is_empty());
    }

    #[test]
    fn test_listening_timeout_reasks() {
        let mut machine = InterviewSessionMachine::default();
        machine.send(start_event());
        machine.send(SessionEvent::InitSuccess);
        machine.send(SessionEvent::QuestionGenerated {
            question: "q".to_string(),
        });
        machine.send(SessionEvent::SpeakingComplete);

        assert!(machine.send(SessionEvent::ListeningTimeout));
        assert_eq!(machine.phase(), InterviewPhase::AiThinking);
    }

    #[test]
    fn test_full_round_lands_in_ai_thinking_with_advanced_index() {
        let mut machine =
            InterviewSessionMachine::new(InterviewContext::with_total_questions(2));

        machine.send(start_event());
        machine.send(SessionEvent::InitSuccess);
        machine.send(SessionEvent::QuestionGenerated {
            question: "q1".to_string(),
        });
        machine.send(SessionEvent::SpeakingComplete);
        machine.send(SessionEvent::UserFinishedSpeaking {
            response: "a1".to_string(),
        });
        machine.send(SessionEvent::AnalysisComplete);
        machine.send(SessionEvent::ContinueInterview);

        assert_eq!(machine.phase(), InterviewPhase::AiThinking);
        assert_eq!(machine.context().current_question_index, 1);
        assert!(machine.context().current_question.is_empty());
        assert!(machine.context().user_response.is_empty());
    }

    #[test]
    fn test_should_end_interview_boundary() {
        let mut machine =
            InterviewSessionMachine::new(InterviewContext::with_total_questions(1));
        // totalQuestions=1, index=0 就是最后一个问题
        assert!(machine.should_end_interview());

        machine.context.total_questions = 2;
        assert!(!machine.should_end_interview());
        machine.context.current_question_index = 1;
        assert!(machine.should_end_interview());
    }

    #[test]
    fn test_progress() {
        let mut machine =
            InterviewSessionMachine::new(InterviewContext::with_total_questions(4));
        let progress = machine.progress();
        assert_eq!(progress.current, 1);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.percentage, 25);

        // current 不会超过 total
        machine.context.current_question_index = 10;
        let progress = machine.progress();
        assert_eq!(progress.current, 4);
        assert_eq!(progress.percentage, 100);
    }

    #[test]
    fn test_listeners_called_in_order_after_update() {
        let mut machine = InterviewSessionMachine::default();
        let order = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&order);
        machine.on_phase_change(move |phase, context| {
            // 监听器观察到的必须是更新后的状态
            assert_eq!(phase, InterviewPhase::Initializing);
            assert_eq!(context.interview_id, "iv-1");
            assert_eq!(first.fetch_add(1, Ordering::SeqCst), 0);
        });

        let second = Arc::clone(&order);
        machine.on_phase_change(move |_, _| {
            assert_eq!(second.fetch_add(1, Ordering::SeqCst), 1);
        });

        machine.send(start_event());
        assert_eq!(order.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let mut machine = InterviewSessionMachine::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let id = machine.on_phase_change(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        machine.send(start_event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        machine.unsubscribe(id);
        machine.send(SessionEvent::InitSuccess);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_available_events() {
        let machine = InterviewSessionMachine::default();
        let events = machine.available_events();
        assert_eq!(events, vec![SessionEventKind::StartInterview]);
    }

    #[test]
    fn test_reset_preserves_total_questions() {
        let mut machine =
            InterviewSessionMachine::new(InterviewContext::with_total_questions(5));
        machine.send(start_event());
        machine.reset();

        assert_eq!(machine.phase(), InterviewPhase::Idle);
        assert_eq!(machine.context().total_questions, 5);
        assert!(machine.context().interview_id.is_empty());
    }

    #[test]
    fn test_phase_descriptions() {
        assert_eq!(InterviewPhase::Idle.description(), "等待开始面试");
        assert_eq!(InterviewPhase::Completed.description(), "面试已完成");
    }
}
