use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::retry::{RetryConfig, RetryManager, RetryOptions};
use tokio::sync::mpsc;

use super::classifier::{ErrorInfo, ErrorKind};

/// 恢复操作的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryActionKind {
    Retry,
    Fallback,
    Skip,
    Reset,
    Abort,
}

/// 恢复操作的具体步骤
///
/// 引擎按步骤调用注入的 [`RecoveryHooks`]，而不是广播匿名事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOp {
    /// 重新申请麦克风权限
    RerequestMicrophone,
    /// 重新连接 ASR 服务（经由重试管理器，AUDIO 配置）
    ReconnectAsr,
    /// 重新连接 TTS 服务
    ReconnectTts,
    /// 重新生成问题（经由重试管理器，NETWORK 配置）
    RegenerateQuestion,
    /// 重新分析答案
    ReanalyzeAnswer,
    /// 重新连接网络（经由重试管理器，NETWORK 配置）
    ReconnectNetwork,
    /// 切换到文字输入模式
    FallbackToText,
    /// 切换到静音模式
    SilentMode,
    /// 使用备用问题
    UseFallbackQuestion,
    /// 跳过当前问题
    SkipQuestion,
    /// 跳过答案分析
    SkipAnalysis,
    /// 切换到离线模式
    OfflineMode,
    /// 重置面试状态
    ResetSessionState,
    /// 同步面试状态
    SyncSessionState,
    /// 通用兜底恢复
    GenericRecovery,
}

/// 一条候选恢复操作
///
/// 每次错误都会重新生成，按优先级从高到低依次尝试
#[derive(Debug, Clone)]
pub struct RecoveryAction {
    /// 操作类别
    pub kind: RecoveryActionKind,
    /// 操作描述（面向用户）
    pub description: &'static str,
    /// 优先级，数值越大越先尝试
    pub priority: u8,
    /// 具体执行步骤
    pub op: RecoveryOp,
    /// 可选的回滚步骤，执行失败时尽力而为地调用
    pub rollback: Option<RecoveryOp>,
}

impl RecoveryAction {
    fn new(
        kind: RecoveryActionKind,
        description: &'static str,
        priority: u8,
        op: RecoveryOp,
    ) -> Self {
        Self {
            kind,
            description,
            priority,
            op,
            rollback: None,
        }
    }
}

/// 恢复步骤的执行者
///
/// 由嵌入方实现并注入引擎；每个步骤独立失败，引擎据此决定
/// 是否继续尝试下一个候选操作
pub trait RecoveryHooks: Send + Sync {
    /// 执行一个恢复步骤
    fn run(&self, op: RecoveryOp) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

/// 恢复过程事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum RecoveryEvent {
    /// 开始执行某个恢复操作
    ActionStarted { description: String, priority: u8 },
    /// 恢复操作执行成功
    ActionCompleted { description: String },
    /// 恢复操作执行失败
    ActionFailed { description: String, error: String },
    /// 整体恢复成功
    RecoverySuccessful { kind: ErrorKind },
    /// 所有候选操作都失败
    RecoveryFailed { kind: ErrorKind },
    /// 没有可用的恢复方案（或恢复进行中丢弃了新错误）
    NoRecoveryAvailable { kind: ErrorKind },
    /// 恢复被中止
    RecoveryAborted,
}

/// 一次恢复的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 某个候选操作成功
    Success,
    /// 所有候选操作都失败
    Failed,
    /// 没有生成任何候选操作
    NoActions,
    /// 另一次恢复正在进行，本次错误被丢弃
    Busy,
}

/// 恢复引擎
///
/// 针对分类后的错误生成按优先级排序的候选恢复操作，并依次执行。
/// 同一时刻只允许一次恢复在进行：恢复期间上报的错误会被丢弃
/// （不排队），因为并发恢复可能破坏轮次/会话状态
pub struct RecoveryEngine {
    hooks: Arc<dyn RecoveryHooks>,
    retry_manager: RetryManager,
    in_progress: AtomicBool,
    listeners: Mutex<Vec<mpsc::Sender<RecoveryEvent>>>,
}

impl RecoveryEngine {
    /// 创建恢复引擎
    pub fn new(hooks: Arc<dyn RecoveryHooks>, retry_manager: RetryManager) -> Self {
        Self {
            hooks,
            retry_manager,
            in_progress: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 订阅恢复事件
    pub fn subscribe(&self) -> mpsc::Receiver<RecoveryEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    fn emit(&self, event: RecoveryEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            let _ = listener.try_send(event.clone());
        }
    }

    /// 为某类错误生成候选恢复操作
    ///
    /// 纯映射表；返回结果已按优先级从高到低排序
    pub fn generate_actions(kind: ErrorKind) -> Vec<RecoveryAction> {
        use RecoveryActionKind as K;
        use RecoveryOp as Op;

        let mut actions = match kind {
            ErrorKind::MicrophoneAccessDenied => vec![
                RecoveryAction::new(K::Retry, "重新申请麦克风权限", 9, Op::RerequestMicrophone),
                RecoveryAction::new(K::Fallback, "切换到文字输入模式", 5, Op::FallbackToText),
            ],
            ErrorKind::AsrConnectionFailed => vec![
                RecoveryAction::new(K::Retry, "重新连接ASR服务", 8, Op::ReconnectAsr),
                RecoveryAction::new(K::Fallback, "切换到文字输入模式", 5, Op::FallbackToText),
            ],
            ErrorKind::TtsServiceUnavailable => vec![
                RecoveryAction::new(K::Retry, "重新连接TTS服务", 7, Op::ReconnectTts),
                RecoveryAction::new(K::Fallback, "切换到静音模式", 4, Op::SilentMode),
            ],
            ErrorKind::QuestionGenerationFailed => vec![
                RecoveryAction::new(K::Retry, "重新生成问题", 8, Op::RegenerateQuestion),
                RecoveryAction::new(K::Fallback, "使用备用问题", 4, Op::UseFallbackQuestion),
                RecoveryAction::new(K::Skip, "跳过当前问题", 3, Op::SkipQuestion),
            ],
            ErrorKind::AnswerAnalysisFailed => vec![
                RecoveryAction::new(K::Retry, "重新分析答案", 6, Op::ReanalyzeAnswer),
                RecoveryAction::new(K::Skip, "跳过答案分析", 3, Op::SkipAnalysis),
            ],
            ErrorKind::NetworkConnectionFailed => vec![
                RecoveryAction::new(K::Retry, "重新连接网络", 7, Op::ReconnectNetwork),
                RecoveryAction::new(K::Fallback, "切换到离线模式", 2, Op::OfflineMode),
            ],
            ErrorKind::InterviewStateError => vec![
                RecoveryAction::new(K::Reset, "重置面试状态", 6, Op::ResetSessionState),
                RecoveryAction::new(K::Retry, "同步面试状态", 5, Op::SyncSessionState),
            ],
            _ => vec![RecoveryAction::new(
                K::Fallback,
                "尝试通用恢复",
                1,
                Op::GenericRecovery,
            )],
        };

        // 按优先级从高到低
        actions.sort_by(|a, b| b.priority.cmp(&a.priority));
        actions
    }

    /// 检查某类错误是否有恢复方案
    pub fn can_recover(kind: ErrorKind) -> bool {
        !Self::generate_actions(kind).is_empty()
    }

    /// 对一个分类后的错误执行恢复
    ///
    /// 恢复进行中再次调用会直接丢弃新错误并返回
    /// [`RecoveryOutcome::Busy`]
    pub async fn recover(&self, error_info: &ErrorInfo) -> RecoveryOutcome {
        // 单恢复在飞行中的互斥约束
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                kind = ?error_info.kind,
                "Recovery already in progress, dropping new error"
            );
            self.emit(RecoveryEvent::NoRecoveryAvailable {
                kind: error_info.kind,
            });
            return RecoveryOutcome::Busy;
        }

        let outcome = self.recover_inner(error_info).await;
        self.in_progress.store(false, Ordering::SeqCst);
        outcome
    }

    async fn recover_inner(&self, error_info: &ErrorInfo) -> RecoveryOutcome {
        let actions = Self::generate_actions(error_info.kind);

        if actions.is_empty() {
            self.emit(RecoveryEvent::NoRecoveryAvailable {
                kind: error_info.kind,
            });
            return RecoveryOutcome::NoActions;
        }

        if self.execute_actions(&actions, error_info).await {
            info!(kind = ?error_info.kind, "Recovery successful");
            self.emit(RecoveryEvent::RecoverySuccessful {
                kind: error_info.kind,
            });
            RecoveryOutcome::Success
        } else {
            warn!(kind = ?error_info.kind, "All recovery actions failed");
            self.emit(RecoveryEvent::RecoveryFailed {
                kind: error_info.kind,
            });
            RecoveryOutcome::Failed
        }
    }

    /// 按优先级依次执行候选操作
    ///
    /// 第一个执行成功的操作即视为恢复成功；失败的操作会尽力回滚
    /// 后继续尝试下一个。全部失败返回 `false`
    async fn execute_actions(&self, actions: &[RecoveryAction], error_info: &ErrorInfo) -> bool {
        for action in actions {
            self.emit(RecoveryEvent::ActionStarted {
                description: action.description.to_string(),
                priority: action.priority,
            });

            match self.run_op(action.op).await {
                Ok(()) => {
                    self.emit(RecoveryEvent::ActionCompleted {
                        description: action.description.to_string(),
                    });
                    return true;
                }
                Err(error) => {
                    warn!(
                        action = action.description,
                        kind = ?error_info.kind,
                        error = %error,
                        "Recovery action failed"
                    );

                    // 回滚失败只记录，不影响后续尝试
                    if let Some(rollback) = action.rollback {
                        if let Err(rollback_error) = self.hooks.run(rollback).await {
                            warn!(error = %rollback_error, "Rollback failed");
                        }
                    }

                    self.emit(RecoveryEvent::ActionFailed {
                        description: action.description.to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }

        false
    }

    /// 执行单个恢复步骤
    ///
    /// 重试类步骤经由重试管理器执行，使用固定的操作键和预设配置
    async fn run_op(&self, op: RecoveryOp) -> anyhow::Result<()> {
        match op {
            RecoveryOp::ReconnectAsr => self
                .retry_with("asr_connection", op, RetryConfig::audio())
                .await,
            RecoveryOp::RegenerateQuestion => self
                .retry_with("question_generation", op, RetryConfig::network())
                .await,
            RecoveryOp::ReconnectNetwork => self
                .retry_with("network_connection", op, RetryConfig::network())
                .await,
            other => self.hooks.run(other).await,
        }
    }

    async fn retry_with(
        &self,
        key: &str,
        op: RecoveryOp,
        config: RetryConfig,
    ) -> anyhow::Result<()> {
        let hooks = Arc::clone(&self.hooks);
        self.retry_manager
            .retry(
                key,
                move || {
                    let hooks = Arc::clone(&hooks);
                    async move { hooks.run(op).await }
                },
                &config,
                RetryOptions::default(),
            )
            .await
            .map_err(anyhow::Error::from)
    }

    /// 当前是否有恢复在进行
    pub fn is_recovering(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// 获取重试管理器（用于状态查询）
    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry_manager
    }

    /// 中止所有恢复
    ///
    /// 清除重试状态并发出 [`RecoveryEvent::RecoveryAborted`]
    pub fn stop_all_recovery(&self) {
        debug!("Stopping all recovery");
        self.in_progress.store(false, Ordering::SeqCst);
        self.retry_manager.clear_all_retry_states();
        self.emit(RecoveryEvent::RecoveryAborted);
    }
}
