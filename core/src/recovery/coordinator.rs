use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::session::context::now_ms;
use crate::session::InterviewPhase;
use crate::turn::TurnState;

use super::classifier::{ErrorClassifier, ErrorInfo, ErrorKind, Severity};
use super::engine::{RecoveryEngine, RecoveryOutcome};

/// 会话错误协调器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// 是否启用自动恢复
    pub enable_auto_recovery: bool,
    /// 连续错误的最大重试次数
    pub max_retry_attempts: u32,
    /// 触发恢复前的等待时间（毫秒）
    pub retry_delay_ms: u64,
    /// 是否发送面向用户的错误通知
    pub show_error_notifications: bool,
    /// 是否记录错误详情日志
    pub log_error_details: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enable_auto_recovery: true,
            max_retry_attempts: 3,
            retry_delay_ms: 2000,
            show_error_notifications: true,
            log_error_details: true,
        }
    }
}

/// 会话上下文快照
///
/// 调用方通过 `set_context` / `update_context` 保持最新，
/// 恢复和健康检查都基于这份快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// 当前面试阶段
    pub interview_phase: InterviewPhase,
    /// 当前轮次状态
    pub turn_state: TurnState,
    /// 当前问题（如果有）
    pub current_question: Option<String>,
    /// 音频服务是否就绪
    pub is_audio_ready: bool,
    /// ASR 是否已连接
    pub is_asr_connected: bool,
    /// TTS 是否可用
    pub is_tts_available: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            interview_phase: InterviewPhase::Idle,
            turn_state: TurnState::Idle,
            current_question: None,
            is_audio_ready: false,
            is_asr_connected: false,
            is_tts_available: false,
        }
    }
}

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Error,
    Success,
}

/// 面向用户的通知
///
/// `duration_ms = None` 表示持续显示，直到用户关闭或恢复成功
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub duration_ms: Option<u64>,
    pub severity: Option<Severity>,
}

impl Notification {
    /// 错误通知，显示时长随严重程度缩放
    fn for_error(info: &ErrorInfo) -> Self {
        let duration_ms = match info.severity {
            Severity::Low => Some(2000),
            Severity::Medium => Some(5000),
            // High / Critical 持续显示
            Severity::High | Severity::Critical => None,
        };

        Self {
            level: NotificationLevel::Error,
            message: info.kind.user_message().to_string(),
            duration_ms,
            severity: Some(info.severity),
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
            duration_ms: Some(3000),
            severity: None,
        }
    }
}

/// 协调器事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoordinatorEvent {
    /// 发生错误
    ErrorOccurred { info: ErrorInfo },
    /// 显示通知
    ShowNotification { notification: Notification },
    /// 恢复成功
    RecoverySuccessful { kind: ErrorKind },
    /// 恢复失败
    RecoveryFailed { kind: ErrorKind },
    /// 没有可用的恢复方案
    NoRecoveryAvailable { kind: ErrorKind },
    /// 连续错误超过最大重试次数
    MaxRetriesExceeded { info: ErrorInfo },
}

/// 系统健康检查结果
///
/// 仅用于展示，不参与控制流
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// 错误统计
#[derive(Debug, Clone)]
pub struct ErrorStats {
    pub total_errors: u32,
    pub last_error_ms: u64,
    pub recent_errors: Vec<ErrorInfo>,
}

/// 会话错误协调器
///
/// 面向会话层的错误门面：接收原始错误，维护连续错误计数，
/// 强制最大重试上限，触发恢复引擎并向上发出用户通知。
/// 一次成功的恢复会清零错误计数（干净的恢复赦免过去的失败）
pub struct SessionErrorCoordinator {
    config: Mutex<CoordinatorConfig>,
    classifier: Arc<ErrorClassifier>,
    engine: Arc<RecoveryEngine>,
    context: Mutex<Option<SessionSnapshot>>,
    error_count: AtomicU32,
    last_error_ms: AtomicU64,
    listeners: Mutex<Vec<mpsc::Sender<CoordinatorEvent>>>,
}

impl SessionErrorCoordinator {
    /// 创建协调器
    pub fn new(
        config: CoordinatorConfig,
        classifier: Arc<ErrorClassifier>,
        engine: Arc<RecoveryEngine>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            classifier,
            engine,
            context: Mutex::new(None),
            error_count: AtomicU32::new(0),
            last_error_ms: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 订阅协调器事件
    pub fn subscribe(&self) -> mpsc::Receiver<CoordinatorEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    fn emit(&self, event: CoordinatorEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            let _ = listener.try_send(event.clone());
        }
    }

    /// 设置会话上下文快照
    pub fn set_context(&self, snapshot: SessionSnapshot) {
        *self.context.lock().unwrap() = Some(snapshot);
    }

    /// 就地更新会话上下文
    ///
    /// 上下文尚未设置时不做任何事
    pub fn update_context<F>(&self, update: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        if let Some(snapshot) = self.context.lock().unwrap().as_mut() {
            update(snapshot);
        }
    }

    /// 获取当前上下文快照
    pub fn context(&self) -> Option<SessionSnapshot> {
        self.context.lock().unwrap().clone()
    }

    /// 上报一个错误
    ///
    /// 记录并通知后，若启用自动恢复则等待 `retry_delay_ms`，
    /// 检查连续错误计数：超过上限发出 `MaxRetriesExceeded`（不再尝试
    /// 恢复），否则交给恢复引擎。恢复成功清零计数并发出确认；
    /// 失败则发出需要人工介入的高严重度通知
    pub async fn report_error(
        &self,
        raw: &anyhow::Error,
        kind: Option<ErrorKind>,
        severity: Option<Severity>,
    ) {
        let context = self
            .context
            .lock()
            .unwrap()
            .as_ref()
            .map(|snapshot| format!("{:?}", snapshot.interview_phase));

        let info = match kind {
            Some(kind) => self.classifier.classify_as(
                kind,
                severity.unwrap_or_else(|| kind.default_severity()),
                raw.to_string(),
                context,
            ),
            None => self.classifier.classify(raw, context),
        };

        self.handle_error(info).await;
    }

    async fn handle_error(&self, info: ErrorInfo) {
        let config = self.config.lock().unwrap().clone();

        let count = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_error_ms.store(now_ms(), Ordering::SeqCst);

        if config.log_error_details {
            error!(
                kind = ?info.kind,
                severity = ?info.severity,
                message = %info.message,
                context = ?info.context,
                consecutive = count,
                "Interview session error"
            );
        }

        self.emit(CoordinatorEvent::ErrorOccurred { info: info.clone() });

        if config.show_error_notifications {
            self.emit(CoordinatorEvent::ShowNotification {
                notification: Notification::for_error(&info),
            });
        }

        if !config.enable_auto_recovery {
            return;
        }

        // 等待重试延迟后再恢复，给瞬时故障自愈的机会
        if config.retry_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
        }

        if count > config.max_retry_attempts {
            self.on_max_retries_exceeded(&info, &config);
            return;
        }

        if self.context.lock().unwrap().is_none() {
            warn!("No session context available for recovery");
            return;
        }

        match self.engine.recover(&info).await {
            RecoveryOutcome::Success => {
                info!(kind = ?info.kind, "Recovery successful, error counter reset");
                // 干净的恢复赦免过去的失败
                self.error_count.store(0, Ordering::SeqCst);
                self.emit(CoordinatorEvent::RecoverySuccessful { kind: info.kind });

                if config.show_error_notifications {
                    self.emit(CoordinatorEvent::ShowNotification {
                        notification: Notification::success("问题已自动修复"),
                    });
                }
            }
            RecoveryOutcome::Failed => {
                warn!(kind = ?info.kind, "Recovery failed, manual intervention required");
                self.emit(CoordinatorEvent::RecoveryFailed { kind: info.kind });

                if config.show_error_notifications {
                    let failure = ErrorInfo::new(
                        ErrorKind::RecoveryFailed,
                        Severity::High,
                        ErrorKind::RecoveryFailed.user_message(),
                    );
                    self.emit(CoordinatorEvent::ShowNotification {
                        notification: Notification::for_error(&failure),
                    });
                }
            }
            RecoveryOutcome::NoActions | RecoveryOutcome::Busy => {
                self.emit(CoordinatorEvent::NoRecoveryAvailable { kind: info.kind });

                if config.show_error_notifications {
                    let unavailable = ErrorInfo::new(
                        ErrorKind::NoRecoveryAvailable,
                        Severity::Medium,
                        ErrorKind::NoRecoveryAvailable.user_message(),
                    );
                    self.emit(CoordinatorEvent::ShowNotification {
                        notification: Notification::for_error(&unavailable),
                    });
                }
            }
        }
    }

    fn on_max_retries_exceeded(&self, info: &ErrorInfo, config: &CoordinatorConfig) {
        error!(kind = ?info.kind, "Max retries exceeded, giving up on auto recovery");

        self.emit(CoordinatorEvent::MaxRetriesExceeded { info: info.clone() });

        if config.show_error_notifications {
            let exceeded = ErrorInfo::new(
                ErrorKind::MaxRetriesExceeded,
                Severity::High,
                ErrorKind::MaxRetriesExceeded.user_message(),
            );
            self.emit(CoordinatorEvent::ShowNotification {
                notification: Notification::for_error(&exceeded),
            });
        }
    }

    /// 手动触发一次恢复
    ///
    /// 返回恢复是否成功；上下文未设置时直接返回 `false`
    pub async fn manual_recovery(&self, kind: ErrorKind) -> bool {
        if self.context.lock().unwrap().is_none() {
            warn!("No session context available for manual recovery");
            return false;
        }

        let info = self.classifier.classify_as(
            kind,
            Severity::Medium,
            "Manual recovery triggered",
            None,
        );

        matches!(self.engine.recover(&info).await, RecoveryOutcome::Success)
    }

    /// 清零连续错误计数
    pub fn reset_error_count(&self) {
        self.error_count.store(0, Ordering::SeqCst);
    }

    /// 当前连续错误计数
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// 获取错误统计
    pub fn error_stats(&self) -> ErrorStats {
        ErrorStats {
            total_errors: self.error_count.load(Ordering::SeqCst),
            last_error_ms: self.last_error_ms.load(Ordering::SeqCst),
            recent_errors: self.classifier.recent(10),
        }
    }

    /// 检查系统健康状态
    ///
    /// 基于上下文标志位和错误频率给出检查结果与修复建议，
    /// 仅用于展示，不参与控制流
    pub fn check_system_health(&self) -> HealthReport {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let Some(snapshot) = self.context.lock().unwrap().clone() else {
            return HealthReport {
                is_healthy: false,
                issues: vec!["面试上下文未设置".to_string()],
                recommendations: vec!["请初始化面试上下文".to_string()],
            };
        };

        if !snapshot.is_audio_ready {
            issues.push("音频服务未就绪".to_string());
            recommendations.push("检查麦克风权限和音频设备".to_string());
        }

        if !snapshot.is_asr_connected {
            issues.push("语音识别服务未连接".to_string());
            recommendations.push("检查ASR服务状态和网络连接".to_string());
        }

        if !snapshot.is_tts_available {
            issues.push("TTS服务不可用".to_string());
            recommendations.push("检查TTS服务配置".to_string());
        }

        // 每分钟错误数
        let last_error = self.last_error_ms.load(Ordering::SeqCst);
        if last_error > 0 {
            let elapsed_minutes =
                ((now_ms().saturating_sub(last_error)) as f64 / 60000.0).max(1.0);
            let error_rate = self.error_count.load(Ordering::SeqCst) as f64 / elapsed_minutes;
            if error_rate > 5.0 {
                issues.push("错误频率过高".to_string());
                recommendations.push("检查系统配置和网络稳定性".to_string());
            }
        }

        HealthReport {
            is_healthy: issues.is_empty(),
            issues,
            recommendations,
        }
    }

    /// 更新配置
    pub fn update_config(&self, config: CoordinatorConfig) {
        *self.config.lock().unwrap() = config;
    }

    /// 获取当前配置
    pub fn config(&self) -> CoordinatorConfig {
        self.config.lock().unwrap().clone()
    }

    /// 销毁协调器
    ///
    /// 中止恢复并清空监听器，可重复调用
    pub fn destroy(&self) {
        self.engine.stop_all_recovery();
        self.listeners.lock().unwrap().clear();
    }
}
