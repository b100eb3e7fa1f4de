//! 错误恢复链路集成测试
//!
//! 从 reportError 到恢复引擎、重试管理器的端到端行为

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use vivaflow_lib::recovery::{
    CoordinatorConfig, CoordinatorEvent, ErrorClassifier, ErrorKind, RecoveryEngine,
    RecoveryEvent, RecoveryHooks, RecoveryOp, RecoveryOutcome, SessionErrorCoordinator,
    SessionSnapshot, Severity,
};
use vivaflow_lib::retry::RetryManager;

/// 记录调用顺序、按步骤决定成败的钩子
struct RecordingHooks {
    calls: Mutex<Vec<RecoveryOp>>,
    failing: Vec<RecoveryOp>,
}

impl RecordingHooks {
    fn new(failing: &[RecoveryOp]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: failing.to_vec(),
        })
    }

    fn calls(&self) -> Vec<RecoveryOp> {
        self.calls.lock().unwrap().clone()
    }
}

impl RecoveryHooks for RecordingHooks {
    fn run(&self, op: RecoveryOp) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.calls.lock().unwrap().push(op);
        let fail = self.failing.contains(&op);
        Box::pin(async move {
            if fail {
                Err(anyhow::anyhow!("{:?} is broken", op))
            } else {
                Ok(())
            }
        })
    }
}

fn engine_with(hooks: Arc<dyn RecoveryHooks>) -> Arc<RecoveryEngine> {
    Arc::new(RecoveryEngine::new(hooks, RetryManager::new()))
}

// ==================== 恢复操作顺序 ====================

#[tokio::test(start_paused = true)]
async fn test_asr_retry_before_text_fallback() {
    // 重试 ASR（优先级 8）必须先于文字降级（优先级 5）；
    // 重试失败后降级仍然执行，且整体恢复报告成功
    let hooks = RecordingHooks::new(&[RecoveryOp::ReconnectAsr]);
    let engine = engine_with(hooks.clone());

    let classifier = ErrorClassifier::new();
    let info = classifier.classify(&anyhow::anyhow!("ASR websocket refused"), None);
    assert_eq!(info.kind, ErrorKind::AsrConnectionFailed);

    let outcome = engine.recover(&info).await;
    assert_eq!(outcome, RecoveryOutcome::Success);

    let calls = hooks.calls();
    // AUDIO 预设内部重试 3 次，之后才轮到降级
    let first_fallback = calls
        .iter()
        .position(|op| *op == RecoveryOp::FallbackToText)
        .unwrap();
    assert!(calls[..first_fallback]
        .iter()
        .all(|op| *op == RecoveryOp::ReconnectAsr));
    assert_eq!(calls.last(), Some(&RecoveryOp::FallbackToText));
}

#[tokio::test(start_paused = true)]
async fn test_question_generation_action_chain() {
    // 重新生成（8）-> 备用问题（4）-> 跳过（3）
    let hooks = RecordingHooks::new(&[
        RecoveryOp::RegenerateQuestion,
        RecoveryOp::UseFallbackQuestion,
    ]);
    let engine = engine_with(hooks.clone());
    let mut events = engine.subscribe();

    let info = ErrorClassifier::new().classify_as(
        ErrorKind::QuestionGenerationFailed,
        Severity::High,
        "LLM 超时",
        None,
    );

    let outcome = engine.recover(&info).await;
    assert_eq!(outcome, RecoveryOutcome::Success);
    assert_eq!(hooks.calls().last(), Some(&RecoveryOp::SkipQuestion));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    // 前两个操作失败后第三个成功
    let failed = seen
        .iter()
        .filter(|e| matches!(e, RecoveryEvent::ActionFailed { .. }))
        .count();
    assert_eq!(failed, 2);
    assert!(seen.iter().any(|e| matches!(
        e,
        RecoveryEvent::ActionCompleted { description } if description == "跳过当前问题"
    )));
}

// ==================== 协调器端到端 ====================

fn coordinator_with(
    hooks: Arc<dyn RecoveryHooks>,
    config: CoordinatorConfig,
) -> SessionErrorCoordinator {
    let coordinator = SessionErrorCoordinator::new(
        config,
        Arc::new(ErrorClassifier::new()),
        engine_with(hooks),
    );
    coordinator.set_context(SessionSnapshot::default());
    coordinator
}

#[tokio::test(start_paused = true)]
async fn test_recovery_success_forgives_past_failures() {
    let hooks = RecordingHooks::new(&[]);
    let coordinator = coordinator_with(
        hooks,
        CoordinatorConfig {
            retry_delay_ms: 100,
            ..Default::default()
        },
    );

    coordinator
        .report_error(&anyhow::anyhow!("tts speech engine crashed"), None, None)
        .await;

    // 恢复成功后计数归零
    assert_eq!(coordinator.error_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ceiling_blocks_recovery_after_repeated_failures() {
    let hooks = RecordingHooks::new(&[
        RecoveryOp::ReconnectTts,
        RecoveryOp::SilentMode,
    ]);
    let coordinator = coordinator_with(
        hooks.clone(),
        CoordinatorConfig {
            retry_delay_ms: 0,
            max_retry_attempts: 2,
            ..Default::default()
        },
    );

    let mut events = coordinator.subscribe();

    for _ in 0..3 {
        coordinator
            .report_error(&anyhow::anyhow!("tts down"), None, None)
            .await;
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    // 第三次超过上限：发出 MaxRetriesExceeded 且不再尝试恢复
    assert!(seen
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::MaxRetriesExceeded { .. })));

    let recovery_attempts = seen
        .iter()
        .filter(|e| matches!(e, CoordinatorEvent::RecoveryFailed { .. }))
        .count();
    assert_eq!(recovery_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_follow_severity() {
    let hooks = RecordingHooks::new(&[]);
    let coordinator = coordinator_with(
        hooks,
        CoordinatorConfig {
            retry_delay_ms: 0,
            ..Default::default()
        },
    );
    let mut events = coordinator.subscribe();

    coordinator
        .report_error(
            &anyhow::anyhow!("mic broken"),
            Some(ErrorKind::MicrophoneAccessDenied),
            None,
        )
        .await;

    let mut notifications = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoordinatorEvent::ShowNotification { notification } = event {
            notifications.push(notification);
        }
    }

    // Critical 错误的通知持续显示
    assert!(notifications
        .iter()
        .any(|n| n.severity == Some(Severity::Critical) && n.duration_ms.is_none()));
}

#[tokio::test]
async fn test_manual_recovery_roundtrip() {
    let hooks = RecordingHooks::new(&[]);
    let coordinator = coordinator_with(hooks.clone(), CoordinatorConfig::default());

    assert!(coordinator.manual_recovery(ErrorKind::InterviewStateError).await);
    assert_eq!(hooks.calls(), vec![RecoveryOp::ResetSessionState]);
}

#[tokio::test(start_paused = true)]
async fn test_health_report_reflects_context_and_errors() {
    let hooks = RecordingHooks::new(&[RecoveryOp::ReconnectTts, RecoveryOp::SilentMode]);
    let coordinator = coordinator_with(
        hooks,
        CoordinatorConfig {
            retry_delay_ms: 0,
            ..Default::default()
        },
    );

    coordinator.update_context(|snapshot| {
        snapshot.is_audio_ready = true;
        snapshot.is_asr_connected = true;
        snapshot.is_tts_available = false;
    });

    let report = coordinator.check_system_health();
    assert!(!report.is_healthy);
    assert!(report.issues.iter().any(|issue| issue.contains("TTS")));
    assert_eq!(report.issues.len(), report.recommendations.len());
}
