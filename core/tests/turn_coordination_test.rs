//! 轮次协调集成测试
//!
//! 使用可脚本化的音频电平源驱动语音活动检测，
//! 配合 tokio 暂停时钟验证计时行为

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vivaflow_lib::audio::{AudioLevelSource, AudioResult};
use vivaflow_lib::turn::{TurnConfig, TurnCoordinator, TurnEvent, TurnState};

/// 按脚本依次返回电平值的采样源，耗尽后重复最后一个值
struct ScriptedLevelSource {
    values: Mutex<VecDeque<f32>>,
    last: Mutex<f32>,
}

impl ScriptedLevelSource {
    fn new(values: &[f32]) -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(values.iter().copied().collect()),
            last: Mutex::new(0.0),
        })
    }
}

impl AudioLevelSource for ScriptedLevelSource {
    fn sample(&self) -> AudioResult<f32> {
        let mut values = self.values.lock().unwrap();
        match values.pop_front() {
            Some(value) => {
                *self.last.lock().unwrap() = value;
                Ok(value)
            }
            None => Ok(*self.last.lock().unwrap()),
        }
    }
}

/// 可由测试随时设置电平值的采样源
#[derive(Default)]
struct SettableLevelSource {
    level: Mutex<f32>,
}

impl SettableLevelSource {
    fn set(&self, level: f32) {
        *self.level.lock().unwrap() = level;
    }
}

impl AudioLevelSource for SettableLevelSource {
    fn sample(&self) -> AudioResult<f32> {
        Ok(*self.level.lock().unwrap())
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ==================== 语音活动检测场景 ====================

#[tokio::test(start_paused = true)]
async fn test_silence_auto_end_scenario() {
    // 每 1000ms 采样一次，静音阈值 3000ms
    let config = TurnConfig {
        poll_interval_ms: 1000,
        silence_threshold_ms: 3000,
        auto_end_timeout_ms: 60000,
        ..Default::default()
    };

    let coordinator = TurnCoordinator::new(config);
    let mut rx = coordinator.subscribe();

    // 首个值被 initialize 的探测消耗
    let source = ScriptedLevelSource::new(&[0.0, 0.02, 0.02, 0.0, 0.0, 0.0]);
    coordinator.initialize(source).unwrap();
    coordinator.start_listening();

    // 采样 1 (t=0): 0.02 -> 进入 UserSpeaking
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(coordinator.state(), TurnState::UserSpeaking);

    let events = drain(&mut rx);
    assert!(events.contains(&TurnEvent::UserStartedSpeaking));

    // 采样 2 (t=1000): 仍有语音；采样 3、4 静音累计 2000ms，不触发
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(coordinator.state(), TurnState::UserSpeaking);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, TurnEvent::UserFinishedSpeaking { .. })));

    // 采样 5 (t=4000): 静音累计 3000ms，自动结束
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(coordinator.state(), TurnState::Processing);

    let events = drain(&mut rx);
    let finished: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::UserFinishedSpeaking { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    assert_eq!(
        finished[0],
        &TurnEvent::UserFinishedSpeaking {
            manual: false,
            silence_ms: Some(3000),
        }
    );

    // 自动结束走的是静音路径，不应出现监听超时
    assert!(!events.contains(&TurnEvent::ListeningTimeout));

    coordinator.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_listening_timeout_path_uses_timeout_signal() {
    let config = TurnConfig {
        poll_interval_ms: 100,
        auto_end_timeout_ms: 5000,
        ..Default::default()
    };

    let coordinator = TurnCoordinator::new(config);
    let mut rx = coordinator.subscribe();

    // 始终静音
    let source = ScriptedLevelSource::new(&[0.0]);
    coordinator.initialize(source).unwrap();
    coordinator.start_listening();

    tokio::time::sleep(Duration::from_millis(5200)).await;

    // 超时不改变状态
    assert_eq!(coordinator.state(), TurnState::ListeningForUser);

    let events = drain(&mut rx);
    assert!(events.contains(&TurnEvent::ListeningTimeout));
    // 这条路径不发 UserFinishedSpeaking
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::UserFinishedSpeaking { .. })));

    coordinator.destroy();
}

// ==================== 轮次互斥 ====================

#[tokio::test(start_paused = true)]
async fn test_owners_never_overlap_across_sequences() {
    let coordinator = TurnCoordinator::new(TurnConfig {
        poll_interval_ms: 100,
        ..Default::default()
    });
    let mut rx = coordinator.subscribe();

    let source = Arc::new(SettableLevelSource::default());
    coordinator.initialize(source.clone()).unwrap();

    // AI 说话 -> 说完 -> 恢复监听 -> 用户说话 -> AI 打断
    coordinator.start_ai_turn();
    coordinator.on_ai_turn_complete();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(coordinator.state(), TurnState::ListeningForUser);

    source.set(0.5);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(coordinator.state(), TurnState::UserSpeaking);

    coordinator.start_ai_turn();
    assert_eq!(coordinator.state(), TurnState::AiSpeaking);

    // 事件流里每个时刻只有一个所有者
    let events = drain(&mut rx);
    for event in &events {
        if let TurnEvent::StateChanged { state } = event {
            assert!(
                !(state.is_ai_speaking() && state.is_user_speaking()),
                "state cannot be both owners"
            );
        }
    }

    coordinator.destroy();
}

#[tokio::test]
async fn test_manual_end_is_noop_outside_user_speaking() {
    let coordinator = TurnCoordinator::new(TurnConfig::default());
    let mut rx = coordinator.subscribe();

    coordinator.manual_end_speaking();
    assert_eq!(coordinator.state(), TurnState::Idle);
    assert!(drain(&mut rx).is_empty());

    coordinator.start_ai_turn();
    drain(&mut rx);
    coordinator.manual_end_speaking();
    assert_eq!(coordinator.state(), TurnState::AiSpeaking);
    assert!(drain(&mut rx).is_empty());
}

// ==================== 初始化与销毁 ====================

#[tokio::test]
async fn test_initialize_fails_when_probe_fails() {
    struct BrokenSource;

    impl AudioLevelSource for BrokenSource {
        fn sample(&self) -> AudioResult<f32> {
            Err(vivaflow_lib::audio::AudioError::LevelUnavailable(
                "no analyser".to_string(),
            ))
        }
    }

    let coordinator = TurnCoordinator::new(TurnConfig::default());
    assert!(coordinator.initialize(Arc::new(BrokenSource)).is_err());
}

#[tokio::test]
async fn test_double_initialize_is_rejected() {
    let coordinator = TurnCoordinator::new(TurnConfig::default());
    let source = ScriptedLevelSource::new(&[0.0]);

    assert!(coordinator.initialize(source.clone()).is_ok());
    assert!(coordinator.initialize(source).is_err());

    coordinator.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_sampling() {
    let coordinator = TurnCoordinator::new(TurnConfig {
        poll_interval_ms: 100,
        ..Default::default()
    });

    let source = ScriptedLevelSource::new(&[0.0]);
    coordinator.initialize(source).unwrap();

    let mut rx = coordinator.subscribe();
    coordinator.destroy();
    coordinator.destroy();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, TurnEvent::AudioLevel { .. })));
}

// ==================== 配置 ====================

#[tokio::test(start_paused = true)]
async fn test_config_update_changes_thresholds() {
    let coordinator = TurnCoordinator::new(TurnConfig::default());

    let mut config = coordinator.config();
    config.silence_threshold_ms = 1000;
    coordinator.update_config(config);

    assert_eq!(coordinator.config().silence_threshold_ms, 1000);
}
