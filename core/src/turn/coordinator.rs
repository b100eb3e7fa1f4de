use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::AudioLevelSource;
use crate::utils::ScopedTimer;

use super::error::{TurnError, TurnResult};

/// 轮次协调器配置
///
/// 静音阈值和恢复延迟是根据真实麦克风延迟调校出来的经验值，
/// 作为可覆盖的默认配置保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// 静音阈值（毫秒），用户停顿超过该时长视为说完
    pub silence_threshold_ms: u64,

    /// 音量阈值 (0-1)，超过该值视为有语音活动
    pub volume_threshold: f32,

    /// AI 说完后延迟恢复监听的时间（毫秒），避免尾音误触发
    pub resume_delay_ms: u64,

    /// 监听状态下无语音自动超时时间（毫秒）
    pub auto_end_timeout_ms: u64,

    /// 音频电平轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 3000,
            volume_threshold: 0.01,
            resume_delay_ms: 500,
            auto_end_timeout_ms: 5000,
            poll_interval_ms: 100,
        }
    }
}

/// 轮次状态
///
/// 表示当前"话筒"归属：同一时刻 AI 说话与用户说话互斥
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// 空闲状态
    Idle,

    /// AI 正在说话（暂停语音识别采集）
    AiSpeaking,

    /// 正在监听用户，等待语音活动
    ListeningForUser,

    /// 用户正在说话
    UserSpeaking,

    /// 处理中（回合交接的中间状态）
    Processing,
}

impl TurnState {
    /// 获取状态名称（用于日志和调试）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::AiSpeaking => "AiSpeaking",
            Self::ListeningForUser => "ListeningForUser",
            Self::UserSpeaking => "UserSpeaking",
            Self::Processing => "Processing",
        }
    }

    /// 获取面向用户的状态描述
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "空闲",
            Self::AiSpeaking => "AI正在说话",
            Self::ListeningForUser => "等待您说话",
            Self::UserSpeaking => "正在录制",
            Self::Processing => "处理中",
        }
    }

    /// 检查是否空闲
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// 检查 AI 是否正在说话
    pub fn is_ai_speaking(&self) -> bool {
        matches!(self, Self::AiSpeaking)
    }

    /// 检查用户是否正在说话
    pub fn is_user_speaking(&self) -> bool {
        matches!(self, Self::UserSpeaking)
    }
}

/// 轮次事件
///
/// 通过订阅通道发送给上层的事件，每个变体携带精确的载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum TurnEvent {
    /// 轮次状态变更
    StateChanged { state: TurnState },

    /// 音频电平采样
    AudioLevel { volume: f32, timestamp_ms: u64 },

    /// 开始监听用户
    ListeningStarted,

    /// 停止监听用户
    ListeningStopped,

    /// 检测到用户开始说话
    UserStartedSpeaking,

    /// 用户说话结束
    UserFinishedSpeaking {
        /// 是否手动结束
        manual: bool,
        /// 自动结束时的静音时长（毫秒）
        silence_ms: Option<u64>,
    },

    /// 监听超时，未检测到用户说话（不改变状态）
    ListeningTimeout,
}

/// 协调器内部共享状态
struct TurnShared {
    state: ArcSwap<TurnState>,
    config: Mutex<TurnConfig>,
    last_speech: Mutex<Option<Instant>>,
    listeners: Mutex<Vec<mpsc::Sender<TurnEvent>>>,
    auto_end_timer: Mutex<Option<ScopedTimer>>,
    resume_timer: Mutex<Option<ScopedTimer>>,
    epoch: Instant,
}

impl TurnShared {
    fn current(&self) -> TurnState {
        **self.state.load()
    }

    /// 通知所有监听者
    ///
    /// 按订阅顺序同步投递；已关闭的接收端跳过并记录日志
    fn emit(&self, event: TurnEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            if listener.try_send(event.clone()).is_err() {
                debug!("Turn event listener dropped or full, skipping");
            }
        }
    }

    fn set_state(&self, new_state: TurnState) {
        self.state.store(Arc::new(new_state));
        self.emit(TurnEvent::StateChanged { state: new_state });
    }

    fn cancel_auto_end_timer(&self) {
        if let Some(mut timer) = self.auto_end_timer.lock().unwrap().take() {
            timer.cancel();
        }
    }

    fn cancel_resume_timer(&self) {
        if let Some(mut timer) = self.resume_timer.lock().unwrap().take() {
            timer.cancel();
        }
    }
}

/// 轮次协调器
///
/// 负责采样音频电平做语音活动检测，并维护 5 状态的轮次状态机，
/// 保证同一时刻话筒只属于 AI 或用户一方
///
/// # 状态机
///
/// ```text
/// Idle ── start_ai_turn ──> AiSpeaking
/// AiSpeaking ── on_ai_turn_complete ──> Processing ──(resume_delay)──> ListeningForUser
/// ListeningForUser ──(音量超过阈值)──> UserSpeaking
/// UserSpeaking ──(静音超过阈值 / manual_end_speaking)──> Processing
/// 任意状态 ── reset ──> Idle
/// ```
///
/// 未列出的转换会记录警告并忽略（真实音频时序下轮次竞争是预期行为）
pub struct TurnCoordinator {
    shared: Arc<TurnShared>,
    sampling_task: Mutex<Option<JoinHandle<()>>>,
}

impl TurnCoordinator {
    /// 创建新的轮次协调器
    pub fn new(config: TurnConfig) -> Self {
        Self {
            shared: Arc::new(TurnShared {
                state: ArcSwap::new(Arc::new(TurnState::Idle)),
                config: Mutex::new(config),
                last_speech: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                auto_end_timer: Mutex::new(None),
                resume_timer: Mutex::new(None),
                epoch: Instant::now(),
            }),
            sampling_task: Mutex::new(None),
        }
    }

    /// 初始化：获取音频电平采样能力并启动轮询
    ///
    /// 先探测一次采样能力，失败则返回 [`TurnError::AudioAcquisition`]，
    /// 调用方不应假定可以恢复
    pub fn initialize(&self, source: Arc<dyn AudioLevelSource>) -> TurnResult<()> {
        let mut task_guard = self.sampling_task.lock().unwrap();
        if task_guard.is_some() {
            return Err(TurnError::AlreadyInitialized);
        }

        // 探测采样能力
        source.sample()?;

        let shared = Arc::clone(&self.shared);
        let poll_interval = {
            let config = shared.config.lock().unwrap();
            Duration::from_millis(config.poll_interval_ms)
        };

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let volume = match source.sample() {
                    Ok(volume) => volume,
                    Err(e) => {
                        // 采样失败不中断轮询循环
                        warn!("Audio level sampling failed: {}", e);
                        continue;
                    }
                };

                let now = Instant::now();
                let timestamp_ms = now.duration_since(shared.epoch).as_millis() as u64;

                shared.emit(TurnEvent::AudioLevel {
                    volume,
                    timestamp_ms,
                });

                Self::handle_voice_activity(&shared, volume, now);
            }
        });

        *task_guard = Some(handle);
        info!("Turn coordinator initialized");
        Ok(())
    }

    /// 订阅轮次事件
    pub fn subscribe(&self) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.shared.listeners.lock().unwrap().push(tx);
        rx
    }

    /// 移除所有已关闭的监听器
    pub fn cleanup_listeners(&self) {
        self.shared
            .listeners
            .lock()
            .unwrap()
            .retain(|tx| !tx.is_closed());
    }

    /// 获取当前轮次状态
    pub fn state(&self) -> TurnState {
        self.shared.current()
    }

    /// 获取当前配置
    pub fn config(&self) -> TurnConfig {
        self.shared.config.lock().unwrap().clone()
    }

    /// 更新配置
    ///
    /// 轮询间隔在初始化后不可变更，其余阈值即时生效
    pub fn update_config(&self, config: TurnConfig) {
        *self.shared.config.lock().unwrap() = config;
    }

    /// AI 开始说话
    ///
    /// 从任意状态进入 `AiSpeaking`；已处于 `AiSpeaking` 时记录警告并忽略。
    /// 取消所有挂起的定时器
    pub fn start_ai_turn(&self) {
        let previous = self.shared.current();
        if previous == TurnState::AiSpeaking {
            warn!("AI turn already in progress");
            return;
        }

        self.shared.cancel_auto_end_timer();
        self.shared.cancel_resume_timer();

        if matches!(
            previous,
            TurnState::ListeningForUser | TurnState::UserSpeaking
        ) {
            self.shared.emit(TurnEvent::ListeningStopped);
        }

        self.shared.set_state(TurnState::AiSpeaking);
        debug!("AI turn started (from {})", previous.name());
    }

    /// AI 说话完成
    ///
    /// `AiSpeaking -> Processing`，延迟 `resume_delay_ms` 后若仍处于
    /// `Processing` 则自动转入 `ListeningForUser`（期间发生其他状态
    /// 变更会取消恢复）
    pub fn on_ai_turn_complete(&self) {
        if self.shared.current() != TurnState::AiSpeaking {
            warn!("AI turn complete but not in AiSpeaking state");
            return;
        }

        self.shared.set_state(TurnState::Processing);

        let shared = Arc::clone(&self.shared);
        let resume_delay = {
            let config = shared.config.lock().unwrap();
            Duration::from_millis(config.resume_delay_ms)
        };

        let timer = ScopedTimer::arm(resume_delay, move || {
            // 期间的并发状态变更会使恢复失效
            if shared.current() == TurnState::Processing {
                Self::begin_listening(&shared);
            } else {
                debug!("Resume to listening cancelled by concurrent state change");
            }
        });

        *self.shared.resume_timer.lock().unwrap() = Some(timer);
    }

    /// 开始监听用户
    ///
    /// 重置语音时间戳并启动自动结束定时器
    pub fn start_listening(&self) {
        if self.shared.current() == TurnState::ListeningForUser {
            warn!("Already listening for user");
            return;
        }

        Self::begin_listening(&self.shared);
    }

    /// 停止监听
    ///
    /// 仅在 `ListeningForUser` / `UserSpeaking` 状态下生效，回到 `Idle`
    pub fn stop_listening(&self) {
        let current = self.shared.current();
        if !matches!(
            current,
            TurnState::ListeningForUser | TurnState::UserSpeaking
        ) {
            return;
        }

        self.shared.cancel_auto_end_timer();
        self.shared.emit(TurnEvent::ListeningStopped);
        self.shared.set_state(TurnState::Idle);
        debug!("Listening stopped");
    }

    /// 手动结束用户说话
    ///
    /// 仅在 `UserSpeaking` 状态下生效，其他状态下不改变状态也不发事件
    pub fn manual_end_speaking(&self) {
        if self.shared.current() != TurnState::UserSpeaking {
            warn!("Manual end speaking ignored: user is not speaking");
            return;
        }

        self.shared.cancel_auto_end_timer();
        self.shared.emit(TurnEvent::UserFinishedSpeaking {
            manual: true,
            silence_ms: None,
        });
        self.shared.set_state(TurnState::Processing);
        info!("User speaking ended manually");
    }

    /// 重置到空闲状态
    ///
    /// 无条件回到 `Idle` 并清除所有定时器
    pub fn reset(&self) {
        self.shared.cancel_auto_end_timer();
        self.shared.cancel_resume_timer();
        *self.shared.last_speech.lock().unwrap() = None;
        self.shared.set_state(TurnState::Idle);
        info!("Turn coordinator reset to idle");
    }

    /// 检查是否可以开始监听
    pub fn can_start_listening(&self) -> bool {
        matches!(
            self.shared.current(),
            TurnState::Idle | TurnState::Processing
        )
    }

    /// 检查是否可以开始 AI 说话
    pub fn can_start_ai_turn(&self) -> bool {
        self.shared.current() != TurnState::AiSpeaking
    }

    /// 销毁协调器
    ///
    /// 释放采样能力并清除所有定时器，可重复调用
    pub fn destroy(&self) {
        if let Some(task) = self.sampling_task.lock().unwrap().take() {
            task.abort();
        }

        self.shared.cancel_auto_end_timer();
        self.shared.cancel_resume_timer();
        self.shared.listeners.lock().unwrap().clear();
        debug!("Turn coordinator destroyed");
    }

    /// 进入监听状态并启动自动结束定时器
    fn begin_listening(shared: &Arc<TurnShared>) {
        shared.cancel_auto_end_timer();
        *shared.last_speech.lock().unwrap() = None;

        let timeout = {
            let config = shared.config.lock().unwrap();
            Duration::from_millis(config.auto_end_timeout_ms)
        };

        let timer_shared = Arc::clone(shared);
        let timer = ScopedTimer::arm(timeout, move || {
            // 超时只发信号，不改变状态
            if timer_shared.current() == TurnState::ListeningForUser {
                info!("Listening timed out without speech");
                timer_shared.emit(TurnEvent::ListeningTimeout);
            }
        });
        *shared.auto_end_timer.lock().unwrap() = Some(timer);

        shared.emit(TurnEvent::ListeningStarted);
        shared.set_state(TurnState::ListeningForUser);
        info!("Listening for user started");
    }

    /// 语音活动检测（每个采样周期调用一次）
    fn handle_voice_activity(shared: &Arc<TurnShared>, volume: f32, now: Instant) {
        let (volume_threshold, silence_threshold) = {
            let config = shared.config.lock().unwrap();
            (
                config.volume_threshold,
                Duration::from_millis(config.silence_threshold_ms),
            )
        };

        let is_speaking = volume > volume_threshold;

        match shared.current() {
            TurnState::ListeningForUser => {
                if is_speaking {
                    // 检测到用户开始说话
                    *shared.last_speech.lock().unwrap() = Some(now);
                    shared.cancel_auto_end_timer();

                    shared.emit(TurnEvent::UserStartedSpeaking);
                    shared.set_state(TurnState::UserSpeaking);
                    info!("User started speaking");
                }
            }
            TurnState::UserSpeaking => {
                if is_speaking {
                    *shared.last_speech.lock().unwrap() = Some(now);
                } else {
                    let last_speech = *shared.last_speech.lock().unwrap();
                    if let Some(last) = last_speech {
                        let silence = now.duration_since(last);
                        if silence >= silence_threshold {
                            // 静音足够长，自动结束说话
                            let silence_ms = silence.as_millis() as u64;
                            shared.emit(TurnEvent::UserFinishedSpeaking {
                                manual: false,
                                silence_ms: Some(silence_ms),
                            });
                            shared.set_state(TurnState::Processing);
                            info!(
                                silence_ms,
                                "User finished speaking (auto detected)"
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

impl Drop for TurnCoordinator {
    fn drop(&mut self) {
        self.destroy();
    }
}
