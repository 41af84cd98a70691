//! 测试用的脚本化驱动、通知器和状态来源

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use session_relay::infra::{DriverError, SessionDriver};
use session_relay::monitor::CompletionHandler;
use session_relay::notification::Notifier;
use session_relay::service::{ResourceStatus, StatusSource, UnhealthyHandler};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 脚本化的会话驱动
///
/// `capture` 依次返回脚本内容，脚本耗尽后重复最后一次的结果；
/// `exists` 优先按脚本返回，脚本耗尽后反映 kill/ensure 之后的存活状态。
pub struct FakeDriver {
    captures: Mutex<VecDeque<Result<String, String>>>,
    last_capture: Mutex<String>,
    exists_script: Mutex<VecDeque<bool>>,
    alive: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_kill: AtomicBool,
    pub fail_ensure: AtomicBool,
    pub capture_calls: AtomicUsize,
    pub exists_calls: AtomicUsize,
    pub kill_calls: AtomicUsize,
    pub ensure_calls: AtomicUsize,
    sends: Mutex<Vec<String>>,
    send_delay: Mutex<Option<Duration>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            captures: Mutex::new(VecDeque::new()),
            last_capture: Mutex::new(String::new()),
            exists_script: Mutex::new(VecDeque::new()),
            alive: AtomicBool::new(true),
            fail_send: AtomicBool::new(false),
            fail_kill: AtomicBool::new(false),
            fail_ensure: AtomicBool::new(false),
            capture_calls: AtomicUsize::new(0),
            exists_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
            ensure_calls: AtomicUsize::new(0),
            sends: Mutex::new(Vec::new()),
            send_delay: Mutex::new(None),
        }
    }

    pub fn with_captures<I, S>(captures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let driver = Self::new();
        driver
            .captures
            .lock()
            .unwrap()
            .extend(captures.into_iter().map(|c| Ok(c.into())));
        driver
    }

    pub fn push_capture_error(&self, message: &str) {
        self.captures
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn with_exists_script(script: &[bool]) -> Self {
        let driver = Self::new();
        driver.exists_script.lock().unwrap().extend(script.iter().copied());
        driver
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// 让每次 send 先等待一段时间（模拟慢速 tmux 调用）
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn sends(&self) -> Vec<String> {
        self.sends.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDriver for FakeDriver {
    async fn exists(&self) -> Result<bool, DriverError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.exists_script.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(self.alive.load(Ordering::SeqCst))
    }

    async fn ensure(&self) -> Result<(), DriverError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ensure.load(Ordering::SeqCst) {
            return Err(DriverError::CommandFailed {
                op: "new-session",
                stderr: "duplicate session".to_string(),
            });
        }
        self.alive.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), DriverError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(DriverError::SessionMissing("fake".to_string()));
        }
        self.sends.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn capture(&self) -> Result<String, DriverError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.captures.lock().unwrap().pop_front();
        match next {
            Some(Ok(output)) => {
                *self.last_capture.lock().unwrap() = output.clone();
                Ok(output)
            }
            Some(Err(stderr)) => Err(DriverError::CommandFailed {
                op: "capture-pane",
                stderr,
            }),
            None => Ok(self.last_capture.lock().unwrap().clone()),
        }
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        if self.fail_kill.load(Ordering::SeqCst) {
            return Err(DriverError::CommandFailed {
                op: "kill-session",
                stderr: "no server running".to_string(),
            });
        }
        Ok(())
    }

    async fn info(&self) -> Result<String, DriverError> {
        Ok("fake 200x50 claude".to_string())
    }
}

/// 记录所有通知
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("chat not found"));
        }
        Ok(())
    }
}

/// 按脚本返回状态，脚本耗尽后返回 None
pub struct ScriptedStatus {
    script: Mutex<VecDeque<Option<ResourceStatus>>>,
    pub fetches: AtomicUsize,
}

impl ScriptedStatus {
    pub fn new(usages: &[Option<f64>]) -> Self {
        Self {
            script: Mutex::new(usages.iter().map(|u| u.map(status)).collect()),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn fetch(&self) -> Option<ResourceStatus> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().flatten()
    }
}

pub fn status(usage: f64) -> ResourceStatus {
    ResourceStatus {
        usage,
        token_count: (usage * 200_000.0) as u64,
        max_tokens: 200_000,
    }
}

/// 记录完成回调
#[derive(Default)]
pub struct RecordingHandler {
    outputs: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionHandler for RecordingHandler {
    async fn on_complete(&self, output: String) {
        self.outputs.lock().unwrap().push(output);
    }

    async fn on_failure(&self, error: &DriverError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

/// 统计升级次数
#[derive(Default)]
pub struct CountingHandler {
    pub escalations: AtomicUsize,
}

#[async_trait]
impl UnhealthyHandler for CountingHandler {
    async fn on_unhealthy(&self) {
        self.escalations.fetch_add(1, Ordering::SeqCst);
    }
}
