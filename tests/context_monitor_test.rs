//! Context 监控集成测试

mod common;

use common::{FakeDriver, RecordingNotifier, ScriptedStatus};
use session_relay::service::CheckOutcome;
use session_relay::{ContextMonitor, ContextMonitorConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    driver: Arc<FakeDriver>,
    notifier: Arc<RecordingNotifier>,
    source: Arc<ScriptedStatus>,
    monitor: ContextMonitor,
}

fn fixture(usages: &[Option<f64>]) -> Fixture {
    let driver = Arc::new(FakeDriver::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let source = Arc::new(ScriptedStatus::new(usages));
    let monitor = ContextMonitor::new(
        ContextMonitorConfig::default(),
        source.clone(),
        driver.clone(),
        notifier.clone(),
        "1440",
    );
    Fixture {
        driver,
        notifier,
        source,
        monitor,
    }
}

#[tokio::test(start_paused = true)]
async fn test_compacts_above_threshold_with_unknown_result() {
    // Given: 使用率 0.85，压缩后状态接口不可用
    let f = fixture(&[Some(0.85), None]);

    // When
    let outcome = f.monitor.check_once().await;

    // Then: 发送一次 /compact，前后各通知一次
    assert_eq!(
        outcome,
        CheckOutcome::Compacted {
            before: 0.85,
            after: None
        }
    );
    assert_eq!(f.driver.sends(), vec!["/compact".to_string()]);

    let texts = f.notifier.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("85.0%"));
    assert!(texts[1].contains("85.0%"));
    assert!(texts[1].contains("未知"));
    assert_eq!(f.notifier.recipients(), vec!["1440", "1440"]);
    assert_eq!(f.monitor.last_usage(), None);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_is_inclusive() {
    let f = fixture(&[Some(0.8), Some(0.35)]);

    let outcome = f.monitor.check_once().await;

    assert_eq!(
        outcome,
        CheckOutcome::Compacted {
            before: 0.8,
            after: Some(0.35)
        }
    );
    assert!(f.notifier.texts()[1].contains("35.0%"));
    assert_eq!(f.monitor.last_usage(), Some(0.35));
}

#[tokio::test(start_paused = true)]
async fn test_below_threshold_does_nothing() {
    let f = fixture(&[Some(0.42)]);

    assert_eq!(f.monitor.check_once().await, CheckOutcome::Normal(0.42));
    assert!(f.driver.sends().is_empty());
    assert!(f.notifier.texts().is_empty());
    assert_eq!(f.monitor.last_usage(), Some(0.42));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_status_is_silent() {
    let f = fixture(&[None]);

    assert_eq!(f.monitor.check_once().await, CheckOutcome::Unknown);
    assert!(f.driver.sends().is_empty());
    assert!(f.notifier.texts().is_empty());
    assert_eq!(f.source.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_checks_compact_when_needed() {
    // Given: 第一轮正常，第二轮超过阈值，压缩后降到 0.3，之后接口不可用
    let f = fixture(&[Some(0.5), Some(0.9), Some(0.3)]);
    assert!(f.monitor.start());
    assert!(!f.monitor.start());

    // 第一个 tick 在 30s
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(f.source.fetches.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(f.monitor.last_usage(), Some(0.5));
    assert!(f.driver.sends().is_empty());

    // 第二个 tick 在 60s，压缩后等待 5s 再取状态
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(f.driver.sends(), vec!["/compact".to_string()]);
    assert_eq!(f.notifier.texts().len(), 2);
    assert_eq!(f.monitor.last_usage(), Some(0.3));

    // 状态未知的轮次不覆盖最近一次读数
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.monitor.last_usage(), Some(0.3));
    assert!(f.monitor.is_running());

    f.monitor.stop();
    assert!(!f.monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_notifies_and_keeps_running() {
    let f = fixture(&[Some(0.95), Some(0.95)]);
    f.driver.fail_send.store(true, Ordering::SeqCst);
    f.monitor.start();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let texts = f.notifier.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("compact"));
    assert!(texts[1].contains("错误"));

    // 下一轮照常执行
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.notifier.texts().len(), 4);
    assert_eq!(f.source.fetches.load(Ordering::SeqCst), 2);
    assert!(f.monitor.is_running());
    f.monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_does_not_block_compact() {
    let f = fixture(&[Some(0.9), Some(0.2)]);
    f.notifier.fail.store(true, Ordering::SeqCst);

    let outcome = f.monitor.check_once().await;

    assert_eq!(
        outcome,
        CheckOutcome::Compacted {
            before: 0.9,
            after: Some(0.2)
        }
    );
    assert_eq!(f.driver.sends().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_finishes_compaction_in_progress() {
    // Given: t=30s 开始压缩，之后等待 5s
    let f = fixture(&[Some(0.9), Some(0.4)]);
    f.monitor.start();
    tokio::time::sleep(Duration::from_secs(32)).await;
    assert_eq!(f.notifier.texts().len(), 1);

    // When
    f.monitor.shutdown().await;

    // Then: 压缩结果照常通知
    assert_eq!(f.notifier.texts().len(), 2);
    assert_eq!(f.monitor.last_usage(), Some(0.4));
    assert!(!f.monitor.is_running());
}
