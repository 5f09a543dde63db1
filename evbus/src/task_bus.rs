//! Fire-and-forget 分发引擎（TaskEventBus）
//!
//! `publish` 只做同步部分（构造主题与消息），随后为本次分发派生一个 tokio 任务并立即返回：
//! - 后台任务以可挂起方式获取注册表锁，取出按注册顺序排列的匹配订阅快照后立即释放锁，
//!   再依次调用快照中的处理器；快照之后的订阅/退订不影响本次分发；
//! - 异步订阅者在后台任务中以其异步形式被 await（不经由阻塞的同步形式），
//!   同步订阅者直接调用；
//! - 不同 `publish` 的后台任务之间完成顺序不定；
//! - 处理器失败（返回 `Err` 或 panic）不会回到任何 `publish` 调用方：记录日志并交给可选的
//!   `FailureHook`，且中止该任务内剩余处理器的调用。
//!
use bon::bon;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::trace;

use crate::bus::EventBus;
use crate::error::{BusError, BusResult};
use crate::failure::{FailureHook, panic_message, report};
use crate::registry::SubscriptionRegistry;
use crate::subscription::{ErasedMessage, Subscription, erase};
use crate::topic::{Message, Topic};

/// 基于 tokio 任务的事件总线
pub struct TaskEventBus {
    registry: Arc<SubscriptionRegistry>,
    runtime: Handle,
    on_failure: Option<FailureHook>,
}

#[bon]
impl TaskEventBus {
    /// - `runtime`：后台任务所在的运行时，缺省取当前上下文的运行时；
    /// - `on_failure`：后台分发失败的观测钩子。
    #[builder]
    pub fn new(runtime: Option<Handle>, on_failure: Option<FailureHook>) -> BusResult<Self> {
        let runtime = match runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BusError::NoRuntime)?,
        };

        Ok(Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            runtime,
            on_failure,
        })
    }
}

impl TaskEventBus {
    async fn dispatch(
        registry: &SubscriptionRegistry,
        topic: Topic,
        message: &ErasedMessage,
    ) -> BusResult<()> {
        let snapshot: Vec<Subscription> = registry
            .lock()
            .await
            .matching(topic, message)
            .cloned()
            .collect();

        for subscription in &snapshot {
            AssertUnwindSafe(subscription.dispatch(message))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))))
                .map_err(|source| BusError::subscriber(topic.name(), subscription.id(), source))?;
        }
        Ok(())
    }
}

impl EventBus for TaskEventBus {
    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish<T: Message>(&self, message: T) -> BusResult<()> {
        let (topic, message) = erase(message);
        trace!(topic = %topic, "scheduling background dispatch");

        let registry = Arc::clone(&self.registry);
        let on_failure = self.on_failure.clone();
        self.runtime.spawn(async move {
            if let Err(err) = Self::dispatch(&registry, topic, &message).await {
                report(on_failure.as_ref(), err);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscriber;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Job(usize);

    async fn wait_until(cond: impl Fn() -> bool) {
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
    }

    #[test]
    fn construction_outside_runtime_fails() {
        let err = TaskEventBus::builder().build().err();
        assert!(matches!(err, Some(BusError::NoRuntime)));
    }

    #[test]
    fn explicit_handle_allows_construction_outside_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let bus = TaskEventBus::builder()
            .runtime(rt.handle().clone())
            .build()
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.subscribe(Subscriber::new(move |_: &Job| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        bus.publish(Job(1)).unwrap();

        rt.block_on(wait_until(|| hits.load(Ordering::SeqCst) == 1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_returns_before_dispatch_completes() {
        let bus = TaskEventBus::builder().build().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let done = Arc::new(AtomicUsize::new(0));

        let (g, d) = (gate.clone(), done.clone());
        bus.subscribe(Subscriber::future(move |_: Arc<Job>| {
            let (g, d) = (g.clone(), d.clone());
            async move {
                g.notified().await;
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        bus.publish(Job(0)).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 0);

        gate.notify_one();
        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_go_to_hook_not_caller() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let bus = TaskEventBus::builder()
            .on_failure(Arc::new(move |err: BusError| {
                sink.lock().unwrap().push(err.to_string())
            }))
            .build()
            .unwrap();

        let skipped = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Subscriber::new(|j: &Job| {
            anyhow::ensure!(j.0 != 3, "job 3 rejected");
            Ok(())
        }));
        let counter = skipped.clone();
        bus.subscribe(Subscriber::new(move |_: &Job| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert!(bus.publish(Job(3)).is_ok());
        wait_until(|| !failures.lock().unwrap().is_empty()).await;

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("job 3 rejected"));
        // 失败中止了同一次分发内的后续处理器
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blocking_subscribe_while_dispatch_is_suspended_on_current_thread() {
        let bus = TaskEventBus::builder().build().unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let (s, d) = (started.clone(), done.clone());
        bus.subscribe(Subscriber::future(move |_: Arc<Job>| {
            let (s, d) = (s.clone(), d.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        bus.publish(Job(0)).unwrap();
        for _ in 0..100 {
            if started.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // 分发挂起期间注册表锁已释放，阻塞式调用不会卡住唯一的工作线程
        let id = bus.subscribe(Subscriber::new(|_: &Job| Ok(())));
        assert_eq!(bus.registry().subscriber_count::<Job>(), 2);
        bus.unsubscribe::<Job>(id);

        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_handler_reaches_hook() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let bus = TaskEventBus::builder()
            .on_failure(Arc::new(move |err: BusError| {
                sink.lock().unwrap().push(err)
            }))
            .build()
            .unwrap();

        bus.subscribe(Subscriber::new(|j: &Job| -> anyhow::Result<()> {
            panic!("job {} exploded", j.0)
        }));

        bus.publish(Job(9)).unwrap();
        wait_until(|| !failures.lock().unwrap().is_empty()).await;

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_subscriber_failure());
        assert!(failures[0].to_string().contains("job 9 exploded"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsubscribe_during_dispatch_keeps_snapshot() {
        let bus = TaskEventBus::builder().build().unwrap();
        let gate = tokio_util::sync::CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(AtomicUsize::new(0));

        let (g, s) = (gate.clone(), started.clone());
        bus.subscribe(Subscriber::future(move |_: Arc<Job>| {
            let (g, s) = (g.clone(), s.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                g.cancelled().await;
                Ok(())
            }
        }));
        let counter = late.clone();
        let second = bus.subscribe(Subscriber::new(move |_: &Job| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        bus.publish(Job(0)).unwrap();
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;

        // 快照已取出：退订发生在分发过程中
        bus.unsubscribe::<Job>(second);
        assert_eq!(bus.registry().subscriber_count::<Job>(), 1);
        gate.cancel();

        wait_until(|| late.load(Ordering::SeqCst) == 1).await;
        assert_eq!(late.load(Ordering::SeqCst), 1);

        bus.publish(Job(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }
}
