//! 同步分发引擎（SyncEventBus）
//!
//! 在调用方线程上、持有注册表锁期间依次调用所有匹配的处理器：
//! - 同一实例上的发布与订阅/退订严格全序，临界区互不重叠；
//! - 首个失败（返回 `Err` 或 panic）的处理器中止本次分发，错误在释放锁后返回调用方；
//! - `publish_async` 在持锁状态下依次 await 异步处理器（锁跨越挂起点）。
//!
//! 注意：`publish_async` 挂起期间锁仍被持有。在单线程运行时上，
//! 此时调用任何阻塞式方法（`publish`、`subscribe`、`unsubscribe`、`subscriber_count` 等）
//! 会占住唯一的工作线程，持锁的任务无法恢复，从而死锁；这种场景下请使用 `*_async` 版本。
//!
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use tracing::trace;

use crate::bus::EventBus;
use crate::error::{BusError, BusResult};
use crate::failure::panic_message;
use crate::registry::SubscriptionRegistry;
use crate::subscription::erase;
use crate::topic::Message;

/// 同步事件总线
#[derive(Default)]
pub struct SyncEventBus {
    registry: SubscriptionRegistry,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 可挂起版本的发布：异步处理器以其真正的异步形式被依次 await
    pub async fn publish_async<T: Message>(&self, message: T) -> BusResult<()> {
        let (topic, message) = erase(message);
        trace!(topic = %topic, "publishing (async)");

        let table = self.registry.lock().await;
        for subscription in table.matching(topic, &message) {
            AssertUnwindSafe(subscription.dispatch(&message))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))))
                .map_err(|source| BusError::subscriber(topic.name(), subscription.id(), source))?;
        }
        Ok(())
    }
}

impl EventBus for SyncEventBus {
    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish<T: Message>(&self, message: T) -> BusResult<()> {
        let (topic, message) = erase(message);
        trace!(topic = %topic, "publishing");

        let table = self.registry.lock_blocking();
        for subscription in table.matching(topic, &message) {
            panic::catch_unwind(AssertUnwindSafe(|| subscription.invoke(&message)))
                .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))))
                .map_err(|source| BusError::subscriber(topic.name(), subscription.id(), source))?;
        }
        Ok(())
    }
}
