//! 事件总线（EventBus）协议
//!
//! 三种分发引擎共享的契约：订阅/退订对所有引擎完全一致（由注册表完成），
//! 仅 `publish` 的分发策略由具体引擎提供。
//!
use async_trait::async_trait;

use crate::error::BusResult;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{Subscriber, SubscriptionId};
use crate::topic::{Message, Topic};

/// 事件总线
///
/// - 主题由泛型参数 `T` 的确切类型决定；
/// - 该 trait 带有泛型方法，通常以具体引擎类型直接使用；
/// - 所有方法均可在多线程下并发调用，互斥仅由注册表的单一锁保证。
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 本实例独占的订阅注册表
    fn registry(&self) -> &SubscriptionRegistry;

    /// 发布消息到 `T` 主题，分发方式由具体引擎决定
    fn publish<T: Message>(&self, message: T) -> BusResult<()>;

    /// 订阅 `T` 主题（阻塞获取注册表锁），返回用于退订的句柄
    ///
    /// 在单线程运行时上，若 `SyncEventBus::publish_async` 正持锁挂起，
    /// 阻塞获取将无法返回；异步上下文中请优先使用 `subscribe_async`。
    fn subscribe<T: Message>(&self, subscriber: Subscriber<T>) -> SubscriptionId {
        self.registry()
            .subscribe(Topic::of::<T>(), subscriber.into_subscription())
    }

    /// 与 `subscribe` 语义相同，但以可挂起方式获取锁
    async fn subscribe_async<T: Message>(&self, subscriber: Subscriber<T>) -> SubscriptionId {
        self.registry()
            .subscribe_async(Topic::of::<T>(), subscriber.into_subscription())
            .await
    }

    /// 移除 `T` 主题上首个匹配 `id` 的订阅；未知句柄静默忽略
    fn unsubscribe<T: Message>(&self, id: SubscriptionId) {
        self.registry().unsubscribe(Topic::of::<T>(), id);
    }

    async fn unsubscribe_async<T: Message>(&self, id: SubscriptionId) {
        self.registry()
            .unsubscribe_async(Topic::of::<T>(), id)
            .await;
    }
}
