//! 订阅注册表（SubscriptionRegistry）
//!
//! 每个总线实例独占一个注册表：`Topic -> Vec<Subscription>`，列表按注册顺序排列。
//! 所有读（分发快照）与写（订阅/退订）共用同一把互斥锁，不按主题分片；
//! 该锁既可阻塞获取，也可在异步调用链中 `.await` 获取。
//!
//! 不变量：
//! - 同一主题列表中不存在重复的 `SubscriptionId`；
//! - 列表清空后立即移除主题键。
//!
//! 注意：锁不可重入。同步引擎在调用处理器期间持有该锁，
//! 处理器内部不得同步地订阅/退订同一总线，否则将死锁。
//! 阻塞获取可以嵌套在另一次阻塞调用之内（见 `blocking`）。
//!
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

use crate::blocking;
use crate::subscription::{ErasedMessage, Subscription, SubscriptionId};
use crate::topic::{Message, Topic};

#[derive(Default)]
pub(crate) struct TopicTable {
    by_topic: HashMap<Topic, Vec<Subscription>>,
}

impl TopicTable {
    fn insert(&mut self, topic: Topic, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id();
        self.by_topic.entry(topic).or_default().push(subscription);
        id
    }

    fn remove(&mut self, topic: Topic, id: SubscriptionId) -> bool {
        let Some(list) = self.by_topic.get_mut(&topic) else {
            return false;
        };

        let removed = match list.iter().position(|s| s.id() == id) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        };

        if list.is_empty() {
            self.by_topic.remove(&topic);
        }
        removed
    }

    /// 当前快照中接受该消息的订阅，按注册顺序
    pub(crate) fn matching<'a>(
        &'a self,
        topic: Topic,
        message: &'a ErasedMessage,
    ) -> impl Iterator<Item = &'a Subscription> + Send + 'a {
        self.by_topic
            .get(&topic)
            .into_iter()
            .flatten()
            .filter(move |s| s.accepts(message))
    }

    fn len(&self, topic: Topic) -> usize {
        self.by_topic.get(&topic).map_or(0, Vec::len)
    }
}

/// 订阅注册表
#[derive(Default)]
pub struct SubscriptionRegistry {
    table: Mutex<TopicTable>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 阻塞获取锁
    pub(crate) fn lock_blocking(&self) -> MutexGuard<'_, TopicTable> {
        match self.table.try_lock() {
            Ok(guard) => guard,
            Err(_) => blocking::block_on(self.table.lock()),
        }
    }

    /// 可挂起获取锁
    pub(crate) async fn lock(&self) -> MutexGuard<'_, TopicTable> {
        self.table.lock().await
    }

    pub(crate) fn subscribe(&self, topic: Topic, subscription: Subscription) -> SubscriptionId {
        let id = self.lock_blocking().insert(topic, subscription);
        trace!(topic = %topic, subscription = %id, "subscribed");
        id
    }

    pub(crate) async fn subscribe_async(
        &self,
        topic: Topic,
        subscription: Subscription,
    ) -> SubscriptionId {
        let id = self.lock().await.insert(topic, subscription);
        trace!(topic = %topic, subscription = %id, "subscribed");
        id
    }

    pub(crate) fn unsubscribe(&self, topic: Topic, id: SubscriptionId) {
        let removed = self.lock_blocking().remove(topic, id);
        trace!(topic = %topic, subscription = %id, removed, "unsubscribed");
    }

    pub(crate) async fn unsubscribe_async(&self, topic: Topic, id: SubscriptionId) {
        let removed = self.lock().await.remove(topic, id);
        trace!(topic = %topic, subscription = %id, removed, "unsubscribed");
    }

    /// `T` 主题上的订阅数量
    pub fn subscriber_count<T: Message>(&self) -> usize {
        self.lock_blocking().len(Topic::of::<T>())
    }

    /// 至少有一个订阅的主题数量
    pub fn topic_count(&self) -> usize {
        self.lock_blocking().by_topic.len()
    }

    /// 已注册主题列表（只读视图，顺序不定）
    pub fn topics(&self) -> Vec<Topic> {
        self.lock_blocking().by_topic.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_blocking().by_topic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{Subscriber, erase};

    struct Ping(u32);
    struct Pong;

    fn ping_subscription() -> Subscription {
        Subscriber::new(|_: &Ping| Ok(())).into_subscription()
    }

    #[test]
    fn subscribe_appends_in_order() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::of::<Ping>();
        let a = registry.subscribe(topic, ping_subscription());
        let b = registry.subscribe(topic, ping_subscription());

        let (_, msg) = erase(Ping(1));
        let table = registry.lock_blocking();
        let ids: Vec<_> = table.matching(topic, &msg).map(Subscription::id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn removing_last_subscription_drops_topic_key() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::of::<Ping>();
        let id = registry.subscribe(topic, ping_subscription());
        assert_eq!(registry.topic_count(), 1);

        registry.unsubscribe(topic, id);
        assert!(registry.is_empty());
        assert_eq!(registry.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn unknown_id_or_topic_is_noop() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::of::<Ping>();
        let id = registry.subscribe(topic, ping_subscription());

        registry.unsubscribe(Topic::of::<Pong>(), id);
        registry.unsubscribe(topic, SubscriptionId::new());
        assert_eq!(registry.subscriber_count::<Ping>(), 1);

        for _ in 0..3 {
            registry.unsubscribe(topic, id);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn matching_applies_predicates() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::of::<Ping>();
        registry.subscribe(
            topic,
            Subscriber::new(|_: &Ping| Ok(()))
                .when(|p| p.0 > 10)
                .into_subscription(),
        );
        registry.subscribe(topic, ping_subscription());

        let (_, small) = erase(Ping(1));
        let (_, big) = erase(Ping(11));
        let table = registry.lock_blocking();
        assert_eq!(table.matching(topic, &small).count(), 1);
        assert_eq!(table.matching(topic, &big).count(), 2);
        assert_eq!(table.matching(Topic::of::<Pong>(), &big).count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_paths_share_the_same_table() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::of::<Ping>();
        let id = registry.subscribe_async(topic, ping_subscription()).await;
        assert_eq!(registry.subscriber_count::<Ping>(), 1);

        registry.unsubscribe_async(topic, id).await;
        assert!(registry.is_empty());
    }
}
