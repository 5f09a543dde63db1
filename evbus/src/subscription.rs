//! 订阅（Subscription）
//!
//! - `Subscriber<T>`：调用方构造的强类型订阅描述（handler + 可选谓词）；
//! - `Subscription`：注册表内部保存的类型擦除条目。
//!
//! 擦除后的闭包在调用时将 `dyn Any` 还原为 `T`。由于注册与分发都以同一个
//! `TypeId` 为键，该还原在正常运行中不会失败，这是一个封闭的不变量。
//!
use futures_core::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::blocking;
use crate::topic::{Message, Topic};

/// 类型擦除后在总线内部流转的消息
pub(crate) type ErasedMessage = Arc<dyn Any + Send + Sync>;

type TypedHandler<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;
type TypedAsyncHandler<T> =
    Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type TypedPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

type ErasedHandler = Arc<dyn Fn(&ErasedMessage) -> anyhow::Result<()> + Send + Sync>;
type ErasedAsyncHandler =
    Arc<dyn Fn(ErasedMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ErasedPredicate = Arc<dyn Fn(&ErasedMessage) -> bool + Send + Sync>;

/// 订阅句柄：仅用于退订
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

enum Handler<T> {
    Sync(TypedHandler<T>),
    Async(TypedAsyncHandler<T>),
}

/// 强类型订阅描述
///
/// ```rust
/// use evbus::Subscriber;
///
/// struct OrderPlaced {
///     amount: u64,
/// }
///
/// let large_orders = Subscriber::new(|order: &OrderPlaced| {
///     println!("large order: {}", order.amount);
///     Ok(())
/// })
/// .when(|order| order.amount > 1_000);
/// # let _ = large_orders;
/// ```
pub struct Subscriber<T> {
    handler: Handler<T>,
    predicate: Option<TypedPredicate<T>>,
}

impl<T: Message> Subscriber<T> {
    /// 同步处理器
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Handler::Sync(Arc::new(handler)),
            predicate: None,
        }
    }

    /// 异步处理器：返回 `Future` 的回调
    pub fn future<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            handler: Handler::Async(Arc::new(
                move |message: Arc<T>| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(handler(message))
                },
            )),
            predicate: None,
        }
    }

    /// 附加过滤谓词，仅当其返回 `true` 时才调用处理器
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, Handler::Async(_))
    }

    pub(crate) fn into_subscription(self) -> Subscription {
        let (handler, async_handler): (ErasedHandler, Option<ErasedAsyncHandler>) =
            match self.handler {
                Handler::Sync(handler) => (
                    Arc::new(move |message: &ErasedMessage| {
                        handler(downcast_ref::<T>(message))
                    }),
                    None,
                ),
                Handler::Async(handler) => {
                    let fallback = Arc::clone(&handler);
                    (
                        // 同步形式：以阻塞执行器驱动异步处理器直至完成
                        Arc::new(move |message: &ErasedMessage| {
                            blocking::block_on(fallback(downcast_arc::<T>(message)))
                        }),
                        Some(Arc::new(move |message: ErasedMessage| {
                            handler(downcast_arc::<T>(&message))
                        })),
                    )
                }
            };

        let predicate = self.predicate.map(|predicate| -> ErasedPredicate {
            Arc::new(move |message: &ErasedMessage| predicate(downcast_ref::<T>(message)))
        });

        Subscription {
            id: SubscriptionId::new(),
            handler,
            async_handler,
            predicate,
        }
    }
}

fn downcast_ref<T: Message>(message: &ErasedMessage) -> &T {
    match (**message).downcast_ref::<T>() {
        Some(typed) => typed,
        None => unreachable!("message routed to a foreign topic: expected {}", type_name::<T>()),
    }
}

fn downcast_arc<T: Message>(message: &ErasedMessage) -> Arc<T> {
    match Arc::clone(message).downcast::<T>() {
        Ok(typed) => typed,
        Err(_) => unreachable!("message routed to a foreign topic: expected {}", type_name::<T>()),
    }
}

/// 注册表中的类型擦除条目
#[derive(Clone)]
pub(crate) struct Subscription {
    id: SubscriptionId,
    handler: ErasedHandler,
    async_handler: Option<ErasedAsyncHandler>,
    predicate: Option<ErasedPredicate>,
}

impl Subscription {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn is_async(&self) -> bool {
        self.async_handler.is_some()
    }

    /// 无谓词或谓词为真
    pub(crate) fn accepts(&self, message: &ErasedMessage) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate(message))
    }

    /// 同步形式调用
    pub(crate) fn invoke(&self, message: &ErasedMessage) -> anyhow::Result<()> {
        (self.handler)(message)
    }

    /// 在当前任务中调用：异步订阅 await 其异步形式，同步订阅直接调用
    pub(crate) async fn dispatch(&self, message: &ErasedMessage) -> anyhow::Result<()> {
        match &self.async_handler {
            Some(handler) => handler(Arc::clone(message)).await,
            None => (self.handler)(message),
        }
    }

    /// 生成仅调用本订阅者一次的独立 future，供流水线执行阶段使用
    pub(crate) fn job(&self, message: ErasedMessage) -> BoxFuture<'static, anyhow::Result<()>> {
        match &self.async_handler {
            Some(handler) => handler(message),
            None => {
                let handler = Arc::clone(&self.handler);
                Box::pin(async move { handler(&message) })
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("async", &self.is_async())
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}

/// 将消息擦除为总线内部表示，并给出其主题
pub(crate) fn erase<T: Message>(message: T) -> (Topic, ErasedMessage) {
    let message: ErasedMessage = Arc::new(message);
    (Topic::of::<T>(), message)
}
