//! 进程内强类型发布/订阅事件总线（evbus）
//!
//! 订阅者按消息的确切类型注册处理器（可附带强类型谓词），
//! 发布时经由三种可互换的分发引擎之一投递：
//! - `SyncEventBus`：在调用方线程上持锁内联调用，严格全序，失败直接返回调用方；
//! - `TaskEventBus`：每次发布派生一个后台任务（fire-and-forget），失败交给 `FailureHook`；
//! - `PipelineEventBus`：解析（串行）→ 执行（并行）两阶段流水线，默认失败即进入 `Faulted`。
//!
//! 每个总线实例独占自己的 `SubscriptionRegistry`，不存在进程级的全局注册表。
//!
//! 典型用法：
//! ```rust
//! use evbus::{EventBus, Subscriber, SyncEventBus};
//!
//! struct Deposited {
//!     amount: i64,
//! }
//!
//! let bus = SyncEventBus::new();
//! let id = bus.subscribe(
//!     Subscriber::new(|e: &Deposited| {
//!         println!("deposited {}", e.amount);
//!         Ok(())
//!     })
//!     .when(|e| e.amount > 0),
//! );
//!
//! bus.publish(Deposited { amount: 42 }).unwrap();
//! bus.unsubscribe::<Deposited>(id);
//! ```
//!
mod blocking;
pub mod bus;
pub mod error;
pub mod failure;
pub mod pipeline;
pub mod registry;
pub mod subscription;
pub mod sync_bus;
pub mod task_bus;
pub mod topic;

pub use bus::EventBus;
pub use error::{BusError, BusResult};
pub use failure::{FailureHook, FailurePolicy};
pub use pipeline::{PipelineConfig, PipelineEventBus, PipelineState};
pub use registry::SubscriptionRegistry;
pub use subscription::{Subscriber, SubscriptionId};
pub use sync_bus::SyncEventBus;
pub use task_bus::TaskEventBus;
pub use topic::{Message, Topic};
