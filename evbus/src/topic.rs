//! 主题（Topic）
//!
//! 主题即消息通道的身份，由调用处的泛型参数 `T` 决定：
//! 相同的具体类型指向同一主题；包装类型、"派生"类型与其内部类型是不同主题，
//! 分发严格按声明类型匹配，不做运行时多态。
//!
use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 可在总线上发布的消息
///
/// 对所有 `Send + Sync + 'static` 类型自动实现。
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// 主题键：`TypeId` 决定身份，`name` 仅用于日志与错误信息
#[derive(Clone, Copy)]
pub struct Topic {
    id: TypeId,
    name: &'static str,
}

impl Topic {
    pub fn of<T: Message>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// 完整类型名（例如 `my_app::orders::OrderPlaced`）
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.name).finish()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
