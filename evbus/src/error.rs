//! 事件总线统一错误定义
//!
//! 覆盖参数校验、订阅者失败与流水线状态拒绝三类情形，
//! 三种分发引擎共用同一个 `BusError`。
//!
use crate::subscription::SubscriptionId;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 参数/运行时 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("no tokio runtime available: construct the bus inside a runtime or pass a handle")]
    NoRuntime,

    // --- 订阅者 ---
    #[error("subscriber failed: topic={topic}, subscription={subscription}, reason={source}")]
    Subscriber {
        topic: &'static str,
        subscription: SubscriptionId,
        #[source]
        source: anyhow::Error,
    },
    #[error("subscriber resolution failed: topic={topic}, reason={reason}")]
    Resolution { topic: &'static str, reason: String },

    // --- 流水线 ---
    #[error("pipeline faulted: no further messages are accepted")]
    PipelineFaulted,
    #[error("pipeline completed: no further messages are accepted")]
    PipelineClosed,
}

impl BusError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        BusError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn subscriber(
        topic: &'static str,
        subscription: SubscriptionId,
        source: anyhow::Error,
    ) -> Self {
        BusError::Subscriber {
            topic,
            subscription,
            source,
        }
    }

    /// 是否为订阅者（handler）自身的失败
    pub fn is_subscriber_failure(&self) -> bool {
        matches!(
            self,
            BusError::Subscriber { .. } | BusError::Resolution { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_error_keeps_source_and_topic() {
        let id = SubscriptionId::new();
        let err = BusError::subscriber("demo::Ping", id, anyhow::anyhow!("boom"));

        assert!(err.is_subscriber_failure());
        let text = err.to_string();
        assert!(text.contains("demo::Ping"));
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("boom"));
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("boom".to_string())
        );
    }

    #[test]
    fn rejections_are_not_subscriber_failures() {
        assert!(!BusError::PipelineFaulted.is_subscriber_failure());
        assert!(!BusError::PipelineClosed.is_subscriber_failure());
        assert!(!BusError::invalid_argument("x").is_subscriber_failure());
    }
}
