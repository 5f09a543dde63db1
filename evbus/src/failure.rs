//! 订阅者失败的观测与处置
//!
//! 后台引擎（fire-and-forget 与流水线）中的处理器失败不会回到 `publish` 的调用方，
//! 这里提供显式的观测钩子与处置策略。
//!
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

use crate::error::BusError;

/// 失败钩子：接收后台分发中产生的 `BusError`
pub type FailureHook = Arc<dyn Fn(BusError) + Send + Sync>;

/// 流水线遇到订阅者失败时的处置策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 流水线进入 `Faulted` 并永久停止分发
    #[default]
    Fault,
    /// 仅上报（日志 + 钩子），流水线继续运行
    Report,
}

/// 记录并转交给钩子（若有）
pub(crate) fn report(hook: Option<&FailureHook>, error: BusError) {
    warn!(error = %error, "subscriber failure in background dispatch");
    if let Some(hook) = hook {
        hook(error);
    }
}

/// 将 panic 负载转换为可读文本
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "handler panicked".to_string(),
        },
    }
}
