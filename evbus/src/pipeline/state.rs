use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BusError;
use crate::failure::{FailureHook, FailurePolicy, report};

/// 流水线状态
///
/// `Created -> Running -> Faulted | Completed`，后两者为终态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// 已构造，阶段任务尚未启动
    Created,
    Running,
    /// 某阶段出现未处理的失败，永久停止分发
    Faulted,
    /// `complete()` 之后已排空全部消息
    Completed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Faulted | PipelineState::Completed)
    }
}

/// 两个阶段与总线共享的运行状态
pub(crate) struct PipelineShared {
    state: watch::Sender<PipelineState>,
    pub(crate) faulted: CancellationToken,
    pub(crate) closing: CancellationToken,
    policy: FailurePolicy,
    on_failure: Option<FailureHook>,
}

impl PipelineShared {
    pub(crate) fn new(policy: FailurePolicy, on_failure: Option<FailureHook>) -> Self {
        let (state, _) = watch::channel(PipelineState::Created);
        Self {
            state,
            faulted: CancellationToken::new(),
            closing: CancellationToken::new(),
            policy,
            on_failure,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// 仅从 `from` 迁移到 `to`，返回是否发生迁移
    pub(crate) fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(from = ?from, to = ?to, "pipeline state changed");
        }
        changed
    }

    /// 处置一次阶段失败：总是上报；`Fault` 策略下同时令流水线进入终态
    pub(crate) fn fail(&self, error: BusError) {
        report(self.on_failure.as_ref(), error);
        if self.policy == FailurePolicy::Fault {
            // 先停止两个阶段，再对外公布 Faulted
            self.faulted.cancel();
            self.transition(PipelineState::Running, PipelineState::Faulted);
        }
    }

    /// 等待终态
    pub(crate) async fn terminal(&self) -> PipelineState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}
