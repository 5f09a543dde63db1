//! 流水线分发引擎（PipelineEventBus）
//!
//! 构造时连接两个阶段：串行的解析阶段与不限并行度的执行阶段（见 `stage`）。
//! `publish` 将 `(topic, message)` 投入无界队列后立即返回，无阻塞、无背压。
//!
//! 失败处置由 `FailurePolicy` 决定：
//! - `Fault`（默认）：任一阶段中的失败都会使整个流水线进入 `Faulted` 终态，
//!   此后所有投递都被拒绝，该实例不再分发任何消息；
//! - `Report`：失败仅记录日志并交给 `FailureHook`，流水线继续运行。
//!
mod config;
mod stage;
mod state;

pub use config::PipelineConfig;
pub use state::PipelineState;

use bon::bon;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::trace;

use crate::bus::EventBus;
use crate::error::{BusError, BusResult};
use crate::failure::FailureHook;
use crate::registry::SubscriptionRegistry;
use crate::subscription::erase;
use crate::topic::Message;
use stage::{Envelope, execute_stage, resolve_stage};
use state::PipelineShared;

/// 两阶段流水线事件总线
pub struct PipelineEventBus {
    registry: Arc<SubscriptionRegistry>,
    input: mpsc::UnboundedSender<Envelope>,
    shared: Arc<PipelineShared>,
}

#[bon]
impl PipelineEventBus {
    /// - `config`：并行度与失败策略；
    /// - `runtime`：阶段任务所在的运行时，缺省取当前上下文的运行时；
    /// - `on_failure`：阶段失败的观测钩子。
    #[builder]
    pub fn new(
        #[builder(default)] config: PipelineConfig,
        runtime: Option<Handle>,
        on_failure: Option<FailureHook>,
    ) -> BusResult<Self> {
        config.validate()?;
        let runtime = match runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BusError::NoRuntime)?,
        };

        let registry = Arc::new(SubscriptionRegistry::new());
        let shared = Arc::new(PipelineShared::new(config.failure_policy, on_failure));
        let (input, envelopes) = mpsc::unbounded_channel();
        let (jobs, job_rx) = mpsc::unbounded_channel();

        shared.transition(PipelineState::Created, PipelineState::Running);
        runtime.spawn(resolve_stage(
            Arc::clone(&registry),
            envelopes,
            jobs,
            Arc::clone(&shared),
        ));
        runtime.spawn(execute_stage(
            job_rx,
            runtime.clone(),
            config.max_parallelism,
            Arc::clone(&shared),
        ));

        Ok(Self {
            registry,
            input,
            shared,
        })
    }
}

impl PipelineEventBus {
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// 停止接收新消息；已排队的消息仍会被解析并执行
    pub fn complete(&self) {
        self.shared.closing.cancel();
    }

    /// 等待流水线进入终态（`Completed` 或 `Faulted`）
    pub async fn completion(&self) -> PipelineState {
        self.shared.terminal().await
    }

    fn rejection(&self) -> BusError {
        match self.state() {
            PipelineState::Faulted => BusError::PipelineFaulted,
            _ => BusError::PipelineClosed,
        }
    }
}

impl EventBus for PipelineEventBus {
    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish<T: Message>(&self, message: T) -> BusResult<()> {
        if self.state().is_terminal() || self.shared.closing.is_cancelled() {
            return Err(self.rejection());
        }

        let (topic, message) = erase(message);
        trace!(topic = %topic, "posting to pipeline");
        self.input
            .send(Envelope { topic, message })
            .map_err(|_| self.rejection())
    }
}
