//! 流水线的两个阶段
//!
//! - 解析阶段：逐个消费 `Envelope`（串行），持锁读取主题快照，
//!   为每个接受该消息的订阅者生成一个 `Job`，释放锁后向下游转发；
//! - 执行阶段：以流的方式消费 `Job`，每个 `Job` 派生为独立的 tokio 任务并发执行，
//!   彼此之间以及与生成顺序之间均无顺序关系。
//!
use futures_core::future::BoxFuture;
use futures_util::StreamExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::state::{PipelineShared, PipelineState};
use crate::error::BusError;
use crate::failure::panic_message;
use crate::registry::{SubscriptionRegistry, TopicTable};
use crate::subscription::{ErasedMessage, SubscriptionId};
use crate::topic::Topic;

/// 进入解析阶段的消息
pub(crate) struct Envelope {
    pub(crate) topic: Topic,
    pub(crate) message: ErasedMessage,
}

/// 仅调用单个订阅者一次的执行单元
pub(crate) struct Job {
    topic: Topic,
    subscription: SubscriptionId,
    run: BoxFuture<'static, anyhow::Result<()>>,
}

impl TopicTable {
    fn resolve(&self, envelope: &Envelope) -> Vec<Job> {
        self.matching(envelope.topic, &envelope.message)
            .map(|subscription| Job {
                topic: envelope.topic,
                subscription: subscription.id(),
                run: subscription.job(Arc::clone(&envelope.message)),
            })
            .collect()
    }
}

pub(crate) async fn resolve_stage(
    registry: Arc<SubscriptionRegistry>,
    mut input: mpsc::UnboundedReceiver<Envelope>,
    jobs: mpsc::UnboundedSender<Job>,
    shared: Arc<PipelineShared>,
) {
    let mut closing = false;

    loop {
        let envelope = tokio::select! {
            biased;
            () = shared.faulted.cancelled() => break,
            () = shared.closing.cancelled(), if !closing => {
                // 拒绝新消息，但继续排空已排队的
                input.close();
                closing = true;
                continue;
            }
            next = input.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let resolved = {
            let table = registry.lock().await;
            panic::catch_unwind(AssertUnwindSafe(|| table.resolve(&envelope)))
        };

        match resolved {
            Ok(batch) => {
                for job in batch {
                    if jobs.send(job).is_err() {
                        return;
                    }
                }
            }
            Err(payload) => shared.fail(BusError::Resolution {
                topic: envelope.topic.name(),
                reason: panic_message(payload),
            }),
        }
    }
}

pub(crate) async fn execute_stage(
    jobs: mpsc::UnboundedReceiver<Job>,
    runtime: Handle,
    max_parallelism: Option<usize>,
    shared: Arc<PipelineShared>,
) {
    UnboundedReceiverStream::new(jobs)
        .take_until(shared.faulted.clone().cancelled_owned())
        .for_each_concurrent(max_parallelism, |job| {
            let runtime = runtime.clone();
            let shared = Arc::clone(&shared);
            async move {
                let Job {
                    topic,
                    subscription,
                    run,
                } = job;

                let outcome = match runtime.spawn(run).await {
                    Ok(result) => result,
                    Err(join) if join.is_panic() => {
                        Err(anyhow::anyhow!(panic_message(join.into_panic())))
                    }
                    Err(join) => Err(anyhow::anyhow!(join)),
                };

                if let Err(source) = outcome {
                    shared.fail(BusError::subscriber(topic.name(), subscription, source));
                }
            }
        })
        .await;

    // 因故障而终止时由 `fail` 迁移到 Faulted
    if !shared.faulted.is_cancelled() {
        shared.transition(PipelineState::Running, PipelineState::Completed);
    }
}
