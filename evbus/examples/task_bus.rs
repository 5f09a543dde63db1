/// Fire-and-forget 引擎示例
/// 发布立即返回，订阅者在后台任务中运行，失败经由 FailureHook 观测
use anyhow::Result as AnyResult;
use evbus::{BusError, EventBus, Subscriber, TaskEventBus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct OrderPlaced {
    id: u32,
    total_cents: u64,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let failures = Arc::new(AtomicUsize::new(0));
    let sink = failures.clone();
    let bus = TaskEventBus::builder()
        .on_failure(Arc::new(move |err: BusError| {
            tracing::error!(error = %err, "order handler failed");
            sink.fetch_add(1, Ordering::SeqCst);
        }))
        .build()?;

    let shipped = Arc::new(AtomicUsize::new(0));
    let counter = shipped.clone();
    bus.subscribe(Subscriber::future(move |order: Arc<OrderPlaced>| {
        let counter = counter.clone();
        async move {
            // 模拟调用外部物流服务
            tokio::time::sleep(Duration::from_millis(20)).await;
            anyhow::ensure!(order.total_cents > 0, "empty order {}", order.id);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    for id in 0..5 {
        let total_cents = if id == 3 { 0 } else { 1_000 * u64::from(id + 1) };
        bus.publish(OrderPlaced { id, total_cents })?;
    }
    println!("published 5 orders, nothing shipped yet: {}", shipped.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "shipped: {}, failed: {}",
        shipped.load(Ordering::SeqCst),
        failures.load(Ordering::SeqCst)
    );
    Ok(())
}
