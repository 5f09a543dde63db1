/// 同步引擎示例
/// 演示谓词分流、逐个有序投递，以及订阅者失败时发布方立即得到错误
use anyhow::Result as AnyResult;
use evbus::{BusError, EventBus, Subscriber, SyncEventBus};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Deposited {
    account: &'static str,
    amount: i64,
}

fn main() -> AnyResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bus = SyncEventBus::new();
    let ledger = Arc::new(Mutex::new(Vec::new()));

    let sink = ledger.clone();
    bus.subscribe(Subscriber::new(move |e: &Deposited| {
        sink.lock().unwrap().push(format!("{} +{}", e.account, e.amount));
        Ok(())
    }));

    // 大额存款需要人工复核
    bus.subscribe(
        Subscriber::new(|e: &Deposited| {
            tracing::info!(account = e.account, amount = e.amount, "large deposit flagged");
            Ok(())
        })
        .when(|e| e.amount >= 10_000),
    );

    bus.publish(Deposited {
        account: "alice",
        amount: 120,
    })?;
    bus.publish(Deposited {
        account: "bob",
        amount: 50_000,
    })?;
    println!("ledger: {:?}", ledger.lock().unwrap());

    // 拒绝负数金额的校验者：失败直接返回给发布方
    let guard = bus.subscribe(Subscriber::new(|e: &Deposited| {
        anyhow::ensure!(e.amount > 0, "non-positive deposit: {}", e.amount);
        Ok(())
    }));
    match bus.publish(Deposited {
        account: "carol",
        amount: -5,
    }) {
        Err(err @ BusError::Subscriber { .. }) => println!("rejected: {err}"),
        other => println!("unexpected outcome: {other:?}"),
    }
    bus.unsubscribe::<Deposited>(guard);

    println!(
        "subscribers left on Deposited: {}",
        bus.registry().subscriber_count::<Deposited>()
    );
    Ok(())
}
