/// 流水线引擎示例
/// 演示限定并行度、Report 失败策略，以及 complete() 之后等待排空
use anyhow::Result as AnyResult;
use evbus::{
    BusError, EventBus, FailurePolicy, PipelineConfig, PipelineEventBus, PipelineState, Subscriber,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct SensorReading {
    sensor: u32,
    celsius: f64,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = PipelineConfig::builder()
        .max_parallelism(4)
        .failure_policy(FailurePolicy::Report)
        .build();
    let bus = PipelineEventBus::builder()
        .config(config)
        .on_failure(Arc::new(|err: BusError| {
            tracing::warn!(error = %err, "reading rejected");
        }))
        .build()?;

    let stored = Arc::new(AtomicUsize::new(0));
    let counter = stored.clone();
    bus.subscribe(Subscriber::future(move |reading: Arc<SensorReading>| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            anyhow::ensure!(
                reading.celsius > -273.15,
                "sensor {} below absolute zero",
                reading.sensor
            );
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }));

    let alarms = Arc::new(AtomicUsize::new(0));
    let counter = alarms.clone();
    bus.subscribe(
        Subscriber::new(move |_: &SensorReading| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .when(|r| r.celsius > 80.0),
    );

    for sensor in 0..32 {
        let celsius = match sensor {
            7 => -300.0,
            s if s % 10 == 0 => 95.0,
            s => 20.0 + f64::from(s),
        };
        bus.publish(SensorReading { sensor, celsius })?;
    }

    bus.complete();
    let state = bus.completion().await;
    assert_eq!(state, PipelineState::Completed);
    println!(
        "state: {state:?}, stored: {}, alarms: {}",
        stored.load(Ordering::SeqCst),
        alarms.load(Ordering::SeqCst)
    );
    Ok(())
}
