//! # Demo: chunk generation under changing host load
//!
//! Generates a 16x16 chunk heightmap batch while synthetic telemetry moves
//! the host from idle, to busy, to a memory emergency and back. One chunk
//! task hangs and is cancelled by the watchdog; one fails and is reported
//! at its index (collect-all).
//!
//! Run with:
//! ```text
//! RUST_LOG=genvisor=debug cargo run --example worldgen --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use genvisor::{
    BatchSpec, Estimate, ExecutorFn, FailurePolicy, LogWriter, ManualTelemetry, PoolConfig,
    Priority, Scheduler, Subscribe, TaskError,
};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct Chunk {
    x: i32,
    z: i32,
}

impl Chunk {
    /// Border chunks carry rivers and need more memory.
    fn estimate(&self) -> Estimate {
        let border = self.x == 0 || self.z == 0 || self.x == 15 || self.z == 15;
        let memory = if border { 48 * MB } else { 24 * MB };
        Estimate::new(memory, Duration::from_millis(20))
    }
}

fn height(c: Chunk) -> u32 {
    let h = (c.x * 73_856_093) ^ (c.z * 19_349_663);
    (h.unsigned_abs() % 256) as u32
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genvisor=info")),
        )
        .init();

    let telemetry = Arc::new(ManualTelemetry::new());
    telemetry.set_available_memory(2 * 1024 * MB);

    let cfg = PoolConfig {
        min_concurrency: 2,
        default_concurrency: 4,
        max_concurrency: 16,
        adjustment_interval: Duration::from_millis(100),
        watchdog_interval: Duration::from_millis(25),
        ..PoolConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sched = Scheduler::builder(cfg, telemetry.clone())
        .with_subscribers(subs)
        .build()?;

    let heightmap = ExecutorFn::arc("heightmap", |c: Arc<Chunk>, ctx: CancellationToken| async move {
        if (c.x, c.z) == (7, 7) {
            // stuck on a pathological seed; only cancellation gets it out
            ctx.cancelled().await;
            return Err(TaskError::Canceled);
        }
        if (c.x, c.z) == (3, 12) {
            return Err(TaskError::fail("noise octave overflow"));
        }
        tokio::time::sleep(Duration::from_millis(10 + (c.x as u64 % 5) * 4)).await;
        Ok(height(*c))
    });

    let chunks: Vec<Chunk> = (0..16)
        .flat_map(|x| (0..16).map(move |z| Chunk { x, z }))
        .collect();
    let spec = BatchSpec::new(heightmap, chunks, Chunk::estimate)
        .with_priority(Priority::Normal)
        .with_policy(FailurePolicy::CollectAll);
    let batch = sched.submit_batch(spec)?;

    let host = {
        let telemetry = telemetry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tracing::info!("host: game loop busy");
            telemetry.set_cpu_usage(0.8);
            telemetry.set_frame_rate(24.0);

            tokio::time::sleep(Duration::from_millis(150)).await;
            tracing::info!("host: memory spike");
            telemetry.set_memory_pressure(0.92);

            tokio::time::sleep(Duration::from_millis(150)).await;
            tracing::info!("host: back to idle");
            telemetry.set_memory_pressure(0.3);
            telemetry.set_cpu_usage(0.1);
            telemetry.set_frame_rate(60.0);
        })
    };

    let results = batch.wait().await?;
    host.abort();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    println!("generated {ok}/{} chunks", results.len());
    for (i, r) in results.iter().enumerate() {
        if let Err(e) = r {
            println!("  chunk #{i}: {} ({})", e, e.as_label());
        }
    }
    println!("final status: {:?}", sched.status());

    sched.shutdown().await?;
    Ok(())
}
