//! Mixed fast/slow client load test.
//!
//! Fast clients read each response as quickly as the transport allows; slow
//! clients read through [`throttle::read_throttled`]. In saturation mode the
//! slow clients start first and get a warm-up period to occupy connections
//! before any fast client arrives, so the fast latencies show what newly
//! arriving traffic suffers behind them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::PolyglotClient;
use crate::report::{self, Assessment};
use crate::stats::{ClientClass, LatencySummary, LoadStats, RequestCounts};

const NORMAL_SLOW_CLIENTS: usize = 0;
const NORMAL_SLOW_SPEED: u64 = 1024;
const SATURATION_SLOW_CLIENTS: usize = 50;
const SATURATION_SLOW_SPEED: u64 = 500 * 1024;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fast and slow clients start together.
    Normal,
    /// Slow clients start first and hold connections through a warm-up.
    Saturation,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SlowClientsArgs {
    /// Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    pub target: String,

    /// Number of fast clients
    #[arg(long, default_value_t = 10)]
    pub fast: usize,

    /// Number of slow clients [default: 0 normal, 50 saturation]
    #[arg(long)]
    pub slow: Option<usize>,

    /// Requests per client
    #[arg(long, default_value_t = 100)]
    pub requests: usize,

    /// Slow client download speed in bytes/sec [default: 1024 normal, 512000 saturation]
    #[arg(long)]
    pub slow_speed: Option<u64>,

    /// Test duration (seconds)
    #[arg(long, default_value_t = 30)]
    pub duration: u64,

    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    pub mode: Mode,

    /// Shorthand for `--mode saturation`
    #[arg(long)]
    pub hog_test: bool,

    /// Head start given to slow clients in saturation mode (seconds)
    #[arg(long, default_value_t = 2)]
    pub warmup_secs: u64,

    /// Pause between a fast client's requests (ms)
    #[arg(long, default_value_t = 50)]
    pub fast_interval_ms: u64,

    /// Pause between a slow client's requests (ms)
    #[arg(long, default_value_t = 100)]
    pub slow_interval_ms: u64,

    /// Per-request timeout for fast clients (seconds)
    #[arg(long, default_value_t = 10)]
    pub fast_timeout_secs: u64,

    /// Per-request timeout for slow clients (seconds)
    #[arg(long, default_value_t = 60)]
    pub slow_timeout_secs: u64,

    /// Output file for JSON results (default: stdout)
    #[arg(long)]
    pub output: Option<String>,
}

/// Fully resolved run parameters, mode presets applied.
#[derive(Debug, Clone, Serialize)]
pub struct LoadPlan {
    pub target: String,
    pub mode: Mode,
    pub fast_clients: usize,
    pub slow_clients: usize,
    pub requests_per_client: usize,
    pub slow_bytes_per_sec: u64,
    pub duration_secs: u64,
    pub warmup_secs: u64,
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
    pub fast_timeout_secs: u64,
    pub slow_timeout_secs: u64,
}

impl SlowClientsArgs {
    pub fn plan(&self) -> LoadPlan {
        let mode = if self.hog_test {
            Mode::Saturation
        } else {
            self.mode
        };
        let (slow_default, speed_default) = match mode {
            Mode::Normal => (NORMAL_SLOW_CLIENTS, NORMAL_SLOW_SPEED),
            Mode::Saturation => (SATURATION_SLOW_CLIENTS, SATURATION_SLOW_SPEED),
        };
        LoadPlan {
            target: self.target.clone(),
            mode,
            fast_clients: self.fast,
            slow_clients: self.slow.unwrap_or(slow_default),
            requests_per_client: self.requests,
            slow_bytes_per_sec: self.slow_speed.unwrap_or(speed_default),
            duration_secs: self.duration,
            warmup_secs: self.warmup_secs,
            fast_interval_ms: self.fast_interval_ms,
            slow_interval_ms: self.slow_interval_ms,
            fast_timeout_secs: self.fast_timeout_secs,
            slow_timeout_secs: self.slow_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyBreakdown {
    pub overall: LatencySummary,
    pub fast: LatencySummary,
    pub slow: LatencySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Throughput {
    pub overall_rps: f64,
    pub fast_rps: f64,
    pub slow_rps: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub plan: LoadPlan,
    pub duration_secs: f64,
    pub requests: RequestCounts,
    pub latency: LatencyBreakdown,
    pub throughput: Throughput,
    /// Achieved fast throughput as a percentage of what the fast clients
    /// could reach at their mean latency. Absent without fast samples.
    pub fast_efficiency_pct: Option<f64>,
    pub assessment: Assessment,
}

#[derive(Clone)]
struct ClientSpec {
    class: ClientClass,
    client: PolyglotClient,
    requests: usize,
    interval: Duration,
    bytes_per_sec: u64,
}

async fn run_client(spec: ClientSpec, stats: Arc<LoadStats>, stop: CancellationToken) {
    for _ in 0..spec.requests {
        if stop.is_cancelled() {
            break;
        }

        let user_id = format!("{}-user-{}", spec.class.label(), uuid::Uuid::new_v4());
        stats.record_attempt(spec.class);
        let started = Instant::now();
        let outcome = match spec.class {
            ClientClass::Fast => spec.client.fetch(&user_id).await,
            ClientClass::Slow => spec.client.fetch_throttled(&user_id, spec.bytes_per_sec).await,
        };
        match outcome {
            Ok(_) => stats.record_success(spec.class, started.elapsed().as_millis() as u64),
            Err(_) => stats.record_failure(),
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(spec.interval) => {}
        }
    }
}

fn spawn_clients(
    tracker: &TaskTracker,
    spec: &ClientSpec,
    count: usize,
    stats: &Arc<LoadStats>,
    stop: &CancellationToken,
) {
    for _ in 0..count {
        tracker.spawn(run_client(spec.clone(), stats.clone(), stop.clone()));
    }
}

fn spawn_progress(stats: Arc<LoadStats>, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let c = stats.counts();
                    eprintln!(
                        "  progress: total={} success={} failed={} fast={} slow={}",
                        c.total, c.success, c.failed, c.fast_attempts, c.slow_attempts
                    );
                }
            }
        }
    })
}

pub async fn run(plan: &LoadPlan) -> anyhow::Result<LoadReport> {
    if plan.slow_clients > 0 && plan.slow_bytes_per_sec == 0 {
        anyhow::bail!("slow client speed must be greater than 0 bytes/sec");
    }

    let fast = ClientSpec {
        class: ClientClass::Fast,
        client: PolyglotClient::new(&plan.target, Duration::from_secs(plan.fast_timeout_secs))?,
        requests: plan.requests_per_client,
        interval: Duration::from_millis(plan.fast_interval_ms),
        bytes_per_sec: 0,
    };
    let slow = ClientSpec {
        class: ClientClass::Slow,
        client: PolyglotClient::new(&plan.target, Duration::from_secs(plan.slow_timeout_secs))?,
        requests: plan.requests_per_client,
        interval: Duration::from_millis(plan.slow_interval_ms),
        bytes_per_sec: plan.slow_bytes_per_sec,
    };

    fast.client
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("health check against {} failed: {e}", plan.target))?;

    let stats = Arc::new(LoadStats::new());
    let stop = CancellationToken::new();
    let progress_stop = CancellationToken::new();
    let tracker = TaskTracker::new();
    let progress = spawn_progress(stats.clone(), progress_stop.clone());

    let start = Instant::now();
    match plan.mode {
        Mode::Saturation => {
            eprintln!("  Pre-warming with {} slow clients...", plan.slow_clients);
            spawn_clients(&tracker, &slow, plan.slow_clients, &stats, &stop);
            tokio::time::sleep(Duration::from_secs(plan.warmup_secs)).await;
            eprintln!("  Starting {} fast clients...", plan.fast_clients);
            spawn_clients(&tracker, &fast, plan.fast_clients, &stats, &stop);
        }
        Mode::Normal => {
            spawn_clients(&tracker, &fast, plan.fast_clients, &stats, &stop);
            spawn_clients(&tracker, &slow, plan.slow_clients, &stats, &stop);
        }
    }
    tracker.close();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(plan.duration_secs)) => {}
        // Every client ran out of requests early.
        _ = tracker.wait() => {}
    }
    stop.cancel();
    tracker.wait().await;
    let elapsed = start.elapsed();

    progress_stop.cancel();
    let _ = progress.await;

    Ok(build_report(plan, &stats, elapsed))
}

pub fn build_report(plan: &LoadPlan, stats: &LoadStats, elapsed: Duration) -> LoadReport {
    let counts = stats.counts();
    let (fast, slow) = stats.samples();
    let all: Vec<u64> = fast.iter().chain(slow.iter()).copied().collect();

    let latency = LatencyBreakdown {
        overall: LatencySummary::from_samples(&all),
        fast: LatencySummary::from_samples(&fast),
        slow: LatencySummary::from_samples(&slow),
    };

    let secs = elapsed.as_secs_f64();
    let rate = |n: usize| if secs > 0.0 { n as f64 / secs } else { 0.0 };
    let throughput = Throughput {
        overall_rps: rate(counts.success as usize),
        fast_rps: rate(fast.len()),
        slow_rps: rate(slow.len()),
    };

    let fast_efficiency_pct = (latency.fast.count > 0 && latency.fast.mean_ms > 0.0).then(|| {
        let theoretical = 1000.0 / latency.fast.mean_ms * plan.fast_clients as f64;
        throughput.fast_rps / theoretical * 100.0
    });

    let assessment = report::assess(plan.mode, &counts, &latency);

    LoadReport {
        plan: plan.clone(),
        duration_secs: secs,
        requests: counts,
        latency,
        throughput,
        fast_efficiency_pct,
        assessment,
    }
}
