//! Allocation consistency check.
//!
//! Sends `users x requests` assignments through a bounded worker pool and
//! verifies that every user saw exactly one payload name.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::PolyglotClient;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(clap::Args, Debug, Clone)]
pub struct AllocationArgs {
    /// Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    pub target: String,

    /// Number of unique users to test
    #[arg(long, default_value_t = 100)]
    pub users: usize,

    /// Number of requests per user
    #[arg(long, default_value_t = 5)]
    pub requests: usize,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    /// Markdown report path
    #[arg(long, default_value = "allocation_test_results.md")]
    pub output: String,

    /// Also write the results as JSON to this path
    #[arg(long)]
    pub json: Option<String>,

    /// Per-request timeout (seconds)
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAllocation {
    pub user_id: String,
    /// Most frequently observed name; the first one seen wins a tie.
    pub payload_name: String,
    pub request_count: usize,
    pub consistent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResults {
    pub total_users: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consistent_users: usize,
    pub inconsistent_users: usize,
    pub consistency_rate_pct: f64,
    pub duration_secs: f64,
    pub requests_per_sec: f64,
    /// Users per primary payload name.
    pub distribution: BTreeMap<String, usize>,
    /// Sorted by user id.
    pub allocations: Vec<UserAllocation>,
    pub inconsistencies: Vec<String>,
}

impl AllocationResults {
    pub fn passed(&self) -> bool {
        self.inconsistent_users == 0
    }
}

/// Payload names a user has seen, in first-seen order, with counts.
pub type Observations = HashMap<String, Vec<(String, usize)>>;

fn observe(observations: &mut Observations, user_id: &str, name: String) {
    let seen = observations.entry(user_id.to_string()).or_default();
    match seen.iter_mut().find(|(n, _)| *n == name) {
        Some((_, count)) => *count += 1,
        None => seen.push((name, 1)),
    }
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
}

pub async fn run(args: &AllocationArgs) -> anyhow::Result<AllocationResults> {
    let client = PolyglotClient::new(&args.target, Duration::from_secs(args.timeout_secs))?;
    client
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("health check against {} failed: {e}", args.target))?;
    eprintln!("  Server health check passed");

    let user_ids: Arc<Vec<String>> = Arc::new(
        (0..args.users)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect(),
    );
    let per_user = args.requests;
    let jobs = args.users * per_user;

    let cursor = Arc::new(AtomicUsize::new(0));
    let counters = Arc::new(Counters::default());
    let observations = Arc::new(Mutex::new(Observations::new()));
    let tracker = TaskTracker::new();

    let started = Instant::now();
    for _ in 0..args.concurrency.max(1) {
        let client = client.clone();
        let user_ids = user_ids.clone();
        let cursor = cursor.clone();
        let counters = counters.clone();
        let observations = observations.clone();
        tracker.spawn(async move {
            loop {
                let job = cursor.fetch_add(1, Ordering::Relaxed);
                if job >= jobs {
                    break;
                }
                let user_id = &user_ids[job / per_user];
                counters.total.fetch_add(1, Ordering::Relaxed);
                match client.assign(user_id).await {
                    Ok(resp) => {
                        counters.success.fetch_add(1, Ordering::Relaxed);
                        observe(&mut observations.lock(), user_id, resp.selected_payload_name);
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
    }
    tracker.close();

    let progress_stop = CancellationToken::new();
    let progress = {
        let counters = counters.clone();
        let stop = progress_stop.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let done = counters.total.load(Ordering::Relaxed);
                        let pct = if jobs > 0 { done as f64 / jobs as f64 * 100.0 } else { 100.0 };
                        eprintln!("  progress: {done}/{jobs} ({pct:.1}%)");
                    }
                }
            }
        })
    };

    tracker.wait().await;
    let elapsed = started.elapsed();
    progress_stop.cancel();
    let _ = progress.await;

    let observations = std::mem::take(&mut *observations.lock());
    Ok(analyze(
        observations,
        counters.total.load(Ordering::Relaxed),
        counters.success.load(Ordering::Relaxed),
        counters.failed.load(Ordering::Relaxed),
        elapsed,
    ))
}

/// Turn raw observations into verdicts. Users with no successful response
/// have no observations and are not counted.
pub fn analyze(
    observations: Observations,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    elapsed: Duration,
) -> AllocationResults {
    let mut allocations = Vec::with_capacity(observations.len());
    let mut distribution = BTreeMap::new();
    let mut inconsistencies = Vec::new();

    let mut users: Vec<_> = observations.into_iter().collect();
    users.sort_by(|a, b| a.0.cmp(&b.0));

    for (user_id, seen) in users {
        let mut primary: Option<&(String, usize)> = None;
        for entry in &seen {
            if primary.map_or(true, |p| entry.1 > p.1) {
                primary = Some(entry);
            }
        }
        let Some((payload_name, _)) = primary else {
            continue;
        };
        let payload_name = payload_name.clone();
        let consistent = seen.len() == 1;

        *distribution.entry(payload_name.clone()).or_insert(0) += 1;
        if !consistent {
            let detail = seen
                .iter()
                .map(|(name, count)| format!("{name}({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            inconsistencies.push(format!("User {user_id} received multiple payloads: {detail}"));
        }
        allocations.push(UserAllocation {
            user_id,
            payload_name,
            request_count: seen.iter().map(|(_, c)| c).sum(),
            consistent,
        });
    }

    let total_users = allocations.len();
    let consistent_users = allocations.iter().filter(|a| a.consistent).count();
    let secs = elapsed.as_secs_f64();

    AllocationResults {
        total_users,
        total_requests,
        successful_requests,
        failed_requests,
        consistent_users,
        inconsistent_users: total_users - consistent_users,
        consistency_rate_pct: if total_users > 0 {
            consistent_users as f64 / total_users as f64 * 100.0
        } else {
            0.0
        },
        duration_secs: secs,
        requests_per_sec: if secs > 0.0 {
            successful_requests as f64 / secs
        } else {
            0.0
        },
        distribution,
        allocations,
        inconsistencies,
    }
}
