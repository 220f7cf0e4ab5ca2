//! Human-readable output: console summaries, the load-test assessment and
//! the allocation Markdown report.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::scenarios::allocation::AllocationResults;
use crate::scenarios::slow_clients::{LatencyBreakdown, LoadReport, Mode};
use crate::stats::{LatencySummary, RequestCounts};

const SAMPLE_USERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    fn label(self) -> &'static str {
        match self {
            Grade::Excellent => "Excellent",
            Grade::Good => "Good",
            Grade::Fair => "Fair",
            Grade::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HoggingVerdict {
    Detected,
    Warning,
    Unaffected,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    /// Which latencies were graded: "fast" when any fast samples exist.
    pub basis: &'static str,
    pub p50: Grade,
    pub p99: Grade,
    pub success_rate_pct: f64,
    pub success_rate: Grade,
    /// Only judged in saturation mode.
    pub hogging: Option<HoggingVerdict>,
}

pub fn grade_p50(ms: u64) -> Grade {
    match ms {
        0..=49 => Grade::Excellent,
        50..=99 => Grade::Good,
        100..=199 => Grade::Fair,
        _ => Grade::Poor,
    }
}

pub fn grade_p99(ms: u64) -> Grade {
    match ms {
        0..=199 => Grade::Excellent,
        200..=499 => Grade::Good,
        500..=999 => Grade::Fair,
        _ => Grade::Poor,
    }
}

pub fn grade_success_rate(pct: f64) -> Grade {
    if pct >= 99.9 {
        Grade::Excellent
    } else if pct >= 99.0 {
        Grade::Good
    } else if pct >= 95.0 {
        Grade::Fair
    } else {
        Grade::Poor
    }
}

pub fn hogging_verdict(fast_p99_ms: u64) -> HoggingVerdict {
    if fast_p99_ms > 500 {
        HoggingVerdict::Detected
    } else if fast_p99_ms > 200 {
        HoggingVerdict::Warning
    } else {
        HoggingVerdict::Unaffected
    }
}

pub fn assess(mode: Mode, counts: &RequestCounts, latency: &LatencyBreakdown) -> Assessment {
    let (basis, graded) = if latency.fast.count > 0 {
        ("fast", &latency.fast)
    } else {
        ("overall", &latency.overall)
    };
    let success_rate_pct = if counts.total > 0 {
        counts.success as f64 / counts.total as f64 * 100.0
    } else {
        0.0
    };

    Assessment {
        basis,
        p50: grade_p50(graded.p50_ms),
        p99: grade_p99(graded.p99_ms),
        success_rate_pct,
        success_rate: grade_success_rate(success_rate_pct),
        hogging: (mode == Mode::Saturation).then(|| hogging_verdict(latency.fast.p99_ms)),
    }
}

fn print_latency(title: &str, s: &LatencySummary) {
    eprintln!("{title}:");
    eprintln!("  Minimum:          {} ms", s.min_ms);
    eprintln!("  Average:          {:.1} ms", s.mean_ms);
    eprintln!("  Maximum:          {} ms", s.max_ms);
    eprintln!("  p50:              {} ms", s.p50_ms);
    eprintln!("  p90:              {} ms", s.p90_ms);
    eprintln!("  p99:              {} ms", s.p99_ms);
    eprintln!();
}

pub fn print_load_summary(report: &LoadReport) {
    let r = &report.requests;
    let pct = |n: u64| {
        if r.total > 0 {
            n as f64 / r.total as f64 * 100.0
        } else {
            0.0
        }
    };

    eprintln!();
    eprintln!("=== Load Test Results ({:.1}s) ===", report.duration_secs);
    eprintln!("Requests:");
    eprintln!("  Total:            {}", r.total);
    eprintln!("  Successful:       {} ({:.2}%)", r.success, pct(r.success));
    eprintln!("  Failed:           {} ({:.2}%)", r.failed, pct(r.failed));
    eprintln!("  Fast attempts:    {}", r.fast_attempts);
    eprintln!("  Slow attempts:    {}", r.slow_attempts);
    eprintln!();

    print_latency("Overall latency", &report.latency.overall);
    if report.latency.fast.count > 0 {
        print_latency("Fast client latency", &report.latency.fast);
    }
    if report.latency.slow.count > 0 {
        print_latency("Slow client latency (includes download time)", &report.latency.slow);
    }

    let t = &report.throughput;
    eprintln!("Throughput:");
    eprintln!("  Overall:          {:.2} req/s", t.overall_rps);
    if report.latency.fast.count > 0 {
        eprintln!("  Fast clients:     {:.2} req/s", t.fast_rps);
    }
    if report.latency.slow.count > 0 {
        eprintln!("  Slow clients:     {:.2} req/s", t.slow_rps);
    }
    if let Some(eff) = report.fast_efficiency_pct {
        eprintln!("  Fast efficiency:  {eff:.1}% of theoretical max");
        if eff < 50.0 {
            eprintln!("  Low efficiency suggests connection hogging");
        }
    }
    eprintln!();

    let a = &report.assessment;
    eprintln!("Assessment ({} clients):", a.basis);
    eprintln!("  p50:              {}", a.p50.label());
    eprintln!("  p99:              {}", a.p99.label());
    eprintln!(
        "  Success rate:     {} ({:.2}%)",
        a.success_rate.label(),
        a.success_rate_pct
    );
    match a.hogging {
        Some(HoggingVerdict::Detected) => {
            eprintln!("  Hogging:          DETECTED, fast client p99 above 500 ms")
        }
        Some(HoggingVerdict::Warning) => {
            eprintln!("  Hogging:          possible, fast client p99 above 200 ms")
        }
        Some(HoggingVerdict::Unaffected) => {
            eprintln!("  Hogging:          none, fast clients unaffected")
        }
        None => {}
    }
}

pub fn print_allocation_summary(results: &AllocationResults) {
    eprintln!();
    eprintln!("=== Allocation Test Summary ===");
    eprintln!(
        "Duration: {:.2}s, throughput: {:.2} req/s",
        results.duration_secs, results.requests_per_sec
    );
    eprintln!(
        "Requests: {} total, {} successful, {} failed",
        results.total_requests, results.successful_requests, results.failed_requests
    );
    eprintln!(
        "Users: {} total, {} consistent, {} inconsistent ({:.2}% consistent)",
        results.total_users,
        results.consistent_users,
        results.inconsistent_users,
        results.consistency_rate_pct
    );
    if results.passed() {
        eprintln!("PASS: every user received a consistent payload assignment");
    } else {
        eprintln!("FAIL: some users received inconsistent payload assignments");
        for line in &results.inconsistencies {
            eprintln!("  {line}");
        }
    }
    eprintln!("Payload distribution:");
    for (name, users) in &results.distribution {
        eprintln!(
            "  {name}: {users} users ({:.1}%)",
            share(*users, results.total_users)
        );
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Markdown report for an allocation run, stamped with `timestamp`.
pub fn allocation_markdown(results: &AllocationResults, timestamp: &str) -> String {
    let mut md = String::new();
    write_allocation_markdown(&mut md, results, timestamp)
        .expect("formatting into a String is infallible");
    md
}

fn write_allocation_markdown(
    md: &mut String,
    results: &AllocationResults,
    timestamp: &str,
) -> fmt::Result {
    let success_rate = if results.total_requests > 0 {
        results.successful_requests as f64 / results.total_requests as f64 * 100.0
    } else {
        0.0
    };

    writeln!(md, "# A/B Allocation Test Results\n")?;
    writeln!(md, "**Test Date:** {timestamp}\n")?;

    writeln!(md, "## Test Configuration\n")?;
    writeln!(md, "- **Total Users:** {}", results.total_users)?;
    writeln!(md, "- **Total Requests:** {}", results.total_requests)?;
    writeln!(md, "- **Test Duration:** {:.3}s", results.duration_secs)?;
    writeln!(md, "- **Throughput:** {:.2} req/s\n", results.requests_per_sec)?;

    writeln!(md, "## Request Statistics\n")?;
    writeln!(md, "| Metric | Value |")?;
    writeln!(md, "|--------|-------|")?;
    writeln!(md, "| Total Requests | {} |", results.total_requests)?;
    writeln!(md, "| Successful | {} |", results.successful_requests)?;
    writeln!(md, "| Failed | {} |", results.failed_requests)?;
    writeln!(md, "| Success Rate | {success_rate:.2}% |\n")?;

    writeln!(md, "## Allocation Consistency\n")?;
    writeln!(md, "| Metric | Value |")?;
    writeln!(md, "|--------|-------|")?;
    writeln!(md, "| Total Users | {} |", results.total_users)?;
    writeln!(md, "| Consistent Users | {} |", results.consistent_users)?;
    writeln!(md, "| Inconsistent Users | {} |", results.inconsistent_users)?;
    writeln!(
        md,
        "| **Consistency Rate** | **{:.2}%** |\n",
        results.consistency_rate_pct
    )?;

    if results.passed() {
        writeln!(md, "### PASS\n")?;
        writeln!(
            md,
            "All users received consistent payload assignments across multiple requests.\n"
        )?;
    } else {
        writeln!(md, "### FAIL\n")?;
        writeln!(md, "Some users received inconsistent payload assignments.\n")?;
        writeln!(md, "**Inconsistency Details:**\n")?;
        for line in &results.inconsistencies {
            writeln!(md, "- {line}")?;
        }
        md.push('\n');
    }

    writeln!(md, "## Payload Distribution\n")?;
    writeln!(md, "| Payload | Users | Percentage |")?;
    writeln!(md, "|---------|-------|------------|")?;
    for (name, users) in &results.distribution {
        writeln!(
            md,
            "| {name} | {users} | {:.1}% |",
            share(*users, results.total_users)
        )?;
    }
    md.push('\n');

    writeln!(md, "## Sample User Allocations\n")?;
    writeln!(md, "First {SAMPLE_USERS} users by id:\n")?;
    writeln!(md, "| User ID | Payload | Requests | Consistent |")?;
    writeln!(md, "|---------|---------|----------|------------|")?;
    for alloc in results.allocations.iter().take(SAMPLE_USERS) {
        writeln!(
            md,
            "| {} | {} | {} | {} |",
            alloc.user_id,
            alloc.payload_name,
            alloc.request_count,
            if alloc.consistent { "yes" } else { "no" }
        )?;
    }
    Ok(())
}
