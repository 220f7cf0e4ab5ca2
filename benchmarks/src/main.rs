//! Polyglot benchmark runner.
//!
//! Drives the polyglot HTTP API to measure latency under slow-client
//! pressure and to verify that assignments are sticky per user.
//!
//! Usage:
//!   cargo run -p polyglot-bench -- slow-clients --target http://localhost:3000 --mode saturation
//!   cargo run -p polyglot-bench -- allocation --users 1000 --requests 5
//!   cargo run -p polyglot-bench -- --help

use clap::{Parser, Subcommand};

use polyglot_bench::report;
use polyglot_bench::results::BenchResult;
use polyglot_bench::scenarios::allocation::{self, AllocationArgs};
use polyglot_bench::scenarios::slow_clients::{self, SlowClientsArgs};

#[derive(Parser, Debug)]
#[command(name = "polyglot-bench", about = "System benchmarks for polyglot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fast clients alongside bandwidth-limited slow clients
    SlowClients(SlowClientsArgs),
    /// Verify that every user keeps one payload across requests
    Allocation(AllocationArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::SlowClients(args) => {
            let plan = args.plan();
            eprintln!("=== Polyglot Bench: slow-clients ({:?} mode) ===", plan.mode);
            eprintln!(
                "target={} fast={} slow={} requests={} slow_speed={}B/s duration={}s",
                plan.target,
                plan.fast_clients,
                plan.slow_clients,
                plan.requests_per_client,
                plan.slow_bytes_per_sec,
                plan.duration_secs
            );

            let result = slow_clients::run(&plan).await?;
            report::print_load_summary(&result);
            BenchResult::new(&plan.target, "slow-clients", &result).emit(args.output.as_deref())?;
        }
        Command::Allocation(args) => {
            eprintln!("=== Polyglot Bench: allocation ===");
            eprintln!(
                "target={} users={} requests={} concurrency={}",
                args.target, args.users, args.requests, args.concurrency
            );

            let result = allocation::run(&args).await?;
            report::print_allocation_summary(&result);

            let envelope = BenchResult::new(&args.target, "allocation", &result);
            std::fs::write(
                &args.output,
                report::allocation_markdown(&result, &envelope.timestamp),
            )?;
            eprintln!("Report written to {}", args.output);
            if let Some(path) = args.json.as_deref() {
                envelope.emit(Some(path))?;
            }

            if !result.passed() {
                anyhow::bail!(
                    "{} of {} users received inconsistent payloads",
                    result.inconsistent_users,
                    result.total_users
                );
            }
        }
    }

    Ok(())
}
