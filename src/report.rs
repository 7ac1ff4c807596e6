use colored::*;
use std::path::Path;

use crate::error::Result;
use crate::executor::RunSummary;
use crate::utils::hardware::HostInfo;

const MIB: u64 = 1024 * 1024;

pub fn print_summary(summary: &RunSummary, host: &HostInfo) {
    let m = &summary.metrics;

    println!();
    println!("{}", "🔥 ======== TEST RESULTS ======== 🔥".bold().white().on_blue());
    println!("{} {}", "⏰ Timestamp                :".bright_blue().bold(), m.timestamp.bold());
    println!("{} {}", "🎯 Scenario                 :".bright_blue().bold(), m.scenario.bold());
    println!("{} {}", "🌐 Target                   :".bright_blue().bold(), m.target_url.bold());
    println!(
        "{} {}",
        "🖥️  Host                     :".bright_blue().bold(),
        format!(
            "{} cores, {} / {} MiB free",
            host.cpu_cores,
            host.available_memory / MIB,
            host.total_memory / MIB
        )
        .bold()
    );
    println!(
        "{} {}",
        "👥 Virtual users            :".bright_blue().bold(),
        format!("{} for {:.1}s", m.vus, m.duration_secs).bold()
    );
    println!("{} {}", "✅ Total requests           :".bright_green().bold(), m.total_requests.to_string().bold());
    println!("{} {}", "✅ Successful requests      :".bright_green().bold(), m.successful_requests.to_string().bold());
    println!(
        "{} {}",
        "❌ Failed requests          :".bright_red().bold(),
        format!("{} ({:.2}%)", m.failed_requests, m.failure_rate * 100.0).bold()
    );
    println!("{} {}", "⚡ Fastest response (ms)    :".bright_cyan().bold(), format!("{:.2}", m.fastest_response).bold());
    println!("{} {}", "🐢 Slowest response (ms)    :".bright_yellow().bold(), format!("{:.2}", m.slowest_response).bold());
    println!("{} {}", "📊 Average response (ms)    :".bright_magenta().bold(), format!("{:.2}", m.avg_response_time).bold());
    println!("{} {}", "📊 Median response time (ms):".bright_magenta().bold(), format!("{:.2}", m.median_response_time).bold());
    println!("{} {}", "📊 p(90) response (ms)      :".bright_magenta().bold(), format!("{:.2}", m.p90_response_time).bold());
    println!("{} {}", "📊 p(95) response (ms)      :".bright_magenta().bold(), format!("{:.2}", m.p95_response_time).bold());
    println!("{} {}", "📈 Requests per second (RPS):".bright_blue().bold(), format!("{:.2}", m.throughput).bold());
    println!(
        "{} {}",
        "🔁 Iterations               :".bright_blue().bold(),
        format!(
            "{} ({:.2}/s, {} interrupted)",
            m.iterations, m.iteration_rate, m.interrupted_iterations
        )
        .bold()
    );

    println!();
    println!("{}", "📦 ======== STATUS BREAKDOWN ========".bold().white().on_blue());
    for (status, count) in &m.status_counts {
        println!("{}", format!("• {}: {}", status, count).bold());
    }

    if !m.checks.is_empty() {
        println!();
        println!("{}", "🔎 ======== CHECKS ========".bold().white().on_blue());
        for (name, counts) in &m.checks {
            let line = format!("{} ✓ {} / ✗ {}", name, counts.passes, counts.fails);
            if counts.fails == 0 {
                println!("{} {}", "✓".green().bold(), line);
            } else {
                println!("{} {}", "✗".red().bold(), line);
            }
        }
        println!("{}", format!("checks rate: {:.2}%", m.checks_rate * 100.0).bold());
    }

    if !summary.thresholds.is_empty() {
        println!();
        println!("{}", "🚦 ======== THRESHOLDS ========".bold().white().on_blue());
        for result in &summary.thresholds {
            let line = format!(
                "{} {} (observed {:.4})",
                result.metric, result.expression, result.observed
            );
            if result.passed {
                println!("{} {}", "✓".green().bold(), line);
            } else {
                println!("{} {}", "✗".red().bold(), line);
            }
        }
    }

    println!();
    if summary.passed {
        println!("{}", "RUN PASSED".green().bold());
    } else {
        println!("{}", "RUN FAILED: thresholds crossed".red().bold());
    }
}

pub fn export_summary(summary: &RunSummary, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}
