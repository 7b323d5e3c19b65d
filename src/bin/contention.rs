//! Fires concurrent bookings at the same court and slot and checks that exactly one wins.
//!
//! Needs a running server and a staff access token for the facility:
//! `BASE_URL`, `FACILITY_ID`, `COURT_ID`, `ACCESS_TOKEN`, optional `SLOTS`, `CONCURRENCY`, `RPS`.

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use colored::*;
use governor::{Quota, RateLimiter};
use hdrhistogram::Histogram;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

enum Outcome {
    Won,
    SlotTaken,
    Failed(StatusCode),
    Transport,
}

struct Settings {
    base_url: String,
    facility_id: String,
    court_id: String,
    token: String,
    slots: u32,
    concurrency: u32,
    rps: u32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn settings() -> Result<Settings, String> {
    let required = |key: &str| env::var(key).map_err(|_| format!("{} must be set", key));
    let number = |key: &str, default: u32| env_or(key, &default.to_string()).parse::<u32>().map_err(|_| format!("{} must be a number", key));
    Ok(Settings {
        base_url: env_or("BASE_URL", "http://localhost:3000"),
        facility_id: required("FACILITY_ID")?,
        court_id: required("COURT_ID")?,
        token: required("ACCESS_TOKEN")?,
        slots: number("SLOTS", 5)?.max(1),
        concurrency: number("CONCURRENCY", 50)?.max(1),
        rps: number("RPS", 500)?.max(1),
    })
}

#[tokio::main]
async fn main() {
    let settings = match settings() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("{}", e.red().bold());
            std::process::exit(2);
        }
    };

    println!("{}", "Court booking contention run".bold().green());
    println!("Target: {} facility {} court {}", settings.base_url, settings.facility_id, settings.court_id);

    let client = match Client::builder().pool_max_idle_per_host(1000).timeout(Duration::from_secs(10)).build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", format!("Failed to build HTTP client: {}", e).red().bold());
            std::process::exit(2);
        }
    };

    if client.get(format!("{}/health", settings.base_url)).send().await.is_err() {
        eprintln!("{}", format!("Server is not reachable at {}", settings.base_url).red().bold());
        std::process::exit(1);
    }

    println!("{:<6} | {:<8} | {:<8} | {:<8} | {:<11} | {:<11}", "Slot", "Winners", "Taken", "Errors", "Mean (ms)", "P99 (ms)");
    println!("{:-<6}-+-{:-<8}-+-{:-<8}-+-{:-<8}-+-{:-<11}-+-{:-<11}", "", "", "", "", "", "");

    let mut violations = 0;
    for slot in 0..settings.slots {
        let winners = run_slot(&client, &settings, slot).await;
        if winners != 1 {
            violations += 1;
        }
    }

    if violations == 0 {
        println!("\n{}", "Every slot had exactly one winner.".green().bold());
    } else {
        println!("\n{}", format!("{} slot(s) did not have exactly one winner.", violations).red().bold());
        std::process::exit(1);
    }
}

async fn run_slot(client: &Client, settings: &Arc<Settings>, slot: u32) -> u32 {
    // Random hour on a random future day so reruns do not collide with earlier data.
    let days = rand::thread_rng().gen_range(30..3000);
    let hour = rand::thread_rng().gen_range(8..20);
    let start = (Utc::now() + ChronoDuration::days(days))
        .with_hour(hour).and_then(|t| t.with_minute(0)).and_then(|t| t.with_second(0)).and_then(|t| t.with_nanosecond(0))
        .unwrap_or_else(Utc::now);
    let end = start + ChronoDuration::hours(1);

    let limiter = Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(settings.rps).unwrap_or(NonZeroU32::MIN))));
    let (tx, mut rx) = mpsc::channel(settings.concurrency as usize);

    for _ in 0..settings.concurrency {
        let client = client.clone();
        let settings = settings.clone();
        let limiter = limiter.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            limiter.until_ready().await;
            let body = json!({
                "court_ids": [settings.court_id],
                "start": start,
                "end": end,
                "primary_user_id": format!("contention-{}", Uuid::new_v4()),
            });
            let req_start = Instant::now();
            let res = client.post(format!("{}/api/v1/{}/reservations", settings.base_url, settings.facility_id))
                .bearer_auth(&settings.token)
                .json(&body)
                .send()
                .await;
            let latency = req_start.elapsed();

            let outcome = match res {
                Ok(r) if r.status() == StatusCode::CREATED => Outcome::Won,
                Ok(r) if r.status() == StatusCode::CONFLICT => {
                    let status = r.status();
                    let body: Value = r.json().await.unwrap_or(Value::Null);
                    if body["conflict"]["code"] == "slot_unavailable" { Outcome::SlotTaken } else { Outcome::Failed(status) }
                }
                Ok(r) => Outcome::Failed(r.status()),
                Err(_) => Outcome::Transport,
            };
            let _ = tx.send((latency, outcome)).await;
        });
    }
    drop(tx);

    let mut histogram = match Histogram::<u64>::new(3) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Histogram setup failed: {:?}", e);
            return 0;
        }
    };
    let (mut winners, mut taken, mut errors) = (0u32, 0u32, 0u32);

    while let Some((latency, outcome)) = rx.recv().await {
        let _ = histogram.record(latency.as_micros() as u64);
        match outcome {
            Outcome::Won => winners += 1,
            Outcome::SlotTaken => taken += 1,
            Outcome::Failed(status) => {
                errors += 1;
                eprintln!("{}", format!("unexpected status {}", status).yellow());
            }
            Outcome::Transport => errors += 1,
        }
    }

    let winners_col = if winners == 1 { winners.to_string().green() } else { winners.to_string().red().bold() };
    println!(
        "{:<6} | {:<8} | {:<8} | {:<8} | {:<11.2} | {:<11.2}",
        slot,
        winners_col,
        taken,
        errors,
        histogram.mean() / 1000.0,
        histogram.value_at_quantile(0.99) as f64 / 1000.0,
    );

    winners
}
