//! # Live Feed Smoke Test
//!
//! Builds the whole data layer from the layered configuration, fetches every
//! dataset once against the real NEM and WEM upstreams and prints each cell
//! as JSON. With `--watch-minutes` the datasets are then registered with the
//! poller and every cell change is reported until the time is up.

#![forbid(unsafe_code)]

use std::time::Duration;

use clap::Parser;
use lib_grid::core::{CellState, CellStatus, Dataset, FeedHub, PollRegistration, Subscription};
use lib_grid::loggers::init_tracing;
use lib_grid::markets::nem::Timescale;
use serde::Serialize;

/// Command line options.
#[derive(Debug, Parser)]
#[command(name = "test_feeds", about = "Fetch every NEM/WEM dataset once and print the cells")]
struct Args {
    /// Only datasets whose key starts with this prefix (`nem`, `wem:pulse`, ...).
    #[arg(long)]
    only: Option<String>,

    /// Keep polling for this many minutes after the first pass.
    #[arg(long, default_value_t = 0)]
    watch_minutes: u64,

    /// Print at most this many characters of each cell's JSON.
    #[arg(long, default_value_t = 1200)]
    max_chars: usize,
}

/// Outcome of one dataset in the first pass.
struct Checked {
    key: String,
    status: CellStatus,
    error: Option<String>,
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}\n... ({} chars total)", text.chars().count())
}

async fn check<T>(dataset: &Dataset<T>, args: &Args) -> Option<Checked>
where
    T: Serialize + Send + Sync + 'static,
{
    if let Some(prefix) = &args.only {
        if !dataset.key().starts_with(prefix.as_str()) {
            return None;
        }
    }

    let report = dataset.fetch_if_stale().await;
    let state = dataset.get();
    println!("-----------------------------------------------");
    println!("[{}] {:?} -> {:?}", dataset.key(), report, state.status);
    match serde_json::to_string_pretty(&state) {
        Ok(json) => println!("{}", clip(&json, args.max_chars)),
        Err(e) => eprintln!("[{}] cannot serialise cell: {}", dataset.key(), e),
    }

    Some(Checked {
        key: dataset.key().to_string(),
        status: state.status,
        error: state.error.clone(),
    })
}

fn announce<T: Send + Sync + 'static>(state: &CellState<T>, key: &str) {
    match &state.error {
        Some(error) => println!("[watch] {key}: {:?} ({error})", state.status),
        None => println!("[watch] {key}: {:?} fetched_at={}", state.status, state.fetched_at),
    }
}

fn keep_warm<T: Send + Sync + 'static>(
    dataset: &Dataset<T>,
    registrations: &mut Vec<PollRegistration>,
    subscriptions: &mut Vec<Subscription>,
) {
    let key = dataset.key().to_string();
    subscriptions.push(dataset.subscribe(move |state| announce(state, &key)));
    registrations.push(dataset.register());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info,lib_grid=debug");

    let config = lib_grid::load_config()?;
    let hub = FeedHub::new(config)?;
    println!("[*] {:?}", hub);

    let nem_summary = hub.nem_elec_summary();
    let nem_pd30 = hub.nem_price_and_demand(Timescale::ThirtyMin);
    let nem_pd5 = hub.nem_price_and_demand(Timescale::FiveMin);
    let nem_cumulative = hub.nem_cumulative_price();
    let nem_limits = hub.nem_market_price_limits();
    let nem_fuel = hub.nem_fuel_mix();
    let nem_outlook = hub.nem_seven_day_outlook();
    let nem_daily = hub.nem_daily_prices_current_month();
    let wem_pulse = hub.wem_pulse();
    let wem_meta = hub.wem_facility_meta();
    let wem_fuel = hub.wem_fuel_mix();
    let wem_dispatch = hub.wem_dispatch();
    let wem_stack = hub.wem_generation_stack();
    let wem_facilities = hub.wem_facilities();
    let wem_dpv = hub.wem_dpv_demand();

    let checked: Vec<Checked> = vec![
        check(&nem_summary, &args).await,
        check(&nem_pd30, &args).await,
        check(&nem_pd5, &args).await,
        check(&nem_cumulative, &args).await,
        check(&nem_limits, &args).await,
        check(&nem_fuel, &args).await,
        check(&nem_outlook, &args).await,
        check(&nem_daily, &args).await,
        check(&wem_pulse, &args).await,
        check(&wem_meta, &args).await,
        check(&wem_fuel, &args).await,
        check(&wem_dispatch, &args).await,
        check(&wem_stack, &args).await,
        check(&wem_facilities, &args).await,
        check(&wem_dpv, &args).await,
    ]
    .into_iter()
    .flatten()
    .collect();

    println!("===============================================");
    for item in &checked {
        match &item.error {
            Some(error) => println!("{:<28} {:?}  {}", item.key, item.status, error),
            None => println!("{:<28} {:?}", item.key, item.status),
        }
    }
    if let Some(share) = hub.nem_renewable_share(None) {
        println!("NEM renewable share: {:.1}%", share.percent);
    }
    if let Some(share) = hub.wem_renewable_share() {
        println!("WEM renewable share: {:.1}%", share.percent);
    }

    if args.watch_minutes > 0 {
        let mut registrations = Vec::new();
        let mut subscriptions = Vec::new();
        keep_warm(&nem_summary, &mut registrations, &mut subscriptions);
        keep_warm(&nem_pd30, &mut registrations, &mut subscriptions);
        keep_warm(&nem_pd5, &mut registrations, &mut subscriptions);
        keep_warm(&nem_fuel, &mut registrations, &mut subscriptions);
        keep_warm(&wem_pulse, &mut registrations, &mut subscriptions);
        keep_warm(&wem_fuel, &mut registrations, &mut subscriptions);
        keep_warm(&wem_dpv, &mut registrations, &mut subscriptions);

        hub.start_polling();
        println!("[*] polling {:?} for {} minute(s)", hub.poller().keys(), args.watch_minutes);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.watch_minutes * 60)) => {},
            _ = tokio::signal::ctrl_c() => println!("[*] interrupted"),
        }

        drop(subscriptions);
        drop(registrations);
    }

    hub.shutdown();

    let failed = checked.iter().filter(|item| item.status == CellStatus::Error).count();
    if failed > 0 {
        anyhow::bail!("{failed} dataset(s) ended in error");
    }
    Ok(())
}
