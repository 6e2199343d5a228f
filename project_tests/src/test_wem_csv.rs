//! # WEM CSV Live Check
//!
//! Downloads each raw WEM infographic file through `WemApi` and reports the
//! row count and the columns seen, which is the quickest way to notice an
//! upstream header rename before the transforms start falling back to
//! defaults.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use lib_grid::loggers::init_tracing;
use lib_grid::loggers::loggerlocal::LoggerLocal;
use lib_grid::markets::wem::infographic::{
    DPV_DEMAND_PATH, FACILITY_META_PATH, GENERATION_PATH, INTERVALS96_PATH, PULSE_PATH,
};
use lib_grid::markets::wem::WemApi;
use lib_grid::retrieve::ky_http::ClientOptions;
use lib_grid::transform::RawRow;
use lib_grid::FetchOutcome;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn columns(rows: &[RawRow]) -> BTreeSet<&str> {
    rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let config = lib_grid::load_config()?;
    let logger = Arc::new(LoggerLocal::new("test_wem_csv".to_string(), None));
    let options = ClientOptions {
        timeout: config.request_timeout(),
        retry_limit: config.retry_limit,
        retry_status_codes: config.retry_status_codes.clone(),
        ..ClientOptions::default()
    };
    let wem = WemApi::new(&config.wem_base, options, logger)?;
    let token = CancellationToken::new();

    let files = [
        (PULSE_PATH, wem.pulse(&token).await?),
        (GENERATION_PATH, wem.generation(&token).await?),
        (FACILITY_META_PATH, wem.facility_meta(&token).await?),
        (DPV_DEMAND_PATH, wem.dpv_demand(&token).await?),
        (INTERVALS96_PATH, wem.intervals96(&token).await?),
    ];

    let mut failures = 0;
    for (path, outcome) in files {
        match outcome {
            FetchOutcome::Succeeded(rows) => {
                let seen = columns(&rows);
                info!(path, rows = rows.len(), columns = seen.len(), "fetched");
                println!("[OK]   {path}: {} rows", rows.len());
                println!("       {}", seen.into_iter().collect::<Vec<_>>().join(", "));
            }
            FetchOutcome::Failed(message) => {
                failures += 1;
                println!("[FAIL] {path}: {message}");
            }
            FetchOutcome::Cancelled => println!("[SKIP] {path}: cancelled"),
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} WEM file(s) failed");
    }
    Ok(())
}
