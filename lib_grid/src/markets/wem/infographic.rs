//! # WEM Infographic Endpoints
//!
//! Source B: the public WEM infographic CSV files. Each method returns the
//! parsed rows; joins and normalisation happen in the dataset layer because
//! several datasets combine two files.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::apicall::WemApiCall;
use crate::loggers::loggerlocal::LoggerLocal;
use crate::retrieve::ky_http::ClientOptions;
use crate::retrieve::outcome::FetchResult;
use crate::transform::RawRow;

/// Near-real-time price, demand, generation, outages and ESS prices.
pub const PULSE_PATH: &str = "public/infographic/neartime/pulse.csv";
/// Per-facility generation, `I01..I48` offsets back from `AS_AT`.
pub const GENERATION_PATH: &str = "public/infographic/generation.csv";
/// Facility fuel, capacity and coordinates.
pub const FACILITY_META_PATH: &str = "public/infographic/facility-meta-fuelmix.csv";
/// Rooftop PV against operational demand.
pub const DPV_DEMAND_PATH: &str = "public/infographic/dpvopdemand/distributed-pv_opdemand.csv";
/// Per-facility output for the last 96 half-hour periods.
pub const INTERVALS96_PATH: &str = "public/infographic/facility-intervals-last96.csv";

pub struct WemApi {
    call: WemApiCall,
}

impl WemApi {
    pub fn new(
        base_url: &str,
        options: ClientOptions,
        logger: Arc<LoggerLocal>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            call: WemApiCall::new(base_url, options, logger)?,
        })
    }

    pub async fn pulse(&self, token: &CancellationToken) -> FetchResult<Vec<RawRow>> {
        Ok(self.call.get_csv(PULSE_PATH, token).await)
    }

    pub async fn generation(&self, token: &CancellationToken) -> FetchResult<Vec<RawRow>> {
        Ok(self.call.get_csv(GENERATION_PATH, token).await)
    }

    pub async fn facility_meta(&self, token: &CancellationToken) -> FetchResult<Vec<RawRow>> {
        Ok(self.call.get_csv(FACILITY_META_PATH, token).await)
    }

    pub async fn dpv_demand(&self, token: &CancellationToken) -> FetchResult<Vec<RawRow>> {
        Ok(self.call.get_csv(DPV_DEMAND_PATH, token).await)
    }

    pub async fn intervals96(&self, token: &CancellationToken) -> FetchResult<Vec<RawRow>> {
        Ok(self.call.get_csv(INTERVALS96_PATH, token).await)
    }
}
