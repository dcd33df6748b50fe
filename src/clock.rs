//! Wall-clock stamps in the deployment timezone.
//!
//! Hosts in the field tend to drift or boot with a bad RTC, so the clock
//! prefers an HTTP time endpoint when one is configured and falls back to
//! the local clock shifted into the configured offset.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::remote::StampedTime;

const ENDPOINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Clock producing date/time stamps in a fixed offset.
pub struct WallClock {
    endpoint: Option<String>,
    offset: FixedOffset,
}

impl WallClock {
    /// Build a clock for the given UTC offset in hours.
    pub fn new(endpoint: Option<String>, utc_offset_hours: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("utc offset {}h out of range", utc_offset_hours))?;
        Ok(Self { endpoint, offset })
    }

    /// Current stamp, from the endpoint when possible.
    pub fn now_stamp(&self) -> StampedTime {
        if let Some(endpoint) = &self.endpoint {
            match self.fetch_remote(endpoint) {
                Ok(stamp) => return stamp,
                Err(err) => {
                    log::warn!("time endpoint {} failed: {:#}, using local clock", endpoint, err);
                }
            }
        }
        self.stamp_from(Utc::now().with_timezone(&self.offset))
    }

    fn fetch_remote(&self, endpoint: &str) -> Result<StampedTime> {
        let body = ureq::get(endpoint)
            .call()
            .context("fetch time endpoint")?
            .into_string()
            .context("read time endpoint body")?;
        self.parse_endpoint_body(&body)
    }

    /// Parse an endpoint response. The endpoint reports UTC; the stamp is
    /// shifted into the configured offset.
    fn parse_endpoint_body(&self, body: &str) -> Result<StampedTime> {
        let naive = NaiveDateTime::parse_from_str(body.trim(), ENDPOINT_FORMAT)
            .with_context(|| format!("parse time endpoint response '{}'", body.trim()))?;
        let utc = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
        Ok(self.stamp_from(utc.with_timezone(&self.offset)))
    }

    fn stamp_from(&self, moment: DateTime<FixedOffset>) -> StampedTime {
        StampedTime {
            date: moment.format(DATE_FORMAT).to_string(),
            time: moment.format(TIME_FORMAT).to_string(),
        }
    }
}
