use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::DataError;

pub const EMPTY_VALUE: &str = "---";

/// Parse an AS number in asplain ("64512") or asdot ("1.10") notation
pub fn parse_asn(value: &str) -> Result<u32, DataError> {
    let value = value.trim();
    let invalid = || DataError::InvalidAsn(value.to_string());
    match value.split_once('.') {
        Some((high, low)) => {
            let high: u16 = high.parse().map_err(|_| invalid())?;
            let low: u16 = low.parse().map_err(|_| invalid())?;
            Ok((u32::from(high) << 16) + u32::from(low))
        }
        None => value.parse().map_err(|_| invalid()),
    }
}

pub fn asn_to_dotted(asn: u32) -> String {
    if asn <= u32::from(u16::MAX) {
        format!("{}", asn)
    } else {
        format!("{}.{}", asn >> 16, asn & 0xffff)
    }
}

/// Make an address safe for use inside a neighbor label
/// (E.g. "10.0.0.5" -> "10_0_0_5", "fd00::1" -> "fd00__1")
pub fn underscore(address: &str) -> String {
    address.replace(|c: char| c == '.' || c == ':', "_")
}

fn fit_with_remainder(dividend: u64, divisor: u64) -> (u64, u64) {
    let fit = dividend / divisor;
    let remainder = dividend % divisor;
    (fit, remainder)
}

pub fn format_elapsed_time(elapsed: Duration) -> String {
    let (hours, remainder) = fit_with_remainder(elapsed.as_secs(), 3600);
    let (minutes, seconds) = fit_with_remainder(remainder, 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn format_time_as_elapsed(time: DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - time).to_std().unwrap_or_default();
    format_elapsed_time(elapsed)
}

pub fn maybe_string<T>(item: Option<&T>) -> String
where
    T: ToString,
{
    item.map(std::string::ToString::to_string)
        .unwrap_or_else(|| String::from(EMPTY_VALUE))
}
