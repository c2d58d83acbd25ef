//! Canonical record normalizer
//!
//! Pure mappings from each vendor's raw payload to [`TrailerRecord`]. Records
//! without a usable coordinate pair are dropped here. A coordinate of exactly
//! zero counts as "no fix", so an asset genuinely parked at 0/0 is discarded
//! too (known limitation, kept for parity with the vendors' "no fix" output).

use crate::clients::skybitz::Gls;
use crate::clients::skybitz_time::SkyBitzTime;
use crate::clients::spireon::SpireonAsset;
use crate::models::{Provider, TrailerRecord, TrailerStatus};
use crate::registry::{SkyBitzAccount, SpireonAccount};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

/// km/h to mph
pub const KMH_TO_MPH: f64 = 0.621371;

const UNKNOWN: &str = "Unknown";

// ============================================================================
// Shared helpers
// ============================================================================

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `"NRG Trucking (4477006)"` + `"42"` -> `"NRGTrucking(4477006)-42"`
pub fn record_id(account_name: &str, asset_id: &str) -> String {
    let compact: String = account_name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{}-{}", compact, asset_id)
}

/// Both coordinates present, finite and non-zero
pub fn valid_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Option<(f64, f64)> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0 => {
            Some((lat, lng))
        }
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// JSON number or numeric string
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// JSON string or number rendered as text
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// RFC 3339 string or epoch milliseconds
fn parse_reported_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Whole model years only; fractional or out-of-range values are dropped.
fn model_year(value: &Value) -> Option<i32> {
    let raw = value_as_f64(value)?;
    if raw.fract() != 0.0 || raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
        warn!("Ignoring invalid vehicle year: {}", value);
        return None;
    }
    Some(raw as i32)
}

// ============================================================================
// Spireon
// ============================================================================

pub fn normalize_spireon(account: &SpireonAccount, assets: &[SpireonAsset]) -> Vec<TrailerRecord> {
    assets
        .iter()
        .filter_map(|asset| spireon_record(account, asset))
        .collect()
}

pub fn spireon_record(account: &SpireonAccount, asset: &SpireonAsset) -> Option<TrailerRecord> {
    let location = asset.last_location.as_ref()?;
    let (latitude, longitude) =
        valid_coordinates(value_as_f64(&location.lat), value_as_f64(&location.lng))?;

    let asset_id = value_as_string(&asset.id)
        .or_else(|| non_empty(asset.name.as_ref()))
        .unwrap_or_else(|| "unknown".to_string());

    let raw_speed = value_as_f64(&asset.speed).unwrap_or(0.0);
    let status = match asset.status.as_deref().map(str::trim) {
        Some("Moving") | Some("Driving") => TrailerStatus::Moving,
        Some(s) if !s.is_empty() => TrailerStatus::Parked,
        _ => TrailerStatus::from_speed(raw_speed),
    };
    let speed = round_one_decimal(raw_speed);

    let reported = if asset.location_last_reported.is_null() {
        &asset.last_updated
    } else {
        &asset.location_last_reported
    };
    let last_update = if reported.is_null() {
        Utc::now()
    } else {
        parse_reported_time(reported).unwrap_or_else(|| {
            warn!("Failed to parse Spireon timestamp: {}", reported);
            Utc::now()
        })
    };

    let driver = non_empty(asset.driver_name.as_ref())
        .or_else(|| non_empty(asset.operator_name.as_ref()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let device_id = asset
        .instrumentation_ref
        .as_ref()
        .and_then(|r| value_as_string(&r.device_id))
        .unwrap_or_else(|| asset_id.clone());

    let original_id = non_empty(asset.name.as_ref()).unwrap_or_else(|| asset_id.clone());

    let address = location
        .address
        .as_ref()
        .map(|a| {
            [non_empty(a.city.as_ref()), non_empty(a.state_or_province.as_ref())]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    Some(TrailerRecord {
        id: record_id(&account.name, &asset_id),
        provider: Provider::Spireon,
        account: account.name.clone(),
        latitude,
        longitude,
        speed,
        status,
        last_update,
        driver,
        device_id,
        original_id,
        make: non_empty(asset.make.as_ref()),
        model: non_empty(asset.model.as_ref()),
        year: model_year(&asset.year),
        vin: non_empty(asset.vin.as_ref()),
        odometer: value_as_f64(&asset.odometer),
        address,
    })
}

// ============================================================================
// SkyBitz
// ============================================================================

pub fn normalize_skybitz(account: &SkyBitzAccount, reports: &[Gls]) -> Vec<TrailerRecord> {
    reports
        .iter()
        .enumerate()
        .filter_map(|(index, gls)| skybitz_record(account, index, gls))
        .collect()
}

/// Parse a SkyBitz time, falling back to now on missing or malformed input.
pub fn skybitz_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Utc::now(),
        Some(s) => match s.parse::<SkyBitzTime>() {
            Ok(t) => t.into_utc(),
            Err(e) => {
                warn!("Failed to parse SkyBitz timestamp: {}", e);
                Utc::now()
            }
        },
    }
}

/// `index` is the report's position in the response, used as the asset id of
/// last resort.
pub fn skybitz_record(account: &SkyBitzAccount, index: usize, gls: &Gls) -> Option<TrailerRecord> {
    let (latitude, longitude) = valid_coordinates(
        gls.latitude.as_deref().and_then(parse_number),
        gls.longitude.as_deref().and_then(parse_number),
    )?;

    let asset = gls.asset.as_ref();
    let asset_id = asset.and_then(|a| non_empty(a.assetid.as_ref()));
    let mtsn = non_empty(gls.mtsn.as_ref());

    let id_part = asset_id
        .clone()
        .or_else(|| mtsn.clone())
        .unwrap_or_else(|| index.to_string());

    let speed_kmh = gls.speed.as_deref().and_then(parse_number).unwrap_or(0.0);
    let speed_mph = speed_kmh * KMH_TO_MPH;
    let speed = round_one_decimal(speed_mph);

    let address = gls
        .landmark
        .as_ref()
        .map(|l| {
            [non_empty(l.geoname.as_ref()), non_empty(l.state.as_ref())]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    Some(TrailerRecord {
        id: record_id(&account.name, &id_part),
        provider: Provider::SkyBitz,
        account: account.name.clone(),
        latitude,
        longitude,
        speed,
        status: TrailerStatus::from_speed(speed_mph),
        last_update: skybitz_timestamp(gls.time.as_deref()),
        driver: asset
            .and_then(|a| non_empty(a.owner.as_ref()))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        device_id: mtsn
            .clone()
            .or_else(|| asset_id.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        original_id: asset_id
            .or(mtsn)
            .unwrap_or_else(|| "unknown".to_string()),
        make: asset.and_then(|a| non_empty(a.assettype.as_ref())),
        model: non_empty(gls.devicetype.as_ref()),
        year: None,
        vin: None,
        odometer: gls.totaldevicemileage.as_deref().and_then(parse_number),
        address,
    })
}
