use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::types::{QuoteSnapshot, ScanItem, ScanParams};

/// Market-data field ids requested in snapshots.
pub const FIELD_LAST_PRICE: &str = "31";
pub const FIELD_VOLUME: &str = "7762";
pub const FIELD_IMPLIED_VOL: &str = "7283";

pub fn snapshot_fields() -> String {
    [FIELD_LAST_PRICE, FIELD_VOLUME, FIELD_IMPLIED_VOL].join(",")
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// `GET /iserver/auth/status`
#[derive(Debug, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub competing: bool,
    pub message: Option<String>,
}

impl AuthStatus {
    pub fn is_ready(&self) -> bool {
        self.authenticated && self.connected
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, PartialEq)]
pub struct ScannerFilter {
    pub code: &'static str,
    pub value: serde_json::Value,
}

/// `POST /iserver/scanner/run` body.
#[derive(Debug, Serialize)]
pub struct ScannerRequest {
    pub instrument: String,
    pub location: String,
    #[serde(rename = "type")]
    pub scan_type: String,
    pub filter: Vec<ScannerFilter>,
}

impl From<&ScanParams> for ScannerRequest {
    fn from(p: &ScanParams) -> Self {
        let mut filter = Vec::new();
        if let Some(v) = p.above_price {
            filter.push(ScannerFilter { code: "priceAbove", value: json!(v) });
        }
        if let Some(v) = p.below_price {
            filter.push(ScannerFilter { code: "priceBelow", value: json!(v) });
        }
        if let Some(v) = p.above_volume {
            filter.push(ScannerFilter { code: "volumeAbove", value: json!(v) });
        }
        if let Some(v) = p.market_cap_above_millions {
            filter.push(ScannerFilter { code: "marketCapAbove1e6", value: json!(v) });
        }
        if let Some(v) = p.market_cap_below_millions {
            filter.push(ScannerFilter { code: "marketCapBelow1e6", value: json!(v) });
        }
        Self {
            instrument: p.instrument.clone(),
            location: p.location_code.clone(),
            scan_type: p.scan_code.clone(),
            filter,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScannerResponse {
    #[serde(default)]
    pub contracts: Vec<ScannerContract>,
}

#[derive(Debug, Deserialize)]
pub struct ScannerContract {
    pub symbol: String,
    #[serde(deserialize_with = "de_conid")]
    pub con_id: i64,
    pub listing_exchange: Option<String>,
    pub scan_data: Option<String>,
    pub benchmark: Option<String>,
    pub projection: Option<String>,
}

impl From<ScannerContract> for ScanItem {
    fn from(c: ScannerContract) -> Self {
        Self {
            symbol: c.symbol,
            exchange: c.listing_exchange.unwrap_or_default(),
            contract_id: c.con_id,
            distance: c.scan_data.filter(|s| !s.is_empty()),
            benchmark: c.benchmark.filter(|s| !s.is_empty()),
            projection: c.projection.filter(|s| !s.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// Market-data snapshot
// ---------------------------------------------------------------------------

/// One element of `GET /iserver/marketdata/snapshot`. Values arrive as
/// display strings and any of them may be absent.
#[derive(Debug, Deserialize)]
pub struct SnapshotRow {
    #[serde(deserialize_with = "de_conid")]
    pub conid: i64,
    #[serde(rename = "31")]
    pub last_price: Option<String>,
    #[serde(rename = "7762")]
    pub volume: Option<String>,
    #[serde(rename = "7283")]
    pub implied_vol: Option<String>,
}

impl From<SnapshotRow> for QuoteSnapshot {
    fn from(row: SnapshotRow) -> Self {
        // A `C` prefix marks the prior close when nothing traded today.
        let (last_price, close_price) = match row.last_price.as_deref().map(str::trim) {
            Some(s) if s.starts_with('C') => (None, parse_field(s)),
            Some(s) => (parse_field(s), None),
            None => (None, None),
        };
        Self {
            contract_id: row.conid,
            last_price,
            close_price,
            volume: row.volume.as_deref().and_then(parse_field).map(|v| v.round() as i64),
            implied_volatility: row.implied_vol.as_deref().and_then(parse_field).map(|v| v / 100.0),
        }
    }
}

/// Parse a gateway display value such as `C12.50`, `H3.1`, `35.2%`,
/// `1.2M` or `1,250`. Returns `None` for anything unparseable.
pub fn parse_field(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    s = s.strip_prefix('C').or_else(|| s.strip_prefix('H')).unwrap_or(s);
    s = s.strip_suffix('%').unwrap_or(s);

    let (digits, multiplier) = match s.chars().last()? {
        'K' => (&s[..s.len() - 1], 1e3),
        'M' => (&s[..s.len() - 1], 1e6),
        'B' => (&s[..s.len() - 1], 1e9),
        _ => (s, 1.0),
    };
    let cleaned: String = digits.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(i64),
    Str(String),
}

fn de_conid<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match NumOrStr::deserialize(d)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_handles_gateway_formats() {
        assert_eq!(parse_field("190.25"), Some(190.25));
        assert_eq!(parse_field("C12.50"), Some(12.5));
        assert_eq!(parse_field("H3.1"), Some(3.1));
        assert_eq!(parse_field("35.2%"), Some(35.2));
        assert_eq!(parse_field("1.5K"), Some(1500.0));
        assert_eq!(parse_field("2M"), Some(2_000_000.0));
        assert_eq!(parse_field("1,250"), Some(1250.0));
        assert_eq!(parse_field(""), None);
        assert_eq!(parse_field("N/A"), None);
        assert_eq!(parse_field("NaN"), None);
    }

    #[test]
    fn scanner_request_carries_only_present_filters() {
        let params = ScanParams {
            instrument: "STK".into(),
            location_code: "STK.US.MAJOR".into(),
            scan_code: "TOP_PERC_GAIN".into(),
            above_price: Some(2.0),
            above_volume: Some(500_000),
            market_cap_below_millions: Some(300.0),
            ..Default::default()
        };
        let body = serde_json::to_value(ScannerRequest::from(&params)).unwrap();
        assert_eq!(body["type"], "TOP_PERC_GAIN");
        assert_eq!(body["location"], "STK.US.MAJOR");
        let codes: Vec<&str> = body["filter"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["priceAbove", "volumeAbove", "marketCapBelow1e6"]);
        assert_eq!(body["filter"][2]["value"], 300.0);
    }

    #[test]
    fn scanner_response_maps_to_items() {
        let raw = r#"{
            "contracts": [
                {"symbol": "AAPL", "con_id": 265598, "listing_exchange": "NASDAQ.NMS", "scan_data": "+4.1%"},
                {"symbol": "XYZ", "con_id": "1234", "scan_data": ""}
            ],
            "scan_data_column_name": "Chg%"
        }"#;
        let resp: ScannerResponse = serde_json::from_str(raw).unwrap();
        let items: Vec<ScanItem> = resp.contracts.into_iter().map(ScanItem::from).collect();
        assert_eq!(items[0].symbol, "AAPL");
        assert_eq!(items[0].contract_id, 265598);
        assert_eq!(items[0].exchange, "NASDAQ.NMS");
        assert_eq!(items[0].distance.as_deref(), Some("+4.1%"));
        assert_eq!(items[1].contract_id, 1234);
        assert_eq!(items[1].exchange, "");
        assert!(items[1].distance.is_none());
    }

    #[test]
    fn snapshot_row_separates_last_and_close() {
        let rows: Vec<SnapshotRow> = serde_json::from_str(
            r#"[
                {"conid": 1, "31": "101.5", "7762": "2.5M", "7283": "42.0%"},
                {"conid": 2, "31": "C55.10"},
                {"conid": 3}
            ]"#,
        )
        .unwrap();
        let snaps: Vec<QuoteSnapshot> = rows.into_iter().map(QuoteSnapshot::from).collect();

        assert_eq!(snaps[0].last_price, Some(101.5));
        assert_eq!(snaps[0].volume, Some(2_500_000));
        assert!((snaps[0].implied_volatility.unwrap() - 0.42).abs() < 1e-9);

        assert_eq!(snaps[1].last_price, None);
        assert_eq!(snaps[1].close_price, Some(55.1));

        assert_eq!(snaps[2], QuoteSnapshot { contract_id: 3, ..Default::default() });
    }
}
