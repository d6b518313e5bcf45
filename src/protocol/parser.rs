//! Per-port parsing of decoded packets into typed records.
//!
//! All parsers are total: missing fields become `None` or empty sequences.

use serde_json::Value;

use crate::compat;
use crate::protocol::packet::InboundPacket;
use crate::types::{
    AckNotice, AckStatus, PositionReport, TelemetryReport, TextMessage, TracerouteExchange,
    filter_hops,
};

/// Routing `errorReason` meaning success.
const NO_ERROR: &str = "NONE";

/// Scale of integer-encoded coordinates (`latitudeI`/`longitudeI`).
const COORD_SCALE: f64 = 1e-7;

/// Parses a routing confirmation.
///
/// Returns `None` when the packet carries no (non-zero) `requestId`.
#[must_use]
pub fn parse_routing(packet: &InboundPacket) -> Option<AckNotice> {
    let request_id = packet
        .decoded
        .get("requestId")
        .and_then(compat::as_u32)
        .filter(|&id| id != 0)?;

    let reason = packet
        .decoded_object("routing")
        .and_then(|routing| routing.get("errorReason"))
        .and_then(Value::as_str)
        .unwrap_or(NO_ERROR);
    let status = AckStatus::from_error_reason(reason);

    Some(AckNotice {
        packet_id: request_id,
        status,
        error: (status == AckStatus::Nak).then(|| reason.to_owned()),
    })
}

/// Parses a traceroute response, dropping placeholder hops.
#[must_use]
pub fn parse_traceroute(packet: &InboundPacket) -> TracerouteExchange {
    let route = packet.decoded_object("traceroute");
    let hops = |key: &str| {
        filter_hops(
            route
                .and_then(|r| r.get(key))
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(compat::as_u32),
        )
    };
    let snr = |key: &str| -> Vec<f64> {
        route
            .and_then(|r| r.get(key))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(compat::as_f64)
            .collect()
    };

    TracerouteExchange {
        request_id: packet.decoded.get("requestId").and_then(compat::as_u32),
        from: packet.from_id.clone(),
        route: hops("route"),
        route_back: hops("routeBack"),
        snr_towards: snr("snrTowards"),
        snr_back: snr("snrBack"),
    }
}

/// Parses an inbound text message.
#[must_use]
pub fn parse_text(packet: &InboundPacket) -> TextMessage {
    TextMessage {
        packet_id: packet.id,
        sender: packet.from_id.clone().unwrap_or_else(|| "unknown".to_owned()),
        receiver: packet.to_id.clone(),
        channel: packet.channel,
        text: packet
            .decoded
            .get("text")
            .and_then(compat::as_string)
            .unwrap_or_default(),
        timestamp: packet.rx_time,
        snr: packet.rx_snr,
        hop_limit: packet.hop_limit,
        reply_id: packet.reply_id,
    }
}

/// Parses a position report.
#[must_use]
pub fn parse_position(packet: &InboundPacket) -> PositionReport {
    let position = packet.decoded_object("position");
    let field = |key: &str| position.and_then(|p| p.get(key));
    let coord = |key: &str, scaled_key: &str| {
        field(key).and_then(compat::as_f64).or_else(|| {
            field(scaled_key)
                .and_then(compat::as_i64)
                .map(|v| v as f64 * COORD_SCALE)
        })
    };

    PositionReport {
        from: packet.from_id.clone(),
        latitude: coord("latitude", "latitudeI"),
        longitude: coord("longitude", "longitudeI"),
        altitude: field("altitude").and_then(compat::as_f64),
        time: field("time").and_then(compat::as_i64),
    }
}

/// Parses a telemetry report.
#[must_use]
pub fn parse_telemetry(packet: &InboundPacket) -> TelemetryReport {
    let telemetry = packet.decoded_object("telemetry");
    let block = |key: &str| telemetry.and_then(|t| t.get(key)).and_then(compat::to_plain);

    TelemetryReport {
        from: packet.from_id.clone(),
        device_metrics: block("deviceMetrics"),
        environment_metrics: block("environmentMetrics"),
    }
}
