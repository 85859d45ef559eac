use crate::extract::DownloadRequest;
use crate::parser::ParsedLine;
use serde::Serialize;

/// Sentinel nginx writes for the upstream response time when no upstream was
/// contacted.
const UPSTREAM_ABSENT: &str = "-";

/// One download event in the collector's wire schema.
///
/// Field names follow the collector's JSON contract; an absent file path is
/// serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    pub route_id: i64,
    pub client_ip: String,
    pub file_path: Option<String>,
    pub download_size: u64,
    pub download_duration: u64,
    pub response_time: u64,
    pub success: bool,
    pub user_agent: String,
}

/// Assemble the wire record from a parsed line and its extracted download
/// request. Building never fails: the risky coercions either default to zero
/// here (durations) or were already grounds for rejection in extraction
/// (route_id).
pub fn build_record(line: &ParsedLine, request: DownloadRequest) -> StatRecord {
    let response_time = if line.upstream_response_time == UPSTREAM_ABSENT {
        0
    } else {
        seconds_to_millis(&line.upstream_response_time)
    };

    StatRecord {
        route_id: request.route_id,
        client_ip: line.remote_addr.clone(),
        file_path: request.file_path,
        download_size: line.body_bytes_sent,
        download_duration: seconds_to_millis(&line.request_time),
        response_time,
        success: line.status == 200,
        user_agent: line.http_user_agent.clone(),
    }
}

/// Convert a raw seconds field to whole milliseconds, defaulting to 0 when
/// the field is not a number.
fn seconds_to_millis(raw: &str) -> u64 {
    raw.parse::<f64>()
        .map(|seconds| (seconds * 1000.0).round() as u64)
        .unwrap_or(0)
}
