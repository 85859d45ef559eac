use url::form_urlencoded;

/// URL path that qualifies a request as a download event.
pub const DOWNLOAD_ENDPOINT: &str = "/emby_download";

/// Download request decomposed from the quoted request line.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub method: String,
    pub route_id: i64,
    pub file_path: Option<String>,
}

/// Extract the download parameters from a raw request line
/// (`"GET /emby_download?route_id=5&path=/media/x.mkv HTTP/1.1"`).
///
/// Returns `None` for anything that does not qualify: fewer than two tokens,
/// a path other than [`DOWNLOAD_ENDPOINT`], a missing `route_id`, or a
/// `route_id` that does not parse as an integer. The `path` parameter is
/// optional. Rejection is a per-line drop, never an error.
pub fn extract_download_request(request: &str) -> Option<DownloadRequest> {
    let mut tokens = request.split_whitespace();
    let method = tokens.next()?;
    let url = tokens.next()?;

    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    };
    if path != DOWNLOAD_ENDPOINT {
        return None;
    }

    let mut route_id: Option<String> = None;
    let mut file_path: Option<String> = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            // First occurrence wins, matching the collector's expectations.
            "route_id" if route_id.is_none() => route_id = Some(value.into_owned()),
            "path" if file_path.is_none() => file_path = Some(value.into_owned()),
            _ => {}
        }
    }

    let route_id = route_id?.parse::<i64>().ok()?;

    Some(DownloadRequest {
        method: method.to_string(),
        route_id,
        file_path,
    })
}
