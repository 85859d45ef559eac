use regex::Regex;

/// Grammar of the nginx `download_stats` log format: twelve space-separated
/// fields with quoting around the request, referer and user agent. The
/// upstream response time may be the `-` sentinel when nginx never contacted
/// an upstream.
const LINE_PATTERN: &str = concat!(
    r#"^(?P<remote_addr>\S+) - (?P<remote_user>\S+) \[(?P<time_local>[^\]]+)\] "#,
    r#""(?P<request>[^"]+)" (?P<status>\d+) (?P<bytes_sent>\d+) "#,
    r#""(?P<http_referer>[^"]+)" "(?P<http_user_agent>[^"]+)" "#,
    r#"(?P<request_time>[\d\.]+) (?P<upstream_response_time>[\d\.-]+) "#,
    r#"(?P<request_length>\d+) (?P<body_bytes_sent>\d+)"#
);

/// One access-log line that matched the full grammar.
///
/// The two duration fields are kept as the raw captured text; converting them
/// to milliseconds (and defaulting on garbage) is the record builder's job.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub remote_addr: String,
    pub remote_user: String,
    pub time_local: String,
    pub request: String,
    pub status: u16,
    pub bytes_sent: u64,
    pub http_referer: String,
    pub http_user_agent: String,
    pub request_time: String,
    pub upstream_response_time: String,
    pub request_length: u64,
    pub body_bytes_sent: u64,
}

/// Matches raw log lines against the fixed `download_stats` grammar.
pub struct AccessLogParser {
    pattern: Regex,
}

impl AccessLogParser {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(LINE_PATTERN).expect("download_stats line pattern is valid"),
        }
    }

    /// Parse a single line, returning `None` unless the whole grammar
    /// matches. There is no partial-credit parsing; a line that fails here is
    /// dropped from the pipeline (the tailer still advances past its bytes).
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = self.pattern.captures(line.trim())?;

        Some(ParsedLine {
            remote_addr: caps["remote_addr"].to_string(),
            remote_user: caps["remote_user"].to_string(),
            time_local: caps["time_local"].to_string(),
            request: caps["request"].to_string(),
            status: caps["status"].parse().ok()?,
            bytes_sent: caps["bytes_sent"].parse().ok()?,
            http_referer: caps["http_referer"].to_string(),
            http_user_agent: caps["http_user_agent"].to_string(),
            request_time: caps["request_time"].to_string(),
            upstream_response_time: caps["upstream_response_time"].to_string(),
            request_length: caps["request_length"].parse().ok()?,
            body_bytes_sent: caps["body_bytes_sent"].parse().ok()?,
        })
    }
}

impl Default for AccessLogParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "203.0.113.7 - - [06/Aug/2026:11:42:17 +0000] \
        \"GET /emby_download?route_id=5&path=/media/x.mkv HTTP/1.1\" 200 1024 \
        \"-\" \"Emby/4.8.0\" 0.523 0.201 512 1024";

    #[test]
    fn parses_full_download_line() {
        let parser = AccessLogParser::new();
        let parsed = parser.parse(SAMPLE).expect("sample line should match");

        assert_eq!(parsed.remote_addr, "203.0.113.7");
        assert_eq!(parsed.remote_user, "-");
        assert_eq!(parsed.time_local, "06/Aug/2026:11:42:17 +0000");
        assert_eq!(
            parsed.request,
            "GET /emby_download?route_id=5&path=/media/x.mkv HTTP/1.1"
        );
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.bytes_sent, 1024);
        assert_eq!(parsed.http_referer, "-");
        assert_eq!(parsed.http_user_agent, "Emby/4.8.0");
        assert_eq!(parsed.request_time, "0.523");
        assert_eq!(parsed.upstream_response_time, "0.201");
        assert_eq!(parsed.request_length, 512);
        assert_eq!(parsed.body_bytes_sent, 1024);
    }

    #[test]
    fn keeps_dash_sentinel_for_upstream_time() {
        let parser = AccessLogParser::new();
        let line = SAMPLE.replace(" 0.201 ", " - ");
        let parsed = parser.parse(&line).expect("dash upstream time is valid");
        assert_eq!(parsed.upstream_response_time, "-");
    }

    #[test]
    fn parses_authenticated_user_field() {
        let parser = AccessLogParser::new();
        let line = SAMPLE.replace("203.0.113.7 - -", "203.0.113.7 - alice");
        let parsed = parser.parse(&line).expect("named user is valid");
        assert_eq!(parsed.remote_user, "alice");
    }

    #[test]
    fn ignores_surrounding_whitespace() {
        let parser = AccessLogParser::new();
        let line = format!("  {SAMPLE}\n");
        assert!(parser.parse(&line).is_some());
    }

    #[test]
    fn rejects_lines_missing_trailing_fields() {
        let parser = AccessLogParser::new();
        // Plain combined-format line without the four trailing numeric fields.
        let line = "203.0.113.7 - - [06/Aug/2026:11:42:17 +0000] \
            \"GET / HTTP/1.1\" 200 612 \"-\" \"curl/8.0\"";
        assert!(parser.parse(line).is_none());
    }

    #[test]
    fn rejects_non_numeric_status() {
        let parser = AccessLogParser::new();
        let line = SAMPLE.replace("\" 200 1024 \"", "\" abc 1024 \"");
        assert!(parser.parse(&line).is_none());
    }

    #[test]
    fn rejects_empty_and_garbage_lines() {
        let parser = AccessLogParser::new();
        assert!(parser.parse("").is_none());
        assert!(parser.parse("not an access log line").is_none());
    }
}
