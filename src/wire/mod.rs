use std::fmt;
use std::sync::LazyLock;

const BODY: &str = "<!DOCTYPE html>\n\
<html>\n\
<head><title>Ripple</title></head>\n\
<body>\n\
<h1>Hello from a lightweight task!</h1>\n\
</body>\n\
</html>\n";

static RESPONSE: LazyLock<Vec<u8>> = LazyLock::new(|| {
    format!(
        "HTTP/1.1 200 OK\r\n\
Content-Type: text/html; charset=UTF-8\r\n\
Content-Length: {}\r\n\
Connection: close\r\n\
\r\n\
{}",
        BODY.len(),
        BODY
    )
    .into_bytes()
});

/// The fixed response written for every exchange.
pub fn response() -> &'static [u8] {
    &RESPONSE
}

/// First line of an inbound request. Missing parts are left empty; the
/// server answers malformed lines the same way as well-formed ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

impl RequestLine {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        Self {
            method: parts.next().unwrap_or_default().to_string(),
            target: parts.next().unwrap_or_default().to_string(),
            version: parts.next().unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, self.version)
    }
}
