//! Page fetching with content-type and size guards.

use std::sync::OnceLock;
use std::time::Duration;

use url::Url;

use crate::ExtractError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build page fetch client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

/// Fetch a page body as HTML text.
///
/// Rejects non-success statuses, non-HTML content types, and bodies over
/// 8 MiB. Charset handling is left to `reqwest`'s text decoding.
pub async fn fetch_html(url: &Url) -> Result<String, ExtractError> {
    let response = http_client()
        .get(url.as_str())
        .header("accept", "text/html,application/xhtml+xml")
        .send()
        .await
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Fetch(format!("HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();
    // Parameters like charset follow a semicolon
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime != "text/html" && mime != "application/xhtml+xml" && !mime.is_empty() {
        return Err(ExtractError::UnsupportedContentType(mime));
    }

    if let Some(length) = response.content_length()
        && length as usize > MAX_BODY_BYTES
    {
        return Err(ExtractError::TooLarge {
            max_bytes: MAX_BODY_BYTES,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;
    if body.len() > MAX_BODY_BYTES {
        return Err(ExtractError::TooLarge {
            max_bytes: MAX_BODY_BYTES,
        });
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::fetch_html;
    use crate::ExtractError;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let body = fetch_html(&url).await.unwrap();
        assert!(body.contains("hi"));
    }

    #[tokio::test]
    async fn rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("%PDF-", "application/pdf"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/data", server.uri())).unwrap();
        let result = fetch_html(&url).await;
        assert!(matches!(
            result,
            Err(ExtractError::UnsupportedContentType(mime)) if mime == "application/pdf"
        ));
    }

    #[tokio::test]
    async fn rejects_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = fetch_html(&url).await;
        assert!(matches!(result, Err(ExtractError::Fetch(msg)) if msg.contains("404")));
    }
}
