use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::{parse_each, Order, PharmacyDetails};
use crate::query::DateRange;
use crate::sync::file::{index_pharmacies, OrdersPayload};
use crate::sync::rate_limit::retry_api;
use crate::sync::OrderSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 200;

/// Order API client.
///
/// `GET {base}/orders?from=YYYY-MM-DD&to=YYYY-MM-DD` and `GET {base}/pharmacies`,
/// with an optional bearer token.
#[derive(Clone)]
pub struct HttpOrderSource {
    http: reqwest::Client,
    api_base: String,
}

impl HttpOrderSource {
    pub fn new(base_url: &url::Url, token: Option<&str>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Config("API token contains invalid characters".into()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_base: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{path}", self.api_base);
        log::debug!("GET {url}");
        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

impl OrderSource for HttpOrderSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_orders(&self, range: &DateRange) -> Result<Vec<Order>> {
        let query = [
            ("from", range.start.format("%Y-%m-%d").to_string()),
            ("to", range.end.format("%Y-%m-%d").to_string()),
        ];
        let payload: OrdersPayload = retry_api!(self.get_json::<OrdersPayload>("orders", &query))?;
        Ok(payload.into_parts().0)
    }

    async fn fetch_pharmacy_lookup(&self) -> Result<HashMap<i64, PharmacyDetails>> {
        let raw: Vec<serde_json::Value> =
            retry_api!(self.get_json::<Vec<serde_json::Value>>("pharmacies", &[]))?;
        Ok(index_pharmacies(parse_each(raw, "pharmacy")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned responses in order, one per connection, recording
    /// each request head.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (url::Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).to_string());
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        let url = url::Url::parse(&format!("http://{addr}/api/")).unwrap();
        (url, seen)
    }

    fn march() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_orders_sends_range_and_token() {
        let body = r#"[{"id": 5, "code": "X5", "pharmacy": {"id": 1, "name": "P"},
                        "creationDate": "2025-03-02T09:00:00Z"}]"#;
        let (url, seen) = serve(vec![(200, body)]).await;
        let source = HttpOrderSource::new(&url, Some("s3cret")).unwrap();

        let orders = source.fetch_orders(&march()).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].code, "X5");

        let request = seen.lock().unwrap()[0].to_lowercase();
        assert!(request.starts_with("get /api/orders?from=2025-03-01&to=2025-03-31"));
        assert!(request.contains("authorization: bearer s3cret"));
    }

    #[tokio::test]
    async fn test_unreadable_order_is_skipped() {
        let body = r#"[{"id": 5, "code": "X5", "pharmacy": {"id": 1, "name": "P"},
                        "creationDate": "2025-03-02T09:00:00Z"},
                       {"id": 6, "pharmacy": null, "customer": null, "creationDate": "bad"}]"#;
        let (url, _) = serve(vec![(200, body)]).await;
        let source = HttpOrderSource::new(&url, None).unwrap();
        let orders = source.fetch_orders(&march()).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 5);
    }

    #[tokio::test]
    async fn test_retries_after_429() {
        let (url, seen) = serve(vec![
            (429, r#"{"error":"slow down"}"#),
            (200, r#"[{"id": 4, "name": "Harbor"}]"#),
        ])
        .await;
        let source = HttpOrderSource::new(&url, None).unwrap();
        let lookup = source.fetch_pharmacy_lookup().await.unwrap();
        assert_eq!(lookup[&4].name, "Harbor");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let (url, _) = serve(vec![(500, r#"{"error":"boom"}"#)]).await;
        let source = HttpOrderSource::new(&url, None).unwrap();
        match source.fetch_orders(&march()).await {
            Err(Error::Api { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short ", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
