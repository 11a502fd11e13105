//! Routes scrape requests to the [`Collector`] of their target.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tracing::debug;

use crate::collector::Collector;
use crate::device::{Credentials, Discover};

/// Body of the `400 Bad Request` answer to an incomplete scrape.
pub const MISSING_PARAMETERS: &str =
    "'target', 'username' and 'password' parameters must be specified";

/// Cache of one [`Collector`] per target address.
///
/// Entries live as long as the process. The first request for a target
/// decides the credentials of its collector, later requests with other
/// credentials reuse it unchanged.
#[derive(Debug)]
pub struct Exporter {
    client: Arc<dyn Discover>,
    collectors: Mutex<HashMap<String, Arc<Collector>>>,
}

impl Exporter {
    /// Create an empty cache whose collectors discover devices through
    /// `client`.
    pub fn new(client: Arc<dyn Discover>) -> Self {
        Self {
            client,
            collectors: Mutex::new(HashMap::new()),
        }
    }

    /// The collector of `target`, created with the given credentials if this
    /// is the first request for it.
    pub fn get_collector(&self, target: &str, username: &str, password: &str) -> Arc<Collector> {
        let mut collectors = self.collectors.lock();
        let collector = collectors.entry(target.to_string()).or_insert_with(|| {
            debug!(target_host = target, "creating collector");
            Arc::new(Collector::new(
                target,
                Credentials::new(username, password),
                Arc::clone(&self.client),
            ))
        });
        Arc::clone(collector)
    }

    /// Number of cached collectors.
    pub fn len(&self) -> usize {
        self.collectors.lock().len()
    }

    /// Whether no target has been scraped yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Query of `GET /scrape`.
#[derive(Debug, Default)]
pub struct ScrapeParams {
    /// Address of the device.
    pub target: Option<String>,
    /// Account the device is polled with.
    pub username: Option<String>,
    /// Password of `username`.
    pub password: Option<String>,
}

impl ScrapeParams {
    /// Collect the parameters from decoded query pairs.
    ///
    /// A repeated parameter keeps its first value, unknown ones are ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "target" => &mut params.target,
                "username" => &mut params.username,
                "password" => &mut params.password,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }

    /// Target and credentials, `None` if any of them is missing or empty.
    fn required(&self) -> Option<(&str, &str, &str)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }

        Some((
            non_empty(&self.target)?,
            non_empty(&self.username)?,
            non_empty(&self.password)?,
        ))
    }
}

/// Handler for `GET /scrape`.
///
/// Polls the target and answers with its metrics. A device with nothing to
/// report yields an answer without samples, a failing poll a `500`.
pub async fn collect(
    State(exporter): State<Arc<Exporter>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let params = ScrapeParams::from_pairs(pairs);
    let Some((target, username, password)) = params.required() else {
        return (StatusCode::BAD_REQUEST, MISSING_PARAMETERS).into_response();
    };

    debug!(target_host = target, "scrape");
    let collector = exporter.get_collector(target, username, password);
    match collector.scrape().await {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "text/plain")], body).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{energy_plug, StubDiscover};

    fn exporter() -> Exporter {
        Exporter::new(Arc::new(StubDiscover::new(vec![energy_plug()])))
    }

    #[test]
    fn first_request_creates_collector() {
        let exporter = exporter();
        assert!(exporter.is_empty());

        let collector = exporter.get_collector("10.0.0.7", "u", "p");
        assert_eq!(1, exporter.len());
        assert_eq!("10.0.0.7", collector.host());
    }

    #[test]
    fn later_credentials_are_ignored() {
        let exporter = exporter();
        let first = exporter.get_collector("10.0.0.7", "u", "p");
        let second = exporter.get_collector("10.0.0.7", "other", "secret");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&Credentials::new("u", "p"), second.credentials());
        assert_eq!(1, exporter.len());
    }

    #[test]
    fn targets_get_their_own_collector() {
        let exporter = exporter();
        let a = exporter.get_collector("10.0.0.7", "u", "p");
        let b = exporter.get_collector("10.0.0.8", "u", "p");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(2, exporter.len());
    }

    #[test]
    fn empty_parameters_are_missing() {
        let params = ScrapeParams {
            target: Some("10.0.0.7".to_string()),
            username: Some(String::new()),
            password: Some("p".to_string()),
        };
        assert_eq!(None, params.required());
        assert_eq!(None, ScrapeParams::default().required());

        let params = ScrapeParams {
            username: Some("u".to_string()),
            ..params
        };
        assert_eq!(Some(("10.0.0.7", "u", "p")), params.required());
    }

    fn pairs(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn repeated_parameters_keep_first_value() {
        let params = ScrapeParams::from_pairs(pairs(&[
            ("target", "10.0.0.7"),
            ("target", "10.0.0.8"),
            ("username", "u"),
            ("verbose", "1"),
            ("password", "p"),
            ("username", "other"),
        ]));
        assert_eq!(Some(("10.0.0.7", "u", "p")), params.required());

        let params = ScrapeParams::from_pairs(pairs(&[
            ("target", ""),
            ("target", "10.0.0.7"),
            ("username", "u"),
            ("password", "p"),
        ]));
        assert_eq!(None, params.required());
    }

    #[tokio::test]
    async fn incomplete_scrape_creates_no_collector() {
        let exporter = Arc::new(exporter());

        let response = collect(
            State(Arc::clone(&exporter)),
            Query(pairs(&[("target", "10.0.0.7")])),
        )
        .await;
        assert_eq!(StatusCode::BAD_REQUEST, response.status());
        assert!(exporter.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_share_one_collector() {
        let exporter = Arc::new(exporter());

        let requests: Vec<_> = (0..8)
            .map(|i| {
                let exporter = Arc::clone(&exporter);
                tokio::spawn(async move {
                    exporter.get_collector("10.0.0.7", &format!("user{i}"), "p")
                })
            })
            .collect();
        let mut collectors = Vec::new();
        for request in requests {
            collectors.push(request.await.unwrap());
        }

        assert_eq!(1, exporter.len());
        assert!(collectors.iter().all(|c| Arc::ptr_eq(c, &collectors[0])));
    }
}
