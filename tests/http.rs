use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use tower::ServiceExt;

use tplink_exporter::device::{Credentials, Device, Discover, StateInformation, StateValue};
use tplink_exporter::exporter::{Exporter, MISSING_PARAMETERS};
use tplink_exporter::runtime::RuntimeExporter;
use tplink_exporter::server::router;
use tplink_exporter::DeviceError;

#[derive(Debug)]
struct Plug {
    emeter: bool,
}

#[async_trait]
impl Device for Plug {
    async fn update(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn alias(&self) -> Option<&str> {
        Some("Kettle")
    }

    fn model(&self) -> &str {
        "KP115(EU)"
    }

    fn has_emeter(&self) -> bool {
        self.emeter
    }

    fn sys_info(&self) -> &Map<String, Value> {
        static SYS_INFO: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        SYS_INFO.get_or_init(|| match json!({"deviceId": "80061234", "relay_state": 1}) {
            Value::Object(map) => map,
            _ => Map::new(),
        })
    }

    fn hw_info(&self) -> Map<String, Value> {
        Map::new()
    }

    fn state_information(&self) -> StateInformation {
        let mut state = StateInformation::new();
        state.insert("State".to_string(), StateValue::Bool(true));
        state.insert(
            "Current consumption".to_string(),
            StateValue::Text("1800.5".to_string()),
        );
        state
    }
}

#[derive(Debug)]
enum Client {
    Plug { emeter: bool },
    Nothing,
    Timeout,
}

#[async_trait]
impl Discover for Client {
    async fn discover_single(
        &self,
        host: &str,
        _credentials: &Credentials,
    ) -> Result<Option<Box<dyn Device>>, DeviceError> {
        match self {
            Client::Plug { emeter } => Ok(Some(Box::new(Plug { emeter: *emeter }) as Box<dyn Device>)),
            Client::Nothing => Ok(None),
            Client::Timeout => Err(DeviceError::Timeout {
                host: host.to_string(),
            }),
        }
    }
}

fn app(client: Client) -> (Router, Arc<Exporter>) {
    let exporter = Arc::new(Exporter::new(Arc::new(client)));
    let app = router(Arc::clone(&exporter), Arc::new(RuntimeExporter::new()));
    (app, exporter)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn scrape_reports_device_metrics() {
    let (app, exporter) = app(Client::Plug { emeter: true });

    let (status, content_type, body) =
        get(app, "/scrape?target=1.2.3.4&username=u&password=p").await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(Some("text/plain".to_string()), content_type);
    assert!(
        body.contains("tplink_power_load{alias=\"Kettle\",device_id=\"80061234\",hw_ver=\"\",sw_ver=\"\",mac=\"\",model=\"KP115(EU)\"} 1800.5"),
        "{body}"
    );
    assert!(body.contains("tplink_online{"), "{body}");
    assert!(body.contains("tplink_on_time_total{"), "{body}");
    assert_eq!(1, exporter.len());
}

#[tokio::test]
async fn scrape_without_parameters_is_rejected() {
    for uri in [
        "/scrape",
        "/scrape?username=u&password=p",
        "/scrape?target=1.2.3.4&password=p",
        "/scrape?target=1.2.3.4&username=u",
        "/scrape?target=&username=u&password=p",
        "/scrape?target=1.2.3.4&username=u&password=",
    ] {
        let (app, exporter) = app(Client::Plug { emeter: true });
        let (status, _, body) = get(app, uri).await;

        assert_eq!(StatusCode::BAD_REQUEST, status, "{uri}");
        assert_eq!(MISSING_PARAMETERS, body, "{uri}");
        assert!(exporter.is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn scrape_of_device_without_emeter_has_no_samples() {
    for client in [Client::Plug { emeter: false }, Client::Nothing] {
        let (app, _) = app(client);
        let (status, _, body) = get(app, "/scrape?target=1.2.3.4&username=u&password=p").await;

        assert_eq!(StatusCode::OK, status);
        assert_eq!("# EOF\n", body);
    }
}

#[tokio::test]
async fn scrape_with_repeated_parameters_uses_first_value() {
    let (app, exporter) = app(Client::Plug { emeter: true });
    let (status, _, body) = get(
        app,
        "/scrape?target=1.2.3.4&target=1.2.3.4&username=u&password=p&username=other",
    )
    .await;

    assert_eq!(StatusCode::OK, status, "{body}");
    assert!(body.contains("tplink_power_load{"), "{body}");
    assert_eq!(1, exporter.len());
}

#[tokio::test]
async fn scrape_of_unresponsive_device_fails() {
    let (app, _) = app(Client::Timeout);
    let (status, _, _) = get(app, "/scrape?target=1.2.3.4&username=u&password=p").await;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
}

#[tokio::test]
async fn runtime_metrics_are_independent_of_targets() {
    let (app, _) = app(Client::Timeout);
    let (status, content_type, body) = get(app, "/metrics").await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(Some("text/plain".to_string()), content_type);
    assert!(body.contains("platform_info{"), "{body}");
    #[cfg(target_os = "linux")]
    assert!(body.contains("process_cpu_seconds_total"), "{body}");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (app, _) = app(Client::Nothing);
    let (status, _, _) = get(app, "/").await;

    assert_eq!(StatusCode::NOT_FOUND, status);
}
