#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use azmon_cloud::{
    ArmClient, ArmTransport, CollectorSettings, MonitorCollector, MonitorError, NameFilter,
    ResourceGroupTarget, ResourceTarget, ServicePrincipal, TargetSet,
};
use azmon_server::app;
use azmon_server::state::AppState;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

pub const SUBSCRIPTION: &str = "11111111-2222-3333-4444-555555555555";
pub const APP_ID: &str = "/resourceGroups/rg-app/providers/Microsoft.Web/sites/app-1";

/// Canned Azure endpoints keyed by URL fragment; first match wins.
pub struct FakeAzure {
    routes: Vec<(String, u16, serde_json::Value)>,
    calls: Mutex<Vec<String>>,
}

impl FakeAzure {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Token, provider listing, app-1 lookup and a batch answer for one resource.
    pub fn healthy() -> Self {
        Self::new()
            .with_token()
            .route("/providers?api-version=2019-05-10", 200, providers())
            .route("/sites/app-1?api-version=2022-03-01", 200, arm_resource("app-1"))
            .route(
                "/batch?api-version=2017-03-01",
                200,
                serde_json::json!({ "responses": [requests_response(12.0)] }),
            )
    }

    pub fn with_token(self) -> Self {
        let expires = expiry_in_one_hour();
        self.route(
            "/oauth2/token",
            200,
            serde_json::json!({ "access_token": "test-token", "expires_on": expires }),
        )
    }

    pub fn route(mut self, fragment: &str, status: u16, body: serde_json::Value) -> Self {
        self.routes.push((fragment.to_string(), status, body));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, url: &str) -> azmon_cloud::Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.routes.iter().find(|(fragment, _, _)| url.contains(fragment.as_str())) {
            Some((_, 200, body)) => Ok(body.to_string()),
            Some((_, status, body)) => Err(MonitorError::Http {
                endpoint: url.to_string(),
                status: *status,
                body: body.to_string(),
            }),
            None => Err(MonitorError::Http {
                endpoint: url.to_string(),
                status: 404,
                body: "not found".to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ArmTransport for FakeAzure {
    async fn get(&self, url: &str, _bearer: &str) -> azmon_cloud::Result<String> {
        self.answer(url)
    }

    async fn post_json(
        &self,
        url: &str,
        _bearer: &str,
        _body: &serde_json::Value,
    ) -> azmon_cloud::Result<String> {
        self.answer(url)
    }

    async fn post_form(&self, url: &str, _form: &[(&str, &str)]) -> azmon_cloud::Result<String> {
        self.answer(url)
    }
}

/// One hour from now, as the epoch-seconds string AAD returns.
fn expiry_in_one_hour() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    (now + 3600).to_string()
}

pub fn providers() -> serde_json::Value {
    serde_json::json!({ "value": [{
        "namespace": "Microsoft.Web",
        "resourceTypes": [{ "resourceType": "sites", "apiVersions": ["2022-03-01"] }]
    }]})
}

pub fn arm_resource(name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg-app/providers/Microsoft.Web/sites/{name}"),
        "name": name,
        "type": "Microsoft.Web/sites",
        "location": "northeurope",
        "tags": { "Owner": "web-team" }
    })
}

pub fn requests_response(total: f64) -> serde_json::Value {
    serde_json::json!({
        "httpStatusCode": 200,
        "content": { "value": [{
            "name": { "value": "Requests", "localizedValue": "Requests" },
            "unit": "Count",
            "timeseries": [{ "data": [{ "timeStamp": "2024-05-01T12:00:00Z", "total": total }] }]
        }]}
    })
}

pub fn explicit_targets() -> TargetSet {
    TargetSet {
        targets: vec![ResourceTarget {
            resource: APP_ID.to_string(),
            metrics: vec!["Requests".to_string()],
            aggregations: vec!["Total".to_string()],
        }],
        ..Default::default()
    }
}

pub fn group_targets() -> TargetSet {
    TargetSet {
        resource_groups: vec![ResourceGroupTarget {
            resource_group: "rg-app".to_string(),
            resource_types: vec!["Microsoft.Web/sites".to_string()],
            name_filter: NameFilter::default(),
            metrics: vec!["Requests".to_string()],
            aggregations: vec!["Total".to_string()],
        }],
        ..Default::default()
    }
}

pub struct TestContext {
    pub app: axum::Router,
    pub azure: Arc<FakeAzure>,
}

pub fn build_test_context(azure: FakeAzure, targets: TargetSet) -> TestContext {
    let azure = Arc::new(azure);
    let client = ArmClient::new(azure.clone(), "https://management.test", SUBSCRIPTION);
    let collector = MonitorCollector::new(
        client,
        "https://login.test",
        ServicePrincipal {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        },
        targets,
        CollectorSettings::default(),
    );
    let app = app::build_http_app(AppState::new(collector));
    TestContext { app, azure }
}

pub struct TextResponse {
    pub status: StatusCode,
    pub body: String,
    pub content_type: Option<String>,
    pub trace_id: Option<String>,
}

pub async fn get(app: &axum::Router, uri: &str) -> TextResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let header_value = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    };
    let content_type = header_value(header::CONTENT_TYPE.as_str());
    let trace_id = header_value("x-trace-id");
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");

    TextResponse {
        status,
        body: String::from_utf8_lossy(&bytes).to_string(),
        content_type,
        trace_id,
    }
}
