//! Scripted [`ArmTransport`] used by the unit tests of this crate.

use crate::error::{MonitorError, Result};
use crate::transport::{ArmClient, ArmTransport};
use std::sync::{Arc, Mutex};

pub(crate) const SUBSCRIPTION: &str = "00000000-aaaa-bbbb-cccc-000000000000";
pub(crate) const RESOURCE_MANAGER: &str = "https://management.test";

type Responder = Box<dyn Fn(&str, Option<&serde_json::Value>) -> Result<String> + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub form: Vec<(String, String)>,
}

/// Routes requests by URL fragment; the first registered fragment contained
/// in the URL answers. Unrouted URLs get a 404.
pub(crate) struct MockTransport {
    routes: Vec<(String, Responder)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, fragment: &str, body: serde_json::Value) -> Self {
        let body = body.to_string();
        self.route_with(fragment, move |_, _| Ok(body.clone()))
    }

    pub fn fail(self, fragment: &str, status: u16) -> Self {
        self.route_with(fragment, move |url, _| {
            Err(MonitorError::Http {
                endpoint: url.to_string(),
                status,
                body: "mock failure".to_string(),
            })
        })
    }

    pub fn route_with<F>(mut self, fragment: &str, responder: F) -> Self
    where
        F: Fn(&str, Option<&serde_json::Value>) -> Result<String> + Send + Sync + 'static,
    {
        self.routes.push((fragment.to_string(), Box::new(responder)));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, fragment: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.contains(fragment))
            .collect()
    }

    fn answer(&self, call: RecordedCall) -> Result<String> {
        let url = call.url.clone();
        let body = call.body.clone();
        self.calls.lock().unwrap().push(call);

        match self.routes.iter().find(|(fragment, _)| url.contains(fragment.as_str())) {
            Some((_, responder)) => responder(&url, body.as_ref()),
            None => Err(MonitorError::Http {
                endpoint: url,
                status: 404,
                body: "no route".to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ArmTransport for MockTransport {
    async fn get(&self, url: &str, _bearer: &str) -> Result<String> {
        self.answer(RecordedCall {
            method: "GET",
            url: url.to_string(),
            body: None,
            form: Vec::new(),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        _bearer: &str,
        body: &serde_json::Value,
    ) -> Result<String> {
        self.answer(RecordedCall {
            method: "POST",
            url: url.to_string(),
            body: Some(body.clone()),
            form: Vec::new(),
        })
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        self.answer(RecordedCall {
            method: "POST",
            url: url.to_string(),
            body: None,
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

pub(crate) fn client_with(transport: MockTransport) -> (ArmClient, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let client = ArmClient::new(transport.clone(), RESOURCE_MANAGER, SUBSCRIPTION);
    (client, transport)
}

/// A resource as ARM returns it, with the subscription prefix still on the id.
pub(crate) fn arm_resource(name: &str, resource_type: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg-app/providers/{resource_type}/{name}"),
        "name": name,
        "location": "westeurope",
        "type": resource_type,
        "tags": { "Env": "prod" },
    })
}
