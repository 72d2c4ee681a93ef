use crate::error::{MonitorError, Result};
use crate::query::ResolvedQuery;
use crate::transport::ArmClient;
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 20;

const BATCH_API_VERSION: &str = "2017-03-01";

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    requests: Vec<BatchRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
struct BatchRequestItem<'a> {
    #[serde(rename = "relativeUrl")]
    relative_url: &'a str,
    #[serde(rename = "httpMethod")]
    http_method: &'static str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    responses: Vec<BatchItemResponse>,
}

/// One demultiplexed sub-response of a batch call.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItemResponse {
    #[serde(rename = "httpStatusCode")]
    pub http_status_code: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MetricQueryResponse,
}

/// Payload of `microsoft.insights/metrics`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricQueryResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: Vec<MetricValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricValue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: LocalizableName,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalizableName {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(default, deserialize_with = "null_as_default", rename = "localizedValue")]
    pub localized_value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeSeries {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<DataPoint>,
}

/// One time bucket. Absent aggregates stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPoint {
    #[serde(default, deserialize_with = "null_as_default", rename = "timeStamp")]
    pub time_stamp: String,
    pub total: Option<f64>,
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ArmClient {
    /// Send one combined request for `queries` and return the sub-responses
    /// in request order.
    pub async fn execute_batch(
        &self,
        token: &str,
        queries: &[ResolvedQuery],
    ) -> Result<Vec<BatchItemResponse>> {
        let url = format!(
            "{}/batch?api-version={BATCH_API_VERSION}",
            self.resource_manager_url()
        );
        let request = BatchRequest {
            requests: queries
                .iter()
                .map(|q| BatchRequestItem {
                    relative_url: &q.resource_url,
                    http_method: "GET",
                })
                .collect(),
        };
        let body = serde_json::to_value(&request).map_err(|source| MonitorError::Decode {
            endpoint: url.clone(),
            source,
        })?;

        let response: BatchResponse = self.post_json(&url, token, &body).await?;

        if response.responses.len() != queries.len() {
            return Err(MonitorError::BatchMismatch {
                expected: queries.len(),
                actual: response.responses.len(),
            });
        }
        Ok(response.responses)
    }

    /// Run `queries` in consecutive batches of at most `batch_size`, one
    /// batch at a time, handing each sub-response to `on_response` together
    /// with the query it answers.
    ///
    /// The first failing batch aborts the run.
    pub async fn execute_batches<F>(
        &self,
        token: &str,
        queries: &[ResolvedQuery],
        batch_size: usize,
        mut on_response: F,
    ) -> Result<()>
    where
        F: FnMut(&ResolvedQuery, BatchItemResponse),
    {
        for (index, chunk) in queries.chunks(batch_size.max(1)).enumerate() {
            tracing::debug!(batch = index, queries = chunk.len(), "Executing metrics batch");
            let responses = self.execute_batch(token, chunk).await?;
            for (query, response) in chunk.iter().zip(responses) {
                on_response(query, response);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeWindow;
    use crate::resource::ResourceDescriptor;
    use crate::testing::{client_with, MockTransport, SUBSCRIPTION};
    use chrono::{Duration, Utc};

    fn queries(count: usize) -> Vec<ResolvedQuery> {
        let window = TimeWindow::ending_at(Utc::now(), Duration::minutes(3));
        (0..count)
            .map(|i| {
                let resource = ResourceDescriptor {
                    id: format!("/resourceGroups/rg/providers/Microsoft.Web/sites/app-{i}"),
                    name: format!("app-{i}"),
                    subscription: SUBSCRIPTION.to_string(),
                    ..Default::default()
                };
                ResolvedQuery::new(
                    resource,
                    &["Requests".to_string()],
                    &["Total".to_string()],
                    &window,
                )
            })
            .collect()
    }

    /// Echoes every relativeUrl back as the metric unit so the caller can
    /// check positional correlation.
    fn echo_batch() -> MockTransport {
        MockTransport::new().route_with("/batch", |_, body| {
            let requests = body
                .and_then(|b| b["requests"].as_array().cloned())
                .unwrap_or_default();
            let responses: Vec<serde_json::Value> = requests
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "httpStatusCode": 200,
                        "content": { "value": [{
                            "name": { "value": "Requests" },
                            "unit": r["relativeUrl"],
                            "timeseries": []
                        }]}
                    })
                })
                .collect();
            Ok(serde_json::json!({ "responses": responses }).to_string())
        })
    }

    #[tokio::test]
    async fn should_issue_ceil_n_over_b_batches_and_map_by_position() {
        let (client, transport) = client_with(echo_batch());
        let queries = queries(45);

        let mut seen = Vec::new();
        client
            .execute_batches("token", &queries, 20, |query, response| {
                assert_eq!(response.content.value[0].unit, query.resource_url);
                seen.push(query.resource.name.clone());
            })
            .await
            .unwrap();

        let calls = transport.calls_matching("/batch?api-version=2017-03-01");
        assert_eq!(calls.len(), 3);
        let sizes: Vec<usize> = calls
            .iter()
            .map(|c| c.body.as_ref().unwrap()["requests"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(seen.len(), 45);
        assert_eq!(seen[0], "app-0");
        assert_eq!(seen[44], "app-44");
    }

    #[tokio::test]
    async fn should_send_get_items_with_relative_urls() {
        let (client, transport) = client_with(echo_batch());
        let queries = queries(1);

        client.execute_batch("token", &queries).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].url, "https://management.test/batch?api-version=2017-03-01");
        let item = &calls[0].body.as_ref().unwrap()["requests"][0];
        assert_eq!(item["httpMethod"], "GET");
        assert_eq!(item["relativeUrl"], queries[0].resource_url.as_str());
    }

    #[tokio::test]
    async fn should_make_no_calls_without_queries() {
        let (client, transport) = client_with(echo_batch());

        client
            .execute_batches("token", &[], DEFAULT_BATCH_SIZE, |_, _| panic!("no responses expected"))
            .await
            .unwrap();

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_response_with_wrong_item_count() {
        let (client, _) = client_with(MockTransport::new().route(
            "/batch",
            serde_json::json!({ "responses": [{ "httpStatusCode": 200, "content": {} }] }),
        ));

        let err = client.execute_batch("token", &queries(2)).await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::BatchMismatch { expected: 2, actual: 1 }
        ));
    }

    #[tokio::test]
    async fn should_keep_siblings_when_sub_response_holds_nulls() {
        let (client, _) = client_with(MockTransport::new().route(
            "/batch",
            serde_json::json!({ "responses": [
                { "httpStatusCode": 404, "content": null },
                { "httpStatusCode": 200, "content": { "value": [{
                    "name": { "value": "Requests", "localizedValue": null },
                    "unit": "Count",
                    "timeseries": null
                }]}},
                { "httpStatusCode": 200, "content": { "value": null } },
                { "httpStatusCode": 200, "content": { "value": [{
                    "name": { "value": "Requests" },
                    "unit": "Count",
                    "timeseries": [{ "data": [{ "timeStamp": "t", "total": 4.0 }] }]
                }]}}
            ]}),
        ));

        let responses = client.execute_batch("token", &queries(4)).await.unwrap();

        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0].http_status_code, 404);
        assert!(responses[0].content.value.is_empty());
        assert!(responses[1].content.value[0].timeseries.is_empty());
        assert!(responses[2].content.value.is_empty());
        assert_eq!(responses[3].content.value[0].timeseries[0].data[0].total, Some(4.0));
    }

    #[test]
    fn should_decode_null_series_data_as_empty() {
        let series: TimeSeries =
            serde_json::from_value(serde_json::json!({ "data": null })).unwrap();
        assert!(series.data.is_empty());
    }

    #[tokio::test]
    async fn should_abort_on_failed_batch_call() {
        let (client, transport) = client_with(MockTransport::new().fail("/batch", 503));
        let mut delivered = 0;

        let err = client
            .execute_batches("token", &queries(30), 10, |_, _| delivered += 1)
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::Http { status: 503, .. }));
        assert_eq!(delivered, 0);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn should_decode_error_sub_response_and_missing_aggregates() {
        let item: BatchItemResponse = serde_json::from_value(serde_json::json!({
            "httpStatusCode": 400,
            "content": { "error": { "code": "BadRequest", "message": "metric not found" } }
        }))
        .unwrap();
        assert_eq!(item.http_status_code, 400);
        assert_eq!(item.content.error.unwrap().code, "BadRequest");

        let point: DataPoint = serde_json::from_value(serde_json::json!({
            "timeStamp": "2024-05-01T12:00:00Z",
            "average": 1.5
        }))
        .unwrap();
        assert_eq!(point.average, Some(1.5));
        assert_eq!(point.total, None);
    }
}
