#![warn(
    missing_docs,
    rust_2018_idioms,
    future_incompatible,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused,
    unused_qualifications,
    variant_size_differences
)]

//! Client library for fastqueue servers.
//!
//! The main type is `Service`, a configured client for a single fastqueue server: it can
//! manage topics and queues, publish messages, and lease/ack/nack them.
//!
//! ```
//! use fastqueue_client::Service;
//! use tokio::runtime::Builder;
//!
//! let service = Service::new("http://127.0.0.1:7843");
//! let rt = Builder::new_multi_thread().enable_all().build().unwrap();
//! let healthy = rt.block_on(async { service.check_health().await });
//! assert!(healthy.is_err());
//! ```

use fastqueue_common::{
    read_body, ListResponse, MessageIn, MessageOut, QueueIn, QueueOut, QueueStats, RedriveIn, Status::ServiceUnavailable,
    TopicIn, TopicOut, TraceIdHeader,
};
use hyper::{
    client::{Client, HttpConnector},
    header::{HeaderValue, CONNECTION, CONTENT_TYPE},
    Body,
    Method,
    Request,
    Response,
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    error::Error,
    fmt::{Display, Formatter},
};
use uuid::Uuid;

/// If something goes wrong, we return an instance of `ClientError` describing what exactly
/// failed during the operation.
#[derive(Debug)]
pub enum ClientError {
    /// Hyper returned some error.
    HyperError(hyper::Error),
    /// An invalid URI was provided.
    InvalidUri(hyper::http::uri::InvalidUri),
    /// A JSON response failed to parse.
    ParseError(serde_json::error::Error),
    /// A value could not be converted to a header value because it contained invalid characters.
    InvalidHeaderValue(hyper::header::InvalidHeaderValue),
    /// The server returned a status code neither the success nor the documented error code.
    ServiceError(u16),
    /// The response returned by the server was larger than what the client was configured to accept.
    TooLargeResponse,
    /// The server returned an invalid health check response.
    HealthCheckError,
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for ClientError {}

impl From<hyper::Error> for ClientError {
    fn from(error: hyper::Error) -> Self {
        Self::HyperError(error)
    }
}

impl From<hyper::http::uri::InvalidUri> for ClientError {
    fn from(error: hyper::http::uri::InvalidUri) -> Self {
        Self::InvalidUri(error)
    }
}

impl From<serde_json::error::Error> for ClientError {
    fn from(error: serde_json::error::Error) -> Self {
        Self::ParseError(error)
    }
}

impl From<hyper::header::InvalidHeaderValue> for ClientError {
    fn from(error: hyper::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeaderValue(error)
    }
}

/// A `Service` speaks to a single fastqueue server.
pub struct Service {
    client:        Client<HttpConnector>,
    host:          String,
    max_body_size: Option<usize>,
}

impl Service {
    const DEFAULT_MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

    /// Create a new client pointed at `host`, e.g. `"http://127.0.0.1:7843"`.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            client:        Client::new(),
            host:          host.trim_end_matches('/').to_string(),
            max_body_size: Some(Self::DEFAULT_MAX_BODY_SIZE),
        }
    }

    /// Configure the maximum response body size this client will read into memory. `None`
    /// allows unbounded responses.
    pub fn set_max_body_size(&mut self, max_body_size: Option<usize>) -> &mut Self {
        self.max_body_size = max_body_size;
        self
    }

    fn new_request(method: Method, uri: &str, trace_id: Option<Uuid>, body: Body) -> Result<Request<Body>, hyper::http::uri::InvalidUri> {
        let mut req = Request::new(body);
        *req.uri_mut() = uri.parse()?;
        *req.method_mut() = method;
        req.headers_mut().insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        if let Some(trace_id) = trace_id {
            if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
                req.headers_mut().insert(TraceIdHeader {}.name(), value);
            }
        }
        Ok(req)
    }

    async fn request<E: Send, F: Sync + Send + Fn() -> Result<Request<Body>, E>>(&self, builder: F) -> Result<Response<Body>, ClientError>
    where
        ClientError: From<E>,
    {
        loop {
            let res = self.client.request(builder()?).await?;
            if res.status() != StatusCode::from(ServiceUnavailable) {
                return Ok(res);
            }
        }
    }

    async fn json_request<T: Serialize + Sync>(&self, method: Method, uri: &str, trace_id: Option<Uuid>, body: &T) -> Result<Response<Body>, ClientError> {
        self.request(|| {
            let message = serde_json::to_string(body)?;
            let mut req = Self::new_request(method.clone(), uri, trace_id, Body::from(message))?;
            req.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok::<_, ClientError>(req)
        })
        .await
    }

    async fn parse_json<T: DeserializeOwned>(&self, mut response: Response<Body>) -> Result<T, ClientError> {
        match read_body(response.body_mut(), self.max_body_size).await? {
            Some(body) => Ok(serde_json::from_slice(body.as_slice())?),
            None => Err(ClientError::TooLargeResponse),
        }
    }

    async fn parse_json_maybe<T: DeserializeOwned>(&self, response: Response<Body>, success_status: u16, absent_status: u16) -> Result<Option<T>, ClientError> {
        let status = response.status().as_u16();
        if status == success_status {
            self.parse_json(response).await.map(Some)
        } else if status == absent_status {
            Ok(None)
        } else {
            Err(ClientError::ServiceError(status))
        }
    }

    async fn expect_status(&self, response: Response<Body>, success_status: u16, absent_status: u16) -> Result<bool, ClientError> {
        match response.status().as_u16() {
            status if status == success_status => Ok(true),
            status if status == absent_status => Ok(false),
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Create a new topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns a status other than 201.
    pub async fn create_topic(&self, id: &str, trace_id: Option<Uuid>) -> Result<TopicOut, ClientError> {
        let uri = format!("{}/topics", &self.host);
        let response = self.json_request(Method::POST, &uri, trace_id, &TopicIn { id: id.to_string() }).await?;
        match response.status().as_u16() {
            201 => self.parse_json(response).await,
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Get information about a single topic, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn describe_topic(&self, id: &str, trace_id: Option<Uuid>) -> Result<Option<TopicOut>, ClientError> {
        let uri = format!("{}/topics/{}", &self.host, id);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        self.parse_json_maybe(response, 200, 404).await
    }

    /// Retrieve a page of topics.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn list_topics(&self, trace_id: Option<Uuid>, offset: Option<i64>, limit: Option<i64>) -> Result<ListResponse<TopicOut>, ClientError> {
        let uri = page_uri(&self.host, "topics", offset, limit);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        match response.status().as_u16() {
            200 => self.parse_json(response).await,
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Delete a topic. Returns `true` if the topic existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn delete_topic(&self, id: &str, trace_id: Option<Uuid>) -> Result<bool, ClientError> {
        let uri = format!("{}/topics/{}", &self.host, id);
        let response = self.request(|| Self::new_request(Method::DELETE, &uri, trace_id, Body::default())).await?;
        self.expect_status(response, 204, 404).await
    }

    /// Publish a message, fanning it out to every queue subscribed to `topic_id` whose filters
    /// admit it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the topic does not exist, or the server returns an
    /// unexpected status.
    pub async fn publish_message(
        &self,
        topic_id: &str,
        data: serde_json::Value,
        attributes: Option<std::collections::HashMap<String, String>>,
        trace_id: Option<Uuid>,
    ) -> Result<ListResponse<MessageOut>, ClientError> {
        let uri = format!("{}/topics/{}/messages", &self.host, topic_id);
        let response = self.json_request(Method::POST, &uri, trace_id, &MessageIn { data, attributes }).await?;
        match response.status().as_u16() {
            201 => self.parse_json(response).await,
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Create a new queue with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns a status other than 201.
    pub async fn create_queue(&self, params: &QueueIn, trace_id: Option<Uuid>) -> Result<QueueOut, ClientError> {
        let uri = format!("{}/queues", &self.host);
        let response = self.json_request(Method::POST, &uri, trace_id, params).await?;
        match response.status().as_u16() {
            201 => self.parse_json(response).await,
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Update the attributes of an existing queue. Returns `None` if the queue does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn update_queue(&self, id: &str, params: &QueueIn, trace_id: Option<Uuid>) -> Result<Option<QueueOut>, ClientError> {
        let uri = format!("{}/queues/{}", &self.host, id);
        let response = self.json_request(Method::PUT, &uri, trace_id, params).await?;
        self.parse_json_maybe(response, 200, 404).await
    }

    /// Get information about a single queue, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn describe_queue(&self, id: &str, trace_id: Option<Uuid>) -> Result<Option<QueueOut>, ClientError> {
        let uri = format!("{}/queues/{}", &self.host, id);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        self.parse_json_maybe(response, 200, 404).await
    }

    /// Retrieve a page of queues.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn list_queues(&self, trace_id: Option<Uuid>, offset: Option<i64>, limit: Option<i64>) -> Result<ListResponse<QueueOut>, ClientError> {
        let uri = page_uri(&self.host, "queues", offset, limit);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        match response.status().as_u16() {
            200 => self.parse_json(response).await,
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Delete a queue and every message currently stored in it. Returns `true` if the queue
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn delete_queue(&self, id: &str, trace_id: Option<Uuid>) -> Result<bool, ClientError> {
        let uri = format!("{}/queues/{}", &self.host, id);
        let response = self.request(|| Self::new_request(Method::DELETE, &uri, trace_id, Body::default())).await?;
        self.expect_status(response, 204, 404).await
    }

    /// Retrieve delivery statistics for a queue, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn queue_stats(&self, id: &str, trace_id: Option<Uuid>) -> Result<Option<QueueStats>, ClientError> {
        let uri = format!("{}/queues/{}/stats", &self.host, id);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        self.parse_json_maybe(response, 200, 404).await
    }

    /// Delete every message currently stored in a queue, without deleting the queue itself.
    /// Returns `true` if the queue existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn purge_queue(&self, id: &str, trace_id: Option<Uuid>) -> Result<bool, ClientError> {
        let uri = format!("{}/queues/{}/purge", &self.host, id);
        let response = self.request(|| Self::new_request(Method::PUT, &uri, trace_id, Body::default())).await?;
        self.expect_status(response, 204, 404).await
    }

    /// Move every currently-consumable message of `id` into `destination_queue_id`. Returns
    /// `true` if both queues existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn redrive_queue(&self, id: &str, destination_queue_id: &str, trace_id: Option<Uuid>) -> Result<bool, ClientError> {
        let uri = format!("{}/queues/{}/redrive", &self.host, id);
        let response = self
            .json_request(Method::PUT, &uri, trace_id, &RedriveIn {
                destination_queue_id: destination_queue_id.to_string(),
            })
            .await?;
        self.expect_status(response, 204, 404).await
    }

    /// Lease up to `limit` messages from a queue, or `None` if the queue does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn lease_messages(&self, queue_id: &str, limit: i64, trace_id: Option<Uuid>) -> Result<Option<ListResponse<MessageOut>>, ClientError> {
        let uri = format!("{}/queues/{}/messages?limit={}", &self.host, queue_id, limit);
        let response = self.request(|| Self::new_request(Method::GET, &uri, trace_id, Body::default())).await?;
        self.parse_json_maybe(response, 200, 404).await
    }

    /// Acknowledge a leased message, permanently deleting it. Idempotent: acknowledging an
    /// already-deleted or never-leased message still succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn ack_message(&self, id: Uuid, trace_id: Option<Uuid>) -> Result<(), ClientError> {
        let uri = format!("{}/messages/{}/ack", &self.host, id);
        let response = self.request(|| Self::new_request(Method::PUT, &uri, trace_id, Body::default())).await?;
        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Make a leased message immediately visible again without waiting out its visibility
    /// timeout. Idempotent, same as `ack_message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an unexpected status.
    pub async fn nack_message(&self, id: Uuid, trace_id: Option<Uuid>) -> Result<(), ClientError> {
        let uri = format!("{}/messages/{}/nack", &self.host, id);
        let response = self.request(|| Self::new_request(Method::PUT, &uri, trace_id, Body::default())).await?;
        match response.status().as_u16() {
            204 => Ok(()),
            status => Err(ClientError::ServiceError(status)),
        }
    }

    /// Evaluate the health of a service.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server returns a status different from 200, or
    /// a response different from "green" or "red".
    pub async fn check_health(&self) -> Result<bool, ClientError> {
        let uri = format!("{}/health", &self.host);
        let mut response = self.request(|| Self::new_request(Method::GET, &uri, None, Body::default())).await?;
        let body = match response.status().as_u16() {
            200 => Ok(read_body(response.body_mut(), self.max_body_size).await?),
            status => Err(ClientError::ServiceError(status)),
        }?;
        body.map_or(Err(ClientError::TooLargeResponse), |body| {
            if body.as_slice().eq(b"green") {
                Ok(true)
            } else if body.as_slice().eq(b"red") {
                Ok(false)
            } else {
                Err(ClientError::HealthCheckError)
            }
        })
    }
}

fn page_uri(host: &str, path: &str, offset: Option<i64>, limit: Option<i64>) -> String {
    match (offset, limit) {
        (Some(offset), Some(limit)) => format!("{}/{}?offset={}&limit={}", host, path, offset, limit),
        (Some(offset), None) => format!("{}/{}?offset={}", host, path, offset),
        (None, Some(limit)) => format!("{}/{}?limit={}", host, path, limit),
        (None, None) => format!("{}/{}", host, path),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fastqueue_common::test_support::make_runtime;

    #[test]
    fn page_uri_without_params() {
        assert_eq!(page_uri("http://host", "topics", None, None), "http://host/topics");
    }

    #[test]
    fn page_uri_with_both_params() {
        assert_eq!(page_uri("http://host", "queues", Some(10), Some(5)), "http://host/queues?offset=10&limit=5");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let service = Service::new("http://host:1234/");
        assert_eq!(service.host, "http://host:1234");
    }

    #[test]
    fn set_max_body_size() {
        let mut service = Service::new("http://localhost:7843");
        service.set_max_body_size(None);
        assert_eq!(service.max_body_size, None);
        service.set_max_body_size(Some(64 * 1024));
        assert_eq!(service.max_body_size, Some(64 * 1024));
    }

    #[test]
    fn test_errors() {
        let client = hyper::client::Client::new();
        let rt = make_runtime();
        let hyper_error = rt.block_on(async { client.get("http://localhost:60000/non-existent".parse().unwrap()).await.unwrap_err() });
        let hyper_error_string = format!("HyperError({:?})", &hyper_error);
        let err: ClientError = ClientError::from(hyper_error);
        assert_eq!(format!("{}", err), hyper_error_string);

        let invalid_uri_error = "".parse::<hyper::Uri>().unwrap_err();
        let err = ClientError::from(invalid_uri_error);
        assert_eq!(format!("{}", err), "InvalidUri(InvalidUri(Empty))");

        let serde_error = serde_json::from_str::<String>("").unwrap_err();
        let err = ClientError::from(serde_error);
        assert!(format!("{}", err).starts_with("ParseError"));

        let invalid_header_error = HeaderValue::from_str("\0").unwrap_err();
        let err = ClientError::from(invalid_header_error);
        assert_eq!(format!("{}", err), "InvalidHeaderValue(InvalidHeaderValue)");
    }

    #[test]
    fn check_health_against_nothing_listening() {
        let service = Service::new("http://127.0.0.1:1");
        let rt = make_runtime();
        let result = rt.block_on(async { service.check_health().await });
        assert!(result.is_err());
    }
}
