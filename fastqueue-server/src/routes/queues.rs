use chrono::{DateTime, Utc};
use fastqueue_common::{is_valid_id, QueueIn, QueueOut, QueueStats, RedriveIn, Status, ID_PATTERN_DESCRIPTION};
use serde_json::Error as JsonError;
use std::convert::TryFrom;

use crate::{
    config::Config,
    error::BrokerError,
    models::{
        message::MessageRepository,
        queue::{Queue, QueueRepository},
    },
    routes::FastQueueResponse,
};

impl From<&Queue> for QueueOut {
    fn from(queue: &Queue) -> Self {
        QueueOut {
            id:                        queue.id.clone(),
            topic_id:                  queue.topic_id.clone(),
            dead_queue_id:             queue.dead_queue_id.clone(),
            ack_deadline_seconds:      queue.ack_deadline_seconds,
            message_retention_seconds: i64::from(queue.message_retention_seconds),
            message_filters:           queue.filters(),
            message_max_deliveries:    queue.message_max_deliveries,
            delivery_delay_seconds:    queue.delivery_delay_seconds,
            created_at:                DateTime::from_naive_utc_and_offset(queue.created_at, Utc),
            updated_at:                DateTime::from_naive_utc_and_offset(queue.updated_at, Utc),
        }
    }
}

/// Query parameters accepted by `GET /topics`, `GET /queues`.
pub struct Page {
    pub offset: Option<i64>,
    pub limit:  Option<i64>,
}

impl TryFrom<&hyper::Request<hyper::Body>> for Page {
    type Error = ();

    fn try_from(req: &hyper::Request<hyper::Body>) -> Result<Self, Self::Error> {
        let query = req.uri().query().unwrap_or("");
        let mut offset = None;
        let mut limit = None;
        for pair in query.split('&') {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some("offset"), Some(value)) => offset = value.parse().ok(),
                (Some("limit"), Some(value)) => limit = value.parse().ok(),
                _ => {},
            }
        }
        Ok(Page { offset, limit })
    }
}

/// Validate a queue's attributes, returning `message_retention_seconds` narrowed to `i32` once
/// it's confirmed to fit.
fn validate(config: &Config, params: &QueueIn) -> Result<i32, BrokerError> {
    if let Some(topic_id) = &params.topic_id {
        if !is_valid_id(topic_id) {
            return Err(BrokerError::Invalid(format!("topic_id {}", ID_PATTERN_DESCRIPTION)));
        }
    }
    if let Some(dead_queue_id) = &params.dead_queue_id {
        if !is_valid_id(dead_queue_id) {
            return Err(BrokerError::Invalid(format!("dead_queue_id {}", ID_PATTERN_DESCRIPTION)));
        }
    }
    if !config.ack_deadline_range.contains(params.ack_deadline_seconds) {
        return Err(BrokerError::Invalid("ack_deadline_seconds out of range".to_string()));
    }
    let retention = i32::try_from(params.message_retention_seconds)
        .map_err(|_| BrokerError::Invalid("message_retention_seconds out of range".to_string()))?;
    if !config.message_retention_range.contains(retention) {
        return Err(BrokerError::Invalid("message_retention_seconds out of range".to_string()));
    }
    if let Some(max_deliveries) = params.message_max_deliveries {
        if !config.message_max_deliveries_range.contains(max_deliveries) {
            return Err(BrokerError::Invalid("message_max_deliveries out of range".to_string()));
        }
    }
    if let Some(delay) = params.delivery_delay_seconds {
        if !config.delivery_delay_range.contains(delay) {
            return Err(BrokerError::Invalid("delivery_delay_seconds out of range".to_string()));
        }
    }
    if params.dead_queue_id.is_some() != params.message_max_deliveries.is_some() {
        return Err(BrokerError::Invalid(
            "dead_queue_id and message_max_deliveries must be set together".to_string(),
        ));
    }
    Ok(retention)
}

pub fn new_queue<R: QueueRepository>(mut repo: R, config: &Config, params: Result<QueueIn, JsonError>) -> FastQueueResponse {
    let params = match params {
        Ok(params) => params,
        Err(err) => return FastQueueResponse::from_error(BrokerError::Invalid(err.to_string())),
    };
    if !is_valid_id(&params.id) {
        return FastQueueResponse::from_error(BrokerError::Invalid(ID_PATTERN_DESCRIPTION.to_string()));
    }
    if params.dead_queue_id.as_deref() == Some(params.id.as_str()) {
        return FastQueueResponse::from_error(BrokerError::Invalid("a queue may not be its own dead queue".to_string()));
    }
    let message_retention_seconds = match validate(config, &params) {
        Ok(retention) => retention,
        Err(err) => return FastQueueResponse::from_error(err),
    };
    let now = Utc::now().naive_utc();
    let queue = Queue {
        id: params.id,
        topic_id: params.topic_id,
        dead_queue_id: params.dead_queue_id,
        ack_deadline_seconds: params.ack_deadline_seconds,
        message_retention_seconds,
        message_filters: params.message_filters.map(|f| serde_json::to_value(f).unwrap()),
        message_max_deliveries: params.message_max_deliveries,
        delivery_delay_seconds: params.delivery_delay_seconds,
        created_at: now,
        updated_at: now,
    };
    match repo.insert_queue(queue) {
        Ok(queue) => FastQueueResponse::json(Status::Created, &QueueOut::from(&queue)),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn describe_queue<R: QueueRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    match repo.find_queue(id) {
        Ok(Some(queue)) => FastQueueResponse::json(Status::Ok, &QueueOut::from(&queue)),
        Ok(None) => FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn update_queue<R: QueueRepository>(
    mut repo: R,
    config: &Config,
    id: &str,
    params: Result<QueueIn, JsonError>,
) -> FastQueueResponse {
    let params = match params {
        Ok(params) => params,
        Err(err) => return FastQueueResponse::from_error(BrokerError::Invalid(err.to_string())),
    };
    if params.dead_queue_id.as_deref() == Some(id) {
        return FastQueueResponse::from_error(BrokerError::Invalid("a queue may not be its own dead queue".to_string()));
    }
    let message_retention_seconds = match validate(config, &params) {
        Ok(retention) => retention,
        Err(err) => return FastQueueResponse::from_error(err),
    };
    let now = Utc::now().naive_utc();
    let update = Queue {
        id: id.to_string(),
        topic_id: params.topic_id,
        dead_queue_id: params.dead_queue_id,
        ack_deadline_seconds: params.ack_deadline_seconds,
        message_retention_seconds,
        message_filters: params.message_filters.map(|f| serde_json::to_value(f).unwrap()),
        message_max_deliveries: params.message_max_deliveries,
        delivery_delay_seconds: params.delivery_delay_seconds,
        created_at: now,
        updated_at: now,
    };
    match repo.update_queue(id, update) {
        Ok(Some(queue)) => FastQueueResponse::json(Status::Ok, &QueueOut::from(&queue)),
        Ok(None) => FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn list_queues<R: QueueRepository>(mut repo: R, page: Page) -> FastQueueResponse {
    match repo.list_queues(page.offset, page.limit) {
        Ok(queues) => FastQueueResponse::list(queues.iter().map(QueueOut::from).collect()),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn delete_queue<R: QueueRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    match repo.delete_queue(id) {
        Ok(Some(_)) => FastQueueResponse::status(Status::NoContent),
        Ok(None) => FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn queue_stats<R: QueueRepository + MessageRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    let queue = match repo.find_queue(id) {
        Ok(Some(queue)) => queue,
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    };
    match repo.queue_stats(&queue) {
        Ok((count, oldest_age)) => FastQueueResponse::json(
            Status::Ok,
            &QueueStats {
                num_undelivered_messages:          count,
                oldest_unacked_message_age_seconds: oldest_age,
            },
        ),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn purge_queue<R: QueueRepository + MessageRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    match repo.find_queue(id) {
        Ok(Some(_)) => {},
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    }
    match repo.purge_queue(id) {
        Ok(_) => FastQueueResponse::status(Status::NoContent),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn redrive_queue<R: QueueRepository + MessageRepository>(
    mut repo: R,
    id: &str,
    params: Result<RedriveIn, JsonError>,
) -> FastQueueResponse {
    let params = match params {
        Ok(params) => params,
        Err(err) => return FastQueueResponse::from_error(BrokerError::Invalid(err.to_string())),
    };
    let source = match repo.find_queue(id) {
        Ok(Some(queue)) => queue,
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    };
    let destination = match repo.find_queue(&params.destination_queue_id) {
        Ok(Some(queue)) => queue,
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    };
    match repo.redrive_queue(&source, &destination) {
        Ok(_) => FastQueueResponse::status(Status::NoContent),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_support::TestRepo;
    use std::sync::{Arc, Mutex};

    fn repo() -> Arc<Mutex<TestRepo>> {
        Arc::new(Mutex::new(TestRepo::new()))
    }

    fn queue_in(id: &str) -> QueueIn {
        QueueIn {
            id: id.to_string(),
            topic_id: None,
            dead_queue_id: None,
            ack_deadline_seconds: 30,
            message_retention_seconds: 600,
            message_filters: None,
            message_max_deliveries: None,
            delivery_delay_seconds: None,
        }
    }

    fn config() -> Config {
        use crate::config::Range;
        Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 7843,
            server_num_workers: 1,
            queue_cleanup_interval_seconds: 60,
            ack_deadline_range: Range { min: 1, max: 600 },
            message_retention_range: Range { min: 600, max: 1_209_600 },
            message_max_deliveries_range: Range { min: 1, max: 1000 },
            delivery_delay_range: Range { min: 1, max: 900 },
            enable_prometheus_metrics: false,
            database_url: "postgres://localhost/fastqueue_test".to_string(),
            min_pool_size: 1,
            max_pool_size: 1,
        }
    }

    #[test]
    fn create_then_describe() {
        let repo = repo();
        let response = new_queue(repo.clone(), &config(), Ok(queue_in("q1")));
        assert!(matches!(response, FastQueueResponse::Json(Status::Created, _)));
        let response = describe_queue(repo, "q1");
        assert!(matches!(response, FastQueueResponse::Json(Status::Ok, _)));
    }

    #[test]
    fn missing_topic_referent_rejected() {
        let mut params = queue_in("q1");
        params.topic_id = Some("no-such-topic".to_string());
        let response = new_queue(repo(), &config(), Ok(params));
        assert!(matches!(response, FastQueueResponse::Json(Status::NotFound, _)));
    }

    #[test]
    fn self_reference_rejected() {
        let mut params = queue_in("q1");
        params.dead_queue_id = Some("q1".to_string());
        params.message_max_deliveries = Some(3);
        let response = new_queue(repo(), &config(), Ok(params));
        assert!(matches!(response, FastQueueResponse::Json(Status::UnprocessableEntity, _)));
    }

    #[test]
    fn dead_queue_without_max_deliveries_rejected() {
        let mut params = queue_in("q1");
        params.dead_queue_id = Some("dead".to_string());
        let response = new_queue(repo(), &config(), Ok(params));
        assert!(matches!(response, FastQueueResponse::Json(Status::UnprocessableEntity, _)));
    }

    #[test]
    fn out_of_range_ack_deadline_rejected() {
        let mut params = queue_in("q1");
        params.ack_deadline_seconds = 0;
        let response = new_queue(repo(), &config(), Ok(params));
        assert!(matches!(response, FastQueueResponse::Json(Status::UnprocessableEntity, _)));
    }
}
