use chrono::{DateTime, Utc};
use fastqueue_common::{MessageIn, MessageOut, Status};
use serde_json::Error as JsonError;
use uuid::Uuid;

use crate::{
    error::BrokerError,
    filter::admit,
    models::{
        message::{Message, MessageRepository, NewMessageInput},
        queue::QueueRepository,
        topic::TopicRepository,
    },
    routes::FastQueueResponse,
};

impl From<&Message> for MessageOut {
    fn from(message: &Message) -> Self {
        MessageOut {
            id:                message.id,
            queue_id:          message.queue_id.clone(),
            data:              message.data.clone(),
            attributes:        message
                .attributes
                .as_ref()
                .and_then(|value| serde_json::from_value(value.clone()).ok()),
            delivery_attempts: message.delivery_attempts,
            expired_at:        DateTime::from_naive_utc_and_offset(message.expired_at, Utc),
            scheduled_at:      DateTime::from_naive_utc_and_offset(message.scheduled_at, Utc),
            created_at:        DateTime::from_naive_utc_and_offset(message.created_at, Utc),
            updated_at:        DateTime::from_naive_utc_and_offset(message.updated_at, Utc),
        }
    }
}

/// Publish into every queue subscribed to `topic_id`, filtering by each queue's
/// `message_filters`.
pub fn publish_message<R: TopicRepository + QueueRepository + MessageRepository>(
    mut repo: R,
    topic_id: &str,
    params: Result<MessageIn, JsonError>,
) -> FastQueueResponse {
    let params = match params {
        Ok(params) => params,
        Err(err) => return FastQueueResponse::from_error(BrokerError::Invalid(err.to_string())),
    };
    match repo.find_topic(topic_id) {
        Ok(Some(_)) => {},
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    }
    let queues = match repo.list_queues(None, None) {
        Ok(queues) => queues,
        Err(err) => return FastQueueResponse::from_error(err),
    };
    let data = params.data.clone();
    let attributes = params
        .attributes
        .as_ref()
        .map(|attrs| serde_json::to_value(attrs).unwrap());
    let now = Utc::now().naive_utc();
    let input = NewMessageInput {
        data:       &data,
        attributes: attributes.as_ref(),
    };
    let mut created = Vec::new();
    for queue in queues.into_iter().filter(|q| q.topic_id.as_deref() == Some(topic_id)) {
        if !admit(queue.filters().as_ref(), params.attributes.as_ref()) {
            continue;
        }
        created.push(Message::for_queue(&queue, &input, now));
    }
    if created.is_empty() {
        return FastQueueResponse::json(Status::Created, &fastqueue_common::ListResponse::<MessageOut> { data: Vec::new() });
    }
    match repo.insert_messages(created) {
        Ok(messages) => {
            FastQueueResponse::json(
                Status::Created,
                &fastqueue_common::ListResponse {
                    data: messages.iter().map(MessageOut::from).collect(),
                },
            )
        },
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn lease_messages<R: QueueRepository + MessageRepository>(mut repo: R, queue_id: &str, limit: i64) -> FastQueueResponse {
    let queue = match repo.find_queue(queue_id) {
        Ok(Some(queue)) => queue,
        Ok(None) => return FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => return FastQueueResponse::from_error(err),
    };
    match repo.lease_messages(&queue, limit) {
        Ok(messages) => FastQueueResponse::json(
            Status::Ok,
            &fastqueue_common::ListResponse {
                data: messages.iter().map(MessageOut::from).collect(),
            },
        ),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn ack_message<R: MessageRepository>(mut repo: R, id: Uuid) -> FastQueueResponse {
    match repo.ack_message(id) {
        Ok(()) => FastQueueResponse::status(Status::NoContent),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn nack_message<R: MessageRepository>(mut repo: R, id: Uuid) -> FastQueueResponse {
    match repo.nack_message(id) {
        Ok(()) => FastQueueResponse::status(Status::NoContent),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{queue::Queue, test_support::TestRepo, topic::TopicRepository};
    use std::sync::{Arc, Mutex};

    fn repo() -> Arc<Mutex<TestRepo>> {
        Arc::new(Mutex::new(TestRepo::new()))
    }

    fn queue(id: &str, topic_id: &str) -> Queue {
        let now = Utc::now().naive_utc();
        Queue {
            id: id.to_string(),
            topic_id: Some(topic_id.to_string()),
            dead_queue_id: None,
            ack_deadline_seconds: 30,
            message_retention_seconds: 600,
            message_filters: None,
            message_max_deliveries: None,
            delivery_delay_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn publish_fans_out_to_every_subscribed_queue() {
        let repo = repo();
        repo.lock().unwrap().insert_topic("t1").unwrap();
        QueueRepository::insert_queue(&mut *repo.lock().unwrap(), queue("qa", "t1")).unwrap();
        QueueRepository::insert_queue(&mut *repo.lock().unwrap(), queue("qb", "t1")).unwrap();
        let params = MessageIn {
            data:       serde_json::json!({"k": 1}),
            attributes: None,
        };
        let response = publish_message(repo, "t1", Ok(params));
        match response {
            FastQueueResponse::Json(Status::Created, body) => assert!(body.contains("\"k\":1")),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn publish_to_missing_topic_is_not_found() {
        let response = publish_message(
            repo(),
            "missing",
            Ok(MessageIn {
                data:       serde_json::json!({}),
                attributes: None,
            }),
        );
        assert!(matches!(response, FastQueueResponse::Json(Status::NotFound, _)));
    }

    #[test]
    fn ack_is_idempotent() {
        let repo = repo();
        let response = ack_message(repo, Uuid::new_v4());
        assert!(matches!(response, FastQueueResponse::Status(Status::NoContent)));
    }
}
