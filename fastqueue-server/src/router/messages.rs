use async_trait::async_trait;
use fastqueue_common::router::Handler;
use hyper::{Body, Request, Response};
use uuid::Uuid;

use crate::{
    models::{message::MessageRepository, queue::QueueRepository, topic::TopicRepository},
    routes::{
        messages::{ack_message, nack_message, publish_message},
        FastQueueResponse,
    },
};

pub struct PublishMessagesHandler {
    pub topic_id: String,
}

pub struct AckMessageHandler {
    pub message_id: String,
}

pub struct NackMessageHandler {
    pub message_id: String,
}

fn parse_message_id(id: &str) -> Result<Uuid, Response<Body>> {
    Uuid::parse_str(id).map_err(|_| {
        FastQueueResponse::from_error(crate::error::BrokerError::Invalid("message id must be a uuid".to_string())).into_response()
    })
}

#[async_trait]
impl<R: TopicRepository + QueueRepository + MessageRepository, S: Send> Handler<(R, S)> for PublishMessagesHandler {
    fn needs_body(&self) -> bool {
        true
    }

    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        publish_message(repo, &self.topic_id, serde_json::from_slice(body.as_slice())).into_response()
    }
}

#[async_trait]
impl<R: MessageRepository, S: Send> Handler<(R, S)> for AckMessageHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        match parse_message_id(&self.message_id) {
            Ok(id) => ack_message(repo, id).into_response(),
            Err(response) => response,
        }
    }
}

#[async_trait]
impl<R: MessageRepository, S: Send> Handler<(R, S)> for NackMessageHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        match parse_message_id(&self.message_id) {
            Ok(id) => nack_message(repo, id).into_response(),
            Err(response) => response,
        }
    }
}

