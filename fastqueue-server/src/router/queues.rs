use async_trait::async_trait;
use fastqueue_common::router::Handler;
use hyper::{Body, Request, Response};
use std::{convert::TryInto, sync::Arc};

use crate::{
    config::Config,
    models::{message::MessageRepository, queue::QueueRepository},
    routes::{
        messages::lease_messages,
        queues::{delete_queue, describe_queue, list_queues, new_queue, purge_queue, queue_stats, redrive_queue, update_queue, Page},
    },
};

/// The default number of messages a lease returns when the `limit` query parameter is absent.
const DEFAULT_LEASE_LIMIT: i64 = 10;

pub struct NewQueueHandler {
    pub config: Arc<Config>,
}

pub struct DescribeQueueHandler {
    pub queue_id: String,
}

pub struct UpdateQueueHandler {
    pub queue_id: String,
    pub config:   Arc<Config>,
}

pub struct DeleteQueueHandler {
    pub queue_id: String,
}

pub struct ListQueuesHandler;

pub struct QueueStatsHandler {
    pub queue_id: String,
}

pub struct PurgeQueueHandler {
    pub queue_id: String,
}

pub struct RedriveQueueHandler {
    pub queue_id: String,
}

pub struct LeaseMessagesHandler {
    pub queue_id: String,
}

#[async_trait]
impl<R: QueueRepository, S: Send> Handler<(R, S)> for NewQueueHandler {
    fn needs_body(&self) -> bool {
        true
    }

    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        new_queue(repo, &self.config, serde_json::from_slice(body.as_slice())).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository, S: Send> Handler<(R, S)> for DescribeQueueHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        describe_queue(repo, &self.queue_id).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository, S: Send> Handler<(R, S)> for UpdateQueueHandler {
    fn needs_body(&self) -> bool {
        true
    }

    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        update_queue(repo, &self.config, &self.queue_id, serde_json::from_slice(body.as_slice())).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository, S: Send> Handler<(R, S)> for DeleteQueueHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        delete_queue(repo, &self.queue_id).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository, S: Send> Handler<(R, S)> for ListQueuesHandler {
    async fn handle(&self, (repo, _): (R, S), req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        let page: Page = (&req).try_into().unwrap_or(Page { offset: None, limit: None });
        list_queues(repo, page).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository + MessageRepository, S: Send> Handler<(R, S)> for QueueStatsHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        queue_stats(repo, &self.queue_id).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository + MessageRepository, S: Send> Handler<(R, S)> for PurgeQueueHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        purge_queue(repo, &self.queue_id).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository + MessageRepository, S: Send> Handler<(R, S)> for RedriveQueueHandler {
    fn needs_body(&self) -> bool {
        true
    }

    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        redrive_queue(repo, &self.queue_id, serde_json::from_slice(body.as_slice())).into_response()
    }
}

#[async_trait]
impl<R: QueueRepository + MessageRepository, S: Send> Handler<(R, S)> for LeaseMessagesHandler {
    async fn handle(&self, (repo, _): (R, S), req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        let limit = req
            .uri()
            .query()
            .and_then(|query| query.split('&').find_map(|pair| pair.strip_prefix("limit=")))
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_LEASE_LIMIT);
        lease_messages(repo, &self.queue_id, limit).into_response()
    }
}
