use async_trait::async_trait;
use fastqueue_common::router::Handler;
use hyper::{Body, Request, Response};
use std::convert::TryInto;

use crate::{
    models::topic::TopicRepository,
    routes::{queues::Page, topics::{delete_topic, describe_topic, list_topics, new_topic}},
};

pub struct NewTopicHandler;

pub struct DescribeTopicHandler {
    pub topic_id: String,
}

pub struct ListTopicsHandler;

pub struct DeleteTopicHandler {
    pub topic_id: String,
}

#[async_trait]
impl<R: TopicRepository, S: Send> Handler<(R, S)> for NewTopicHandler {
    fn needs_body(&self) -> bool {
        true
    }

    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        new_topic(repo, serde_json::from_slice(body.as_slice())).into_response()
    }
}

#[async_trait]
impl<R: TopicRepository, S: Send> Handler<(R, S)> for DescribeTopicHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        describe_topic(repo, &self.topic_id).into_response()
    }
}

#[async_trait]
impl<R: TopicRepository, S: Send> Handler<(R, S)> for ListTopicsHandler {
    async fn handle(&self, (repo, _): (R, S), req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        let page: Page = (&req).try_into().unwrap_or(Page { offset: None, limit: None });
        list_topics(repo, page.offset, page.limit).into_response()
    }
}

#[async_trait]
impl<R: TopicRepository, S: Send> Handler<(R, S)> for DeleteTopicHandler {
    async fn handle(&self, (repo, _): (R, S), _req: Request<Body>, _body: Vec<u8>) -> Response<Body>
    where
        R: 'async_trait,
        S: 'async_trait,
    {
        delete_topic(repo, &self.topic_id).into_response()
    }
}
