use fastqueue_common::{is_valid_id, Status, TopicIn, TopicOut, ID_PATTERN_DESCRIPTION};
use serde_json::Error as JsonError;

use crate::{
    error::BrokerError,
    models::topic::{Topic, TopicRepository},
    routes::FastQueueResponse,
};

impl From<&Topic> for TopicOut {
    fn from(topic: &Topic) -> Self {
        TopicOut {
            id:         topic.id.clone(),
            created_at: chrono::DateTime::from_naive_utc_and_offset(topic.created_at, chrono::Utc),
        }
    }
}

pub fn new_topic<R: TopicRepository>(mut repo: R, params: Result<TopicIn, JsonError>) -> FastQueueResponse {
    let params = match params {
        Ok(params) => params,
        Err(err) => return FastQueueResponse::from_error(BrokerError::Invalid(err.to_string())),
    };
    if !is_valid_id(&params.id) {
        return FastQueueResponse::from_error(BrokerError::Invalid(ID_PATTERN_DESCRIPTION.to_string()));
    }
    match repo.insert_topic(&params.id) {
        Ok(topic) => FastQueueResponse::json(Status::Created, &TopicOut::from(&topic)),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn describe_topic<R: TopicRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    match repo.find_topic(id) {
        Ok(Some(topic)) => FastQueueResponse::json(Status::Ok, &TopicOut::from(&topic)),
        Ok(None) => FastQueueResponse::from_error(BrokerError::NotFound),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn list_topics<R: TopicRepository>(mut repo: R, offset: Option<i64>, limit: Option<i64>) -> FastQueueResponse {
    match repo.list_topics(offset, limit) {
        Ok(topics) => FastQueueResponse::list(topics.iter().map(TopicOut::from).collect()),
        Err(err) => FastQueueResponse::from_error(err),
    }
}

pub fn delete_topic<R: TopicRepository>(mut repo: R, id: &str) -> FastQueueResponse {
    match repo.delete_topic(id) {
        Ok(Some(_)) => FastQueueResponse::status(Status::NoContent),
        Ok(None) => FastQueueResponse::from_error(BrokerError::NotFound),
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

    #[test]
    fn create_then_describe() {
        let repo = repo();
        let response = new_topic(repo.clone(), Ok(TopicIn { id: "t1".to_string() }));
        assert!(matches!(response, FastQueueResponse::Json(Status::Created, _)));
        let response = describe_topic(repo, "t1");
        assert!(matches!(response, FastQueueResponse::Json(Status::Ok, _)));
    }

    #[test]
    fn invalid_id_is_rejected() {
        let response = new_topic(repo(), Ok(TopicIn { id: "has space".to_string() }));
        assert!(matches!(response, FastQueueResponse::Json(Status::UnprocessableEntity, _)));
    }

    #[test]
    fn describe_missing_is_not_found() {
        let response = describe_topic(repo(), "missing");
        assert!(matches!(response, FastQueueResponse::Json(Status::NotFound, _)));
    }
}
