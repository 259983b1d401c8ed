use fastqueue_common::router::{Router, WildcardRouter};
use hyper::Method;
use std::sync::Arc;

use crate::{
    config::Config,
    connection::Source,
    models::{health::HealthCheckRepository, message::MessageRepository, queue::QueueRepository, topic::TopicRepository},
    router::{
        health::HealthHandler,
        messages::{AckMessageHandler, NackMessageHandler, PublishMessagesHandler},
        queues::{
            DeleteQueueHandler, DescribeQueueHandler, LeaseMessagesHandler, ListQueuesHandler, NewQueueHandler,
            PurgeQueueHandler, QueueStatsHandler, RedriveQueueHandler, UpdateQueueHandler,
        },
        topics::{DeleteTopicHandler, DescribeTopicHandler, ListTopicsHandler, NewTopicHandler},
    },
};

mod health;
mod messages;
mod queues;
mod topics;

struct TopicsSubRouter;

impl<R: TopicRepository + QueueRepository + MessageRepository, S: Source<R>> WildcardRouter<(R, S)> for TopicsSubRouter {
    fn with_segment(&self, segment: &str) -> Router<(R, S)> {
        Router::new()
            .with_handler(Method::GET, DescribeTopicHandler {
                topic_id: segment.to_string(),
            })
            .with_handler(Method::DELETE, DeleteTopicHandler {
                topic_id: segment.to_string(),
            })
            .with_route(
                "messages",
                Router::new_simple(Method::POST, PublishMessagesHandler {
                    topic_id: segment.to_string(),
                }),
            )
    }
}

struct QueuesSubRouter {
    config: Arc<Config>,
}

impl<R: QueueRepository + MessageRepository, S: Source<R>> WildcardRouter<(R, S)> for QueuesSubRouter {
    fn with_segment(&self, segment: &str) -> Router<(R, S)> {
        Router::new()
            .with_handler(Method::GET, DescribeQueueHandler {
                queue_id: segment.to_string(),
            })
            .with_handler(Method::PUT, UpdateQueueHandler {
                queue_id: segment.to_string(),
                config:   self.config.clone(),
            })
            .with_handler(Method::DELETE, DeleteQueueHandler {
                queue_id: segment.to_string(),
            })
            .with_route(
                "stats",
                Router::new_simple(Method::GET, QueueStatsHandler {
                    queue_id: segment.to_string(),
                }),
            )
            .with_route(
                "purge",
                Router::new_simple(Method::PUT, PurgeQueueHandler {
                    queue_id: segment.to_string(),
                }),
            )
            .with_route(
                "redrive",
                Router::new_simple(Method::PUT, RedriveQueueHandler {
                    queue_id: segment.to_string(),
                }),
            )
            .with_route(
                "messages",
                Router::new_simple(Method::GET, LeaseMessagesHandler {
                    queue_id: segment.to_string(),
                }),
            )
    }
}

struct MessagesSubRouter;

impl<R: MessageRepository, S: Source<R>> WildcardRouter<(R, S)> for MessagesSubRouter {
    fn with_segment(&self, segment: &str) -> Router<(R, S)> {
        Router::new()
            .with_route(
                "ack",
                Router::new_simple(Method::PUT, AckMessageHandler {
                    message_id: segment.to_string(),
                }),
            )
            .with_route(
                "nack",
                Router::new_simple(Method::PUT, NackMessageHandler {
                    message_id: segment.to_string(),
                }),
            )
    }
}

/// Build the full HTTP routing table.
pub fn make_router<R: TopicRepository + QueueRepository + MessageRepository + HealthCheckRepository, S: Source<R>>(
    config: Arc<Config>,
) -> Router<(R, S)> {
    Router::new()
        .with_route_simple("health", Method::GET, HealthHandler)
        .with_route(
            "topics",
            Router::new()
                .with_handler(Method::POST, NewTopicHandler)
                .with_handler(Method::GET, ListTopicsHandler)
                .with_wildcard(TopicsSubRouter),
        )
        .with_route(
            "queues",
            Router::new()
                .with_handler(Method::GET, ListQueuesHandler)
                .with_handler(Method::POST, NewQueueHandler { config: config.clone() })
                .with_wildcard(QueuesSubRouter { config }),
        )
        .with_route("messages", Router::new().with_wildcard(MessagesSubRouter))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::test_support::{CloneSource, TestRepo};
    use fastqueue_common::{router::Handler, test_support::read_body, Status, TopicIn};
    use hyper::{Request, Response, StatusCode};
    use std::sync::{Arc as StdArc, Mutex};

    fn config() -> Arc<Config> {
        StdArc::new(Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 7843,
            server_num_workers: 1,
            queue_cleanup_interval_seconds: 60,
            ack_deadline_range: crate::config::Range { min: 1, max: 600 },
            message_retention_range: crate::config::Range { min: 600, max: 1_209_600 },
            message_max_deliveries_range: crate::config::Range { min: 1, max: 1000 },
            delivery_delay_range: crate::config::Range { min: 1, max: 900 },
            enable_prometheus_metrics: false,
            database_url: "postgres://localhost/fastqueue_test".to_string(),
            min_pool_size: 1,
            max_pool_size: 1,
        })
    }

    fn run_handler<R: Clone + Send>(handler: StdArc<dyn Handler<(R, CloneSource<R>)>>, repo: &R, body: Vec<u8>) -> Response<Body> {
        fastqueue_common::test_support::make_runtime().block_on(async {
            handler
                .handle((repo.clone(), CloneSource::new(repo)), Request::new(Body::default()), body)
                .await
        })
    }

    #[test]
    fn health_route_exists() {
        let repo = StdArc::new(Mutex::new(TestRepo::new()));
        let router = make_router::<StdArc<Mutex<TestRepo>>, CloneSource<StdArc<Mutex<TestRepo>>>>(config());
        let handler = router.route(&Method::GET, vec!["health"].into_iter());
        assert!(handler.is_some());
        let mut response = run_handler(handler.unwrap(), &repo, Vec::new());
        assert_eq!(response.status(), StatusCode::from(Status::Ok));
        assert_eq!(read_body(response.body_mut()), b"green");
    }

    #[test]
    fn topic_create_and_fan_out() {
        let repo = StdArc::new(Mutex::new(TestRepo::new()));
        let router = make_router::<StdArc<Mutex<TestRepo>>, CloneSource<StdArc<Mutex<TestRepo>>>>(config());

        let create = router.route(&Method::POST, vec!["topics"].into_iter()).unwrap();
        let response = run_handler(create, &repo, serde_json::to_vec(&TopicIn { id: "t1".to_string() }).unwrap());
        assert_eq!(response.status(), StatusCode::from(Status::Created));

        let create_queue = router.route(&Method::POST, vec!["queues"].into_iter()).unwrap();
        let body = serde_json::json!({
            "id": "q1",
            "topic_id": "t1",
            "dead_queue_id": null,
            "ack_deadline_seconds": 30,
            "message_retention_seconds": 600,
            "message_filters": null,
            "message_max_deliveries": null,
            "delivery_delay_seconds": null,
        });
        let response = run_handler(create_queue, &repo, serde_json::to_vec(&body).unwrap());
        assert_eq!(response.status(), StatusCode::from(Status::Created));

        let publish = router.route(&Method::POST, vec!["topics", "t1", "messages"].into_iter()).unwrap();
        let mut response = run_handler(
            publish,
            &repo,
            serde_json::to_vec(&serde_json::json!({"data": {"k": 1}})).unwrap(),
        );
        assert_eq!(response.status(), StatusCode::from(Status::Created));
        let body = read_body(response.body_mut());
        assert!(String::from_utf8(body).unwrap().contains("\"k\":1"));

        let lease = router.route(&Method::GET, vec!["queues", "q1", "messages"].into_iter()).unwrap();
        let mut response = run_handler(lease, &repo, Vec::new());
        assert_eq!(response.status(), StatusCode::from(Status::Ok));
        let body = String::from_utf8(read_body(response.body_mut())).unwrap();
        assert!(body.contains("\"k\":1"));
    }

    #[test]
    fn ack_missing_message_is_still_success() {
        let repo = StdArc::new(Mutex::new(TestRepo::new()));
        let router = make_router::<StdArc<Mutex<TestRepo>>, CloneSource<StdArc<Mutex<TestRepo>>>>(config());
        let handler = router
            .route(&Method::PUT, vec!["messages", "00000000-0000-0000-0000-000000000000", "ack"].into_iter())
            .unwrap();
        let response = run_handler(handler, &repo, Vec::new());
        assert_eq!(response.status(), StatusCode::from(Status::NoContent));
    }
}
