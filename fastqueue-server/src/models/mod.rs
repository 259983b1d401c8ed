use crate::connection::DBConn;

pub mod health;
pub mod message;
pub mod queue;
pub mod topic;

/// Implements the different repository traits on top of a single pooled database connection.
pub struct PgRepository {
    conn: DBConn,
}

impl PgRepository {
    /// Create a new repository wrapping the given connection.
    pub fn new(conn: DBConn) -> Self {
        Self { conn }
    }
}

/// In-memory fakes and blanket `Arc`/`Mutex` wrapper impls of the repository traits, used by
/// route and broker unit tests without a database.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::{
        health::HealthCheckRepository,
        message::{Message, MessageRepository},
        queue::{Queue, QueueRepository},
        topic::{Topic, TopicRepository},
    };
    use crate::error::{BrokerError, BrokerResult};
    use chrono::{NaiveDateTime, Utc};
    use std::{
        cell::RefCell,
        collections::HashMap,
        sync::{Arc, Mutex},
    };
    use uuid::Uuid;

    /// An in-memory stand-in for `PgRepository`, backed by `HashMap`s behind `RefCell`s.
    pub struct TestRepo {
        health:   bool,
        topics:   RefCell<HashMap<String, Topic>>,
        queues:   RefCell<HashMap<String, Queue>>,
        messages: RefCell<HashMap<Uuid, Message>>,
    }

    impl TestRepo {
        /// Create a fresh, empty repository.
        pub fn new() -> Self {
            TestRepo {
                health:   true,
                topics:   RefCell::new(HashMap::new()),
                queues:   RefCell::new(HashMap::new()),
                messages: RefCell::new(HashMap::new()),
            }
        }

        /// Flip the result `check_health` reports.
        pub fn set_health(&mut self, health: bool) {
            self.health = health;
        }

        fn now() -> NaiveDateTime {
            Utc::now().naive_utc()
        }
    }

    impl Default for TestRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HealthCheckRepository for TestRepo {
        fn check_health(&mut self) -> bool {
            self.health
        }
    }

    impl TopicRepository for TestRepo {
        fn insert_topic(&mut self, id: &str) -> BrokerResult<Topic> {
            let mut topics = self.topics.borrow_mut();
            if topics.contains_key(id) {
                return Err(BrokerError::AlreadyExists);
            }
            let topic = Topic {
                id:         id.to_string(),
                created_at: Self::now(),
            };
            topics.insert(id.to_string(), topic.clone());
            Ok(topic)
        }

        fn find_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
            Ok(self.topics.borrow().get(id).cloned())
        }

        fn list_topics(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Topic>> {
            Ok(paginate(self.topics.borrow().values().cloned(), offset, limit))
        }

        fn delete_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
            let removed = self.topics.borrow_mut().remove(id);
            if removed.is_some() {
                for queue in self.queues.borrow_mut().values_mut() {
                    if queue.topic_id.as_deref() == Some(id) {
                        queue.topic_id = None;
                    }
                }
            }
            Ok(removed)
        }
    }

    impl QueueRepository for TestRepo {
        fn insert_queue(&mut self, queue: Queue) -> BrokerResult<Queue> {
            let mut queues = self.queues.borrow_mut();
            if queues.contains_key(&queue.id) {
                return Err(BrokerError::AlreadyExists);
            }
            if let Some(topic_id) = &queue.topic_id {
                if !self.topics.borrow().contains_key(topic_id) {
                    return Err(BrokerError::NotFound);
                }
            }
            if let Some(dead_queue_id) = &queue.dead_queue_id {
                if !queues.contains_key(dead_queue_id) {
                    return Err(BrokerError::NotFound);
                }
            }
            queues.insert(queue.id.clone(), queue.clone());
            Ok(queue)
        }

        fn find_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
            Ok(self.queues.borrow().get(id).cloned())
        }

        fn list_queues(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Queue>> {
            let mut queues: Vec<Queue> = self.queues.borrow().values().cloned().collect();
            queues.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(paginate(queues.into_iter(), offset, limit))
        }

        fn update_queue(&mut self, id: &str, mut update: Queue) -> BrokerResult<Option<Queue>> {
            if let Some(topic_id) = &update.topic_id {
                if !self.topics.borrow().contains_key(topic_id) {
                    return Err(BrokerError::NotFound);
                }
            }
            let mut queues = self.queues.borrow_mut();
            if let Some(dead_queue_id) = &update.dead_queue_id {
                if !queues.contains_key(dead_queue_id) {
                    return Err(BrokerError::NotFound);
                }
            }
            match queues.get(id) {
                None => Ok(None),
                Some(existing) => {
                    update.id = id.to_string();
                    update.created_at = existing.created_at;
                    update.updated_at = Self::now();
                    queues.insert(id.to_string(), update.clone());
                    Ok(Some(update))
                },
            }
        }

        fn delete_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
            let removed = self.queues.borrow_mut().remove(id);
            if removed.is_some() {
                self.messages.borrow_mut().retain(|_, m| m.queue_id != id);
                for queue in self.queues.borrow_mut().values_mut() {
                    if queue.dead_queue_id.as_deref() == Some(id) {
                        queue.dead_queue_id = None;
                    }
                }
            }
            Ok(removed)
        }
    }

    impl MessageRepository for TestRepo {
        fn insert_messages(&mut self, messages: Vec<Message>) -> BrokerResult<Vec<Message>> {
            let mut store = self.messages.borrow_mut();
            for message in &messages {
                store.insert(message.id, message.clone());
            }
            Ok(messages)
        }

        fn lease_messages(&mut self, queue: &Queue, limit: i64) -> BrokerResult<Vec<Message>> {
            let now = Self::now();
            let mut leased = Vec::new();
            let mut store = self.messages.borrow_mut();
            let mut candidates: Vec<Uuid> = store
                .values()
                .filter(|m| consumable(m, queue, now))
                .map(|m| m.id)
                .collect();
            candidates.sort_by_key(|id| store.get(id).unwrap().scheduled_at);
            candidates.truncate(limit.max(0) as usize);
            for id in candidates {
                let message = store.get_mut(&id).unwrap();
                message.delivery_attempts += 1;
                message.scheduled_at = now + chrono::Duration::seconds(i64::from(queue.ack_deadline_seconds));
                message.updated_at = now;
                leased.push(message.clone());
            }
            Ok(leased)
        }

        fn ack_message(&mut self, id: Uuid) -> BrokerResult<()> {
            self.messages.borrow_mut().remove(&id);
            Ok(())
        }

        fn nack_message(&mut self, id: Uuid) -> BrokerResult<()> {
            let now = Self::now();
            if let Some(message) = self.messages.borrow_mut().get_mut(&id) {
                message.scheduled_at = now;
                message.updated_at = now;
            }
            Ok(())
        }

        fn purge_queue(&mut self, queue_id: &str) -> BrokerResult<usize> {
            let mut store = self.messages.borrow_mut();
            let before = store.len();
            store.retain(|_, m| m.queue_id != queue_id);
            Ok(before - store.len())
        }

        fn redrive_queue(&mut self, source: &Queue, destination: &Queue) -> BrokerResult<usize> {
            let now = Self::now();
            let mut store = self.messages.borrow_mut();
            let ids: Vec<Uuid> = store
                .values()
                .filter(|m| consumable(m, source, now))
                .map(|m| m.id)
                .collect();
            for id in &ids {
                let message = store.get_mut(id).unwrap();
                message.queue_id = destination.id.clone();
                message.delivery_attempts = 0;
                message.expired_at = now + chrono::Duration::seconds(i64::from(destination.message_retention_seconds));
                message.scheduled_at = now
                    + chrono::Duration::seconds(i64::from(destination.delivery_delay_seconds.unwrap_or(0)));
                message.updated_at = now;
            }
            Ok(ids.len())
        }

        fn queue_stats(&mut self, queue: &Queue) -> BrokerResult<(i64, i64)> {
            let now = Self::now();
            let store = self.messages.borrow();
            let consumable: Vec<&Message> = store.values().filter(|m| consumable(m, queue, now)).collect();
            let oldest = consumable
                .iter()
                .map(|m| (now - m.created_at).num_seconds())
                .max()
                .unwrap_or(0);
            Ok((consumable.len() as i64, oldest))
        }

        fn expire_and_migrate(&mut self, queue: &Queue, dead_queue: Option<&Queue>) -> BrokerResult<(usize, usize)> {
            let now = Self::now();
            let mut store = self.messages.borrow_mut();
            let before = store.len();
            store.retain(|_, m| !(m.queue_id == queue.id && m.expired_at <= now));
            let expired = before - store.len();

            let mut migrated = 0;
            if let (Some(dead_queue), Some(max_deliveries)) = (dead_queue, queue.message_max_deliveries) {
                let ids: Vec<Uuid> = store
                    .values()
                    .filter(|m| m.queue_id == queue.id && m.delivery_attempts >= max_deliveries)
                    .map(|m| m.id)
                    .collect();
                for id in ids {
                    let message = store.get_mut(&id).unwrap();
                    message.queue_id = dead_queue.id.clone();
                    message.delivery_attempts = 0;
                    message.expired_at = now + chrono::Duration::seconds(i64::from(dead_queue.message_retention_seconds));
                    message.scheduled_at =
                        now + chrono::Duration::seconds(i64::from(dead_queue.delivery_delay_seconds.unwrap_or(0)));
                    message.updated_at = now;
                    migrated += 1;
                }
            }
            Ok((expired, migrated))
        }
    }

    fn consumable(message: &Message, queue: &Queue, now: NaiveDateTime) -> bool {
        if message.queue_id != queue.id || message.expired_at < now || message.scheduled_at > now {
            return false;
        }
        if let (Some(_), Some(max_deliveries)) = (&queue.dead_queue_id, queue.message_max_deliveries) {
            if message.delivery_attempts >= max_deliveries {
                return false;
            }
        }
        true
    }

    fn paginate<T, I: Iterator<Item = T>>(iter: I, offset: Option<i64>, limit: Option<i64>) -> Vec<T> {
        let skip = offset.unwrap_or(0).max(0) as usize;
        let take = limit.map(|l| l.max(0) as usize);
        match take {
            None => iter.skip(skip).collect(),
            Some(take) => iter.skip(skip).take(take).collect(),
        }
    }

    /// A `Source` that hands out clones of an already-constructed repository, for tests that
    /// don't need a real connection pool.
    pub struct CloneSource<R> {
        repo: R,
    }

    impl<R: Clone> CloneSource<R> {
        /// Wrap a repository so it can be handed out repeatedly by a router `Source`.
        pub fn new(repo: &R) -> Self {
            CloneSource { repo: repo.clone() }
        }
    }

    impl<R: Clone + Send> crate::connection::Source<R> for CloneSource<R> {
        fn get(&self) -> Option<R> {
            Some(self.repo.clone())
        }
    }

    impl<R: HealthCheckRepository> HealthCheckRepository for Arc<Mutex<R>> {
        fn check_health(&mut self) -> bool {
            self.lock().unwrap().check_health()
        }
    }

    impl<R: TopicRepository> TopicRepository for Arc<Mutex<R>> {
        fn insert_topic(&mut self, id: &str) -> BrokerResult<Topic> {
            self.lock().unwrap().insert_topic(id)
        }

        fn find_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
            self.lock().unwrap().find_topic(id)
        }

        fn list_topics(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Topic>> {
            self.lock().unwrap().list_topics(offset, limit)
        }

        fn delete_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
            self.lock().unwrap().delete_topic(id)
        }
    }

    impl<R: QueueRepository> QueueRepository for Arc<Mutex<R>> {
        fn insert_queue(&mut self, queue: Queue) -> BrokerResult<Queue> {
            self.lock().unwrap().insert_queue(queue)
        }

        fn find_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
            self.lock().unwrap().find_queue(id)
        }

        fn list_queues(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Queue>> {
            self.lock().unwrap().list_queues(offset, limit)
        }

        fn update_queue(&mut self, id: &str, update: Queue) -> BrokerResult<Option<Queue>> {
            self.lock().unwrap().update_queue(id, update)
        }

        fn delete_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
            self.lock().unwrap().delete_queue(id)
        }
    }

    impl<R: MessageRepository> MessageRepository for Arc<Mutex<R>> {
        fn insert_messages(&mut self, messages: Vec<Message>) -> BrokerResult<Vec<Message>> {
            self.lock().unwrap().insert_messages(messages)
        }

        fn lease_messages(&mut self, queue: &Queue, limit: i64) -> BrokerResult<Vec<Message>> {
            self.lock().unwrap().lease_messages(queue, limit)
        }

        fn ack_message(&mut self, id: Uuid) -> BrokerResult<()> {
            self.lock().unwrap().ack_message(id)
        }

        fn nack_message(&mut self, id: Uuid) -> BrokerResult<()> {
            self.lock().unwrap().nack_message(id)
        }

        fn purge_queue(&mut self, queue_id: &str) -> BrokerResult<usize> {
            self.lock().unwrap().purge_queue(queue_id)
        }

        fn redrive_queue(&mut self, source: &Queue, destination: &Queue) -> BrokerResult<usize> {
            self.lock().unwrap().redrive_queue(source, destination)
        }

        fn queue_stats(&mut self, queue: &Queue) -> BrokerResult<(i64, i64)> {
            self.lock().unwrap().queue_stats(queue)
        }

        fn expire_and_migrate(&mut self, queue: &Queue, dead_queue: Option<&Queue>) -> BrokerResult<(usize, usize)> {
            self.lock().unwrap().expire_and_migrate(queue, dead_queue)
        }
    }
}
