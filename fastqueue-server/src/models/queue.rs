use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::{
    error::{classify_write_error, BrokerError, BrokerResult},
    models::PgRepository,
    schema::queues,
};

/// A queue: a durable, consumable stream of messages subscribed to at most one topic.
#[derive(Queryable, Identifiable, Clone, Debug, PartialEq)]
#[diesel(table_name = queues)]
pub struct Queue {
    /// The queue's id.
    pub id:                        String,
    /// The topic this queue subscribes to, if any.
    pub topic_id:                  Option<String>,
    /// The dead queue messages are routed to once `message_max_deliveries` is exceeded.
    pub dead_queue_id:             Option<String>,
    /// The visibility timeout, in seconds.
    pub ack_deadline_seconds:      i32,
    /// How long a message survives before it is discarded, in seconds.
    pub message_retention_seconds: i32,
    /// Optional attribute filters a publish must satisfy to be admitted to this queue.
    pub message_filters:           Option<serde_json::Value>,
    /// Maximum delivery attempts before dead-letter migration.
    pub message_max_deliveries:    Option<i32>,
    /// Initial scheduling delay applied to newly published messages, in seconds.
    pub delivery_delay_seconds:    Option<i32>,
    /// When the queue was created.
    pub created_at:                NaiveDateTime,
    /// When the queue was last updated.
    pub updated_at:                NaiveDateTime,
}

impl Queue {
    /// Deserialize `message_filters` into the shape the filter engine consumes.
    pub fn filters(&self) -> Option<HashMap<String, HashSet<String>>> {
        self.message_filters
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = queues)]
struct QueueRow {
    id:                        String,
    topic_id:                  Option<String>,
    dead_queue_id:             Option<String>,
    ack_deadline_seconds:      i32,
    message_retention_seconds: i32,
    message_filters:           Option<serde_json::Value>,
    message_max_deliveries:    Option<i32>,
    delivery_delay_seconds:    Option<i32>,
    #[diesel(skip_update)]
    created_at:                NaiveDateTime,
    updated_at:                NaiveDateTime,
}

impl From<Queue> for QueueRow {
    fn from(queue: Queue) -> Self {
        QueueRow {
            id:                        queue.id,
            topic_id:                  queue.topic_id,
            dead_queue_id:             queue.dead_queue_id,
            ack_deadline_seconds:      queue.ack_deadline_seconds,
            message_retention_seconds: queue.message_retention_seconds,
            message_filters:           queue.message_filters,
            message_max_deliveries:    queue.message_max_deliveries,
            delivery_delay_seconds:    queue.delivery_delay_seconds,
            created_at:                queue.created_at,
            updated_at:                queue.updated_at,
        }
    }
}

/// Create, look up, list, update, and delete queues.
pub trait QueueRepository: Send {
    /// Create a new queue. Fails with `AlreadyExists` if the id is taken, or `NotFound` if
    /// `topic_id`/`dead_queue_id` reference a missing row.
    fn insert_queue(&mut self, queue: Queue) -> BrokerResult<Queue>;
    /// Look up a queue by id.
    fn find_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>>;
    /// List queues in ascending id order.
    fn list_queues(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Queue>>;
    /// Replace a queue's attributes, preserving `created_at`. Returns `None` if `id` doesn't
    /// exist.
    fn update_queue(&mut self, id: &str, update: Queue) -> BrokerResult<Option<Queue>>;
    /// Delete a queue. Its messages cascade per `messages.queue_id`'s `ON DELETE CASCADE`, and
    /// inbound `dead_queue_id` references are nulled by `queues.dead_queue_id`'s
    /// `ON DELETE SET NULL`.
    fn delete_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>>;
}

impl QueueRepository for PgRepository {
    fn insert_queue(&mut self, queue: Queue) -> BrokerResult<Queue> {
        diesel::insert_into(queues::table)
            .values(QueueRow::from(queue))
            .returning(queues::all_columns)
            .get_result(&mut self.conn)
            .map_err(classify_write_error)
    }

    fn find_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
        queues::table.find(id).first(&mut self.conn).optional().map_err(BrokerError::from)
    }

    fn list_queues(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Queue>> {
        let mut query = queues::table.order(queues::id.asc()).into_boxed();
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        query.get_results(&mut self.conn).map_err(BrokerError::from)
    }

    fn update_queue(&mut self, id: &str, update: Queue) -> BrokerResult<Option<Queue>> {
        diesel::update(queues::table.find(id))
            .set(QueueRow::from(update))
            .returning(queues::all_columns)
            .get_result(&mut self.conn)
            .optional()
            .map_err(|err| classify_write_error(err))
    }

    fn delete_queue(&mut self, id: &str) -> BrokerResult<Option<Queue>> {
        diesel::delete(queues::table.find(id))
            .returning(queues::all_columns)
            .get_result(&mut self.conn)
            .optional()
            .map_err(BrokerError::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn queue(id: &str) -> Queue {
        let now = Utc::now().naive_utc();
        Queue {
            id: id.to_string(),
            topic_id: None,
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
    fn filters_round_trip_through_json() {
        let mut q = queue("q1");
        let mut filters = HashMap::new();
        filters.insert("region".to_string(), HashSet::from(["us".to_string()]));
        q.message_filters = Some(serde_json::to_value(&filters).unwrap());
        assert_eq!(q.filters(), Some(filters));
    }

    #[test]
    fn no_filters_is_none() {
        assert_eq!(queue("q1").filters(), None);
    }
}
