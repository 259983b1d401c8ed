use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::{
    error::{classify_write_error, BrokerError, BrokerResult},
    models::PgRepository,
    schema::topics,
};

#[derive(Insertable)]
#[diesel(table_name = topics)]
struct NewTopic<'a> {
    id:         &'a str,
    created_at: NaiveDateTime,
}

/// A topic: the fan-out point publishers write to and queues subscribe to.
#[derive(Queryable, Identifiable, Clone, Debug, PartialEq)]
#[diesel(table_name = topics)]
pub struct Topic {
    /// The topic's id.
    pub id:         String,
    /// When the topic was created.
    pub created_at: NaiveDateTime,
}

/// Create, look up, list, and delete topics.
pub trait TopicRepository: Send {
    /// Create a new topic. Fails with `AlreadyExists` if the id is taken.
    fn insert_topic(&mut self, id: &str) -> BrokerResult<Topic>;
    /// Look up a topic by id.
    fn find_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>>;
    /// List topics in ascending id order.
    fn list_topics(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Topic>>;
    /// Delete a topic. Subscribing queues' `topic_id` is nulled by the `ON DELETE SET NULL`
    /// foreign-key action on `queues.topic_id`.
    fn delete_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>>;
}

impl TopicRepository for PgRepository {
    fn insert_topic(&mut self, id: &str) -> BrokerResult<Topic> {
        diesel::insert_into(topics::table)
            .values(NewTopic {
                id,
                created_at: Utc::now().naive_utc(),
            })
            .returning(topics::all_columns)
            .get_result(&mut self.conn)
            .map_err(classify_write_error)
    }

    fn find_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
        topics::table
            .find(id)
            .first(&mut self.conn)
            .optional()
            .map_err(BrokerError::from)
    }

    fn list_topics(&mut self, offset: Option<i64>, limit: Option<i64>) -> BrokerResult<Vec<Topic>> {
        let mut query = topics::table.order(topics::id.asc()).into_boxed();
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        query.get_results(&mut self.conn).map_err(BrokerError::from)
    }

    fn delete_topic(&mut self, id: &str) -> BrokerResult<Option<Topic>> {
        diesel::delete(topics::table.find(id))
            .returning(topics::all_columns)
            .get_result(&mut self.conn)
            .optional()
            .map_err(BrokerError::from)
    }
}
