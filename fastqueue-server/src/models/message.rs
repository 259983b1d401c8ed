use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{
    backend::Backend,
    pg::Pg,
    prelude::*,
    query_builder::{AstPass, QueryFragment, QueryId},
    sql_types::Bool,
};
use uuid::Uuid;

use crate::{
    error::{classify_write_error, BrokerResult},
    models::{queue::Queue, PgRepository},
    schema::messages,
};

/// A single message sitting in a queue, published once and leased/acked/nacked by id.
#[derive(Queryable, Identifiable, Associations, Clone, Debug, PartialEq)]
#[diesel(belongs_to(Queue))]
#[diesel(table_name = messages)]
pub struct Message {
    pub id:                 Uuid,
    pub queue_id:           String,
    pub data:                serde_json::Value,
    pub attributes:         Option<serde_json::Value>,
    pub delivery_attempts:  i32,
    pub expired_at:         NaiveDateTime,
    pub scheduled_at:       NaiveDateTime,
    pub created_at:         NaiveDateTime,
    pub updated_at:         NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessage {
    id:                Uuid,
    queue_id:          String,
    data:              serde_json::Value,
    attributes:        Option<serde_json::Value>,
    delivery_attempts: i32,
    expired_at:        NaiveDateTime,
    scheduled_at:      NaiveDateTime,
    created_at:        NaiveDateTime,
    updated_at:        NaiveDateTime,
}

/// A single admitted publish, ready to be turned into a row in one queue.
pub struct NewMessageInput<'a> {
    pub data:       &'a serde_json::Value,
    pub attributes: Option<&'a serde_json::Value>,
}

impl Message {
    /// Build the row for a freshly admitted publish into `queue`, applying its retention window
    /// and delivery delay.
    pub fn for_queue(queue: &Queue, input: &NewMessageInput<'_>, now: NaiveDateTime) -> Message {
        let delay = Duration::seconds(i64::from(queue.delivery_delay_seconds.unwrap_or(0)));
        Message {
            id:                Uuid::new_v4(),
            queue_id:          queue.id.clone(),
            data:              input.data.clone(),
            attributes:        input.attributes.cloned(),
            delivery_attempts: 0,
            expired_at:        now + Duration::seconds(i64::from(queue.message_retention_seconds)),
            scheduled_at:      now + delay,
            created_at:        now,
            updated_at:        now,
        }
    }
}

/// Publish, lease, ack/nack, purge, redrive, and maintain messages.
pub trait MessageRepository: Send {
    /// Insert a batch of already-built messages (one queue may receive several from one publish
    /// fan-out).
    fn insert_messages(&mut self, messages: Vec<Message>) -> BrokerResult<Vec<Message>>;
    /// Lease up to `limit` consumable messages from `queue`, extending their visibility by the
    /// queue's ack deadline and incrementing their delivery count.
    fn lease_messages(&mut self, queue: &Queue, limit: i64) -> BrokerResult<Vec<Message>>;
    /// Delete a leased message by id. Idempotent: acking an already-deleted id is a no-op.
    fn ack_message(&mut self, id: Uuid) -> BrokerResult<()>;
    /// Make a leased message immediately consumable again, without touching its delivery count.
    fn nack_message(&mut self, id: Uuid) -> BrokerResult<()>;
    /// Delete every message in a queue. Returns the number removed.
    fn purge_queue(&mut self, queue_id: &str) -> BrokerResult<usize>;
    /// Move every consumable message from `source` into `destination`, resetting delivery
    /// attempts and re-applying `destination`'s retention/delay. Returns the number moved.
    fn redrive_queue(&mut self, source: &Queue, destination: &Queue) -> BrokerResult<usize>;
    /// Count consumable messages in `queue` and the age, in seconds, of the oldest one.
    fn queue_stats(&mut self, queue: &Queue) -> BrokerResult<(i64, i64)>;
    /// Delete messages in `queue` past their retention window, then migrate messages that have
    /// exhausted `queue.message_max_deliveries` into `dead_queue`, if configured. Returns
    /// `(expired, migrated)`.
    fn expire_and_migrate(&mut self, queue: &Queue, dead_queue: Option<&Queue>) -> BrokerResult<(usize, usize)>;
}

impl MessageRepository for PgRepository {
    fn insert_messages(&mut self, messages: Vec<Message>) -> BrokerResult<Vec<Message>> {
        let rows: Vec<NewMessage> = messages
            .into_iter()
            .map(|m| NewMessage {
                id:                m.id,
                queue_id:          m.queue_id,
                data:              m.data,
                attributes:        m.attributes,
                delivery_attempts: m.delivery_attempts,
                expired_at:        m.expired_at,
                scheduled_at:      m.scheduled_at,
                created_at:        m.created_at,
                updated_at:        m.updated_at,
            })
            .collect();
        diesel::insert_into(messages::table)
            .values(rows)
            .returning(messages::all_columns)
            .get_results(&mut self.conn)
            .map_err(classify_write_error)
    }

    fn lease_messages(&mut self, queue: &Queue, limit: i64) -> BrokerResult<Vec<Message>> {
        let now = Utc::now().naive_utc();
        let extended_until = now + Duration::seconds(i64::from(queue.ack_deadline_seconds));
        let leased: Vec<Message> = diesel::update(messages::table)
            .set((
                messages::scheduled_at.eq(extended_until),
                messages::delivery_attempts.eq(messages::delivery_attempts + 1),
                messages::updated_at.eq(now),
            ))
            .filter(In::new(
                messages::id,
                LeasableMessageIds::new(queue, now, limit),
            ))
            .returning(messages::all_columns)
            .get_results(&mut self.conn)?;
        Ok(leased)
    }

    fn ack_message(&mut self, id: Uuid) -> BrokerResult<()> {
        diesel::delete(messages::table.filter(messages::id.eq(id))).execute(&mut self.conn)?;
        Ok(())
    }

    fn nack_message(&mut self, id: Uuid) -> BrokerResult<()> {
        let now = Utc::now().naive_utc();
        diesel::update(messages::table.filter(messages::id.eq(id)))
            .set((messages::scheduled_at.eq(now), messages::updated_at.eq(now)))
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn purge_queue(&mut self, queue_id: &str) -> BrokerResult<usize> {
        Ok(diesel::delete(messages::table.filter(messages::queue_id.eq(queue_id))).execute(&mut self.conn)?)
    }

    fn redrive_queue(&mut self, source: &Queue, destination: &Queue) -> BrokerResult<usize> {
        let now = Utc::now().naive_utc();
        let expired_at = now + Duration::seconds(i64::from(destination.message_retention_seconds));
        let scheduled_at = now + Duration::seconds(i64::from(destination.delivery_delay_seconds.unwrap_or(0)));
        let max_deliveries = match &source.dead_queue_id {
            Some(_) => source.message_max_deliveries,
            None => None,
        };
        let mut filter = messages::table
            .filter(
                messages::queue_id
                    .eq(&source.id)
                    .and(messages::expired_at.ge(now))
                    .and(messages::scheduled_at.le(now)),
            )
            .into_boxed();
        if let Some(max_deliveries) = max_deliveries {
            filter = filter.filter(messages::delivery_attempts.lt(max_deliveries));
        }
        let ids: Vec<Uuid> = filter.select(messages::id).get_results(&mut self.conn)?;
        let moved = diesel::update(messages::table.filter(messages::id.eq_any(ids)))
            .set((
                messages::queue_id.eq(&destination.id),
                messages::delivery_attempts.eq(0),
                messages::expired_at.eq(expired_at),
                messages::scheduled_at.eq(scheduled_at),
                messages::updated_at.eq(now),
            ))
            .execute(&mut self.conn)?;
        Ok(moved)
    }

    fn queue_stats(&mut self, queue: &Queue) -> BrokerResult<(i64, i64)> {
        let now = Utc::now().naive_utc();
        let max_deliveries = match &queue.dead_queue_id {
            Some(_) => queue.message_max_deliveries,
            None => None,
        };

        let mut count_query = messages::table
            .filter(
                messages::queue_id
                    .eq(&queue.id)
                    .and(messages::expired_at.ge(now))
                    .and(messages::scheduled_at.le(now)),
            )
            .into_boxed();
        let mut oldest_query = messages::table
            .filter(
                messages::queue_id
                    .eq(&queue.id)
                    .and(messages::expired_at.ge(now))
                    .and(messages::scheduled_at.le(now)),
            )
            .into_boxed();
        if let Some(max_deliveries) = max_deliveries {
            count_query = count_query.filter(messages::delivery_attempts.lt(max_deliveries));
            oldest_query = oldest_query.filter(messages::delivery_attempts.lt(max_deliveries));
        }

        let count: i64 = count_query.count().get_result(&mut self.conn)?;
        let oldest: Option<NaiveDateTime> = oldest_query
            .select(messages::created_at)
            .order(messages::created_at.asc())
            .first(&mut self.conn)
            .optional()?;
        let oldest_age = oldest.map(|created| (now - created).num_seconds()).unwrap_or(0);
        Ok((count, oldest_age))
    }

    fn expire_and_migrate(&mut self, queue: &Queue, dead_queue: Option<&Queue>) -> BrokerResult<(usize, usize)> {
        let now = Utc::now().naive_utc();
        let expired = diesel::delete(
            messages::table.filter(messages::queue_id.eq(&queue.id).and(messages::expired_at.lt(now))),
        )
        .execute(&mut self.conn)?;

        let migrated = match (dead_queue, queue.message_max_deliveries) {
            (Some(dead_queue), Some(max_deliveries)) => {
                let expired_at = now + Duration::seconds(i64::from(dead_queue.message_retention_seconds));
                let scheduled_at = now + Duration::seconds(i64::from(dead_queue.delivery_delay_seconds.unwrap_or(0)));
                diesel::update(
                    messages::table.filter(
                        messages::queue_id
                            .eq(&queue.id)
                            .and(messages::delivery_attempts.ge(max_deliveries)),
                    ),
                )
                .set((
                    messages::queue_id.eq(&dead_queue.id),
                    messages::delivery_attempts.eq(0),
                    messages::expired_at.eq(expired_at),
                    messages::scheduled_at.eq(scheduled_at),
                    messages::updated_at.eq(now),
                ))
                .execute(&mut self.conn)?
            },
            _ => 0,
        };
        Ok((expired, migrated))
    }
}

/// The subquery behind `lease_messages`: selects up to `limit` ids consumable right now, ordered
/// oldest-scheduled first, locking the rows for update and skipping any a concurrent leaser
/// already holds.
struct LeasableMessageIds<'a> {
    queue_id:         &'a str,
    now:              NaiveDateTime,
    max_deliveries:   Option<i32>,
    limit:            i64,
}

impl<'a> LeasableMessageIds<'a> {
    fn new(queue: &'a Queue, now: NaiveDateTime, limit: i64) -> Self {
        let max_deliveries = match &queue.dead_queue_id {
            Some(_) => queue.message_max_deliveries,
            None => None,
        };
        LeasableMessageIds {
            queue_id: &queue.id,
            now,
            max_deliveries,
            limit,
        }
    }
}

impl<'a> QueryId for LeasableMessageIds<'a> {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<'a> QueryFragment<Pg> for LeasableMessageIds<'a> {
    fn walk_ast(&self, mut out: AstPass<'_, '_, Pg>) -> QueryResult<()> {
        let mut sub_query = messages::table
            .select(messages::id)
            .filter(
                messages::queue_id
                    .eq(self.queue_id)
                    .and(messages::expired_at.ge(self.now))
                    .and(messages::scheduled_at.le(self.now)),
            )
            .into_boxed();
        if let Some(max_deliveries) = self.max_deliveries {
            sub_query = sub_query.filter(messages::delivery_attempts.lt(max_deliveries));
        }
        let sub_query = sub_query
            .order(messages::scheduled_at.asc())
            .limit(self.limit)
            .for_update()
            .skip_locked();
        out.push_sql("(");
        sub_query.walk_ast(out.reborrow())?;
        out.push_sql(")");
        Ok(())
    }
}

impl<'a> Expression for LeasableMessageIds<'a> {
    type SqlType = <messages::columns::id as Expression>::SqlType;
}

impl<'a> AppearsOnTable<messages::table> for LeasableMessageIds<'a> {
}

struct In<F, V> {
    field:  F,
    values: V,
}

impl<F, V> In<F, V> {
    fn new(field: F, values: V) -> In<F, V> {
        In { field, values }
    }
}

impl<F, V, T> Expression for In<F, V>
where
    F: Expression<SqlType = T>,
    V: Expression<SqlType = T>,
{
    type SqlType = Bool;
}

impl<F, V> QueryId for In<F, V> {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<F, V, DB> QueryFragment<DB> for In<F, V>
where
    DB: Backend,
    F: QueryFragment<DB>,
    V: QueryFragment<DB>,
{
    fn walk_ast<'a>(&'a self, mut out: AstPass<'a, 'a, DB>) -> QueryResult<()> {
        self.field.walk_ast(out.reborrow())?;
        out.push_sql(" IN ");
        self.values.walk_ast(out.reborrow())?;
        Ok(())
    }
}

impl<F, V, T, Table> AppearsOnTable<Table> for In<F, V>
where
    F: Expression<SqlType = T> + AppearsOnTable<Table>,
    V: Expression<SqlType = T> + AppearsOnTable<Table>,
{
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

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
            delivery_delay_seconds: Some(5),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn for_queue_applies_delay_and_retention() {
        let q = queue("q1");
        let now = Utc::now().naive_utc();
        let input = NewMessageInput {
            data: &serde_json::json!({"hello": "world"}),
            attributes: None,
        };
        let message = Message::for_queue(&q, &input, now);
        assert_eq!(message.queue_id, "q1");
        assert_eq!(message.delivery_attempts, 0);
        assert_eq!(message.scheduled_at, now + Duration::seconds(5));
        assert_eq!(message.expired_at, now + Duration::seconds(600));
    }
}
