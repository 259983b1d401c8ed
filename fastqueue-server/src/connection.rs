use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, Pool as DieselPool, PooledConnection},
};
use r2d2::{
    event::{AcquireEvent, CheckinEvent, CheckoutEvent, ReleaseEvent, TimeoutEvent},
    Builder,
    Error,
    HandleError,
    HandleEvent,
};
use std::{fmt::Display, time::Duration};

use crate::config::Config;

/// Type alias for our database connection pool type.
pub type Pool = DieselPool<ConnectionManager<PgConnection>>;

/// Type alias for our database connection type.
pub type DBConn = PooledConnection<ConnectionManager<PgConnection>>;

fn init_pool_builder(config: &Config) -> (Builder<ConnectionManager<PgConnection>>, u16) {
    let pool_builder = Pool::builder()
        .min_idle(Some(u32::from(config.min_pool_size)))
        .max_size(u32::from(config.max_pool_size))
        .connection_timeout(Duration::from_secs(1))
        .event_handler(Box::new(ConnectionHandler::new()))
        .error_handler(Box::new(ConnectionHandler::new()));

    (pool_builder, config.max_pool_size)
}

/// Create a new database pool, sized and pointed at the database from `config`, and connect the
/// minimum required amount of connections.
pub fn init_pool_maybe(config: &Config) -> Result<(Pool, u16), Error> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let (pool_builder, max_size) = init_pool_builder(config);
    let pool = pool_builder.build(manager)?;

    Ok((pool, max_size))
}

#[derive(Debug)]
struct ConnectionHandler {}

impl ConnectionHandler {
    fn new() -> Self {
        ConnectionHandler {}
    }
}

impl HandleEvent for ConnectionHandler {
    fn handle_acquire(&self, event: AcquireEvent) {
        debug!("Acquired new connection {}", event.connection_id());
    }

    fn handle_release(&self, event: ReleaseEvent) {
        debug!("Released connection {}", event.connection_id());
    }

    fn handle_checkout(&self, event: CheckoutEvent) {
        debug!("Checked out connection {}", event.connection_id());
    }

    fn handle_timeout(&self, event: TimeoutEvent) {
        warn!(
            "Getting a connection from the pool timed out after {}ms",
            event.timeout().as_millis()
        );
    }

    fn handle_checkin(&self, event: CheckinEvent) {
        debug!("Returned connection {}", event.connection_id());
    }
}

impl<E: Display> HandleError<E> for ConnectionHandler {
    fn handle_error(&self, error: E) {
        error!("Connection error: {}", error);
    }
}

/// A `Source` can be used to get (potentially) scarce resources like database connections.
pub trait Source<R>: Send {
    /// Get a resource from a `Source`.
    fn get(&self) -> Option<R>;
}

impl Source<DBConn> for Pool {
    fn get(&self) -> Option<DBConn> {
        DieselPool::get(self).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Range;

    fn config(min_pool_size: u16, max_pool_size: u16) -> Config {
        Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 7843,
            server_num_workers: 1,
            queue_cleanup_interval_seconds: 60,
            ack_deadline_range: Range { min: 1, max: 600 },
            message_retention_range: Range { min: 600, max: 1_209_600 },
            message_max_deliveries_range: Range { min: 1, max: 1000 },
            delivery_delay_range: Range { min: 1, max: 900 },
            enable_prometheus_metrics: false,
            database_url: "postgres://localhost/fastqueue_test".to_string(),
            min_pool_size,
            max_pool_size,
        }
    }

    #[test]
    fn builder_is_sized_from_config() {
        let (_builder, max_size) = init_pool_builder(&config(20, 50));
        assert_eq!(max_size, 50);
    }
}
