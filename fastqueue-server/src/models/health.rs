use diesel::{prelude::*, sql_types::Int4};

use crate::models::PgRepository;

#[derive(QueryableByName)]
struct Health {
    #[diesel(sql_type = Int4)]
    response: i32,
}

/// A lightweight liveness probe, backed by a trivial round trip to the store.
pub trait HealthCheckRepository: Send {
    /// `true` if the store answered a trivial query.
    fn check_health(&mut self) -> bool;
}

impl HealthCheckRepository for PgRepository {
    fn check_health(&mut self) -> bool {
        let responses: Result<Vec<Health>, _> = diesel::sql_query("select 1 as response").load(&mut self.conn);
        match responses {
            Ok(response) => response.len() == 1 && response[0].response == 1,
            Err(_err) => false,
        }
    }
}
