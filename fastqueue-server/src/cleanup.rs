use std::time::Duration as StdDuration;

use crate::{
    connection::Pool,
    error::BrokerResult,
    models::{message::MessageRepository, queue::QueueRepository, PgRepository},
};

/// Spawn the periodic job that expires and dead-letters messages in every queue.
///
/// One task runs per server process. Running more than one worker against the same database
/// without an external mutual-exclusion mechanism duplicates this work harmlessly (the
/// underlying deletes/updates are idempotent) but wastes cycles; see the deployment notes for the
/// single-instance recommendation.
pub fn spawn(pool: Pool, interval: StdDuration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            run_once(&pool).await;
        }
    });
}

async fn run_once(pool: &Pool) {
    let pool = pool.clone();
    match tokio::task::spawn_blocking(move || sweep(&pool)).await {
        Ok(Ok((expired, migrated))) => {
            if expired > 0 || migrated > 0 {
                info!("cleanup: expired {} messages, migrated {} to dead queues", expired, migrated);
            }
        },
        Ok(Err(err)) => error!("cleanup: sweep failed: {}", err),
        Err(err) => error!("cleanup: task panicked: {}", err),
    }
}

fn sweep(pool: &Pool) -> BrokerResult<(usize, usize)> {
    let conn = match pool.get() {
        Ok(conn) => conn,
        Err(err) => {
            warn!("cleanup: could not check out a connection: {}", err);
            return Ok((0, 0));
        },
    };
    let mut repo = PgRepository::new(conn);

    let mut total_expired = 0;
    let mut total_migrated = 0;
    let queues = repo.list_queues(None, None)?;
    for queue in &queues {
        let dead_queue = match &queue.dead_queue_id {
            Some(dead_queue_id) => repo.find_queue(dead_queue_id)?,
            None => None,
        };
        match repo.expire_and_migrate(queue, dead_queue.as_ref()) {
            Ok((expired, migrated)) => {
                total_expired += expired;
                total_migrated += migrated;
            },
            Err(err) => warn!("cleanup: queue {} failed: {}", queue.id, err),
        }
    }
    Ok((total_expired, total_migrated))
}

#[cfg(test)]
mod test {
    use crate::models::{queue::QueueRepository, test_support::TestRepo};

    #[test]
    fn empty_repository_has_no_queues_to_sweep() {
        let mut repo = TestRepo::new();
        assert_eq!(repo.list_queues(None, None).unwrap().len(), 0);
    }
}
