use hyper::{Body, Request};
use std::future::Future;
use uuid::Uuid;

use crate::TRACE_ID_HEADER;

tokio::task_local! {
    static TRACE_ID: Uuid;
}

/// Read the trace id of the currently running request, if any.
pub fn get_trace_id() -> Option<Uuid> {
    TRACE_ID.try_with(|trace_id| *trace_id).ok()
}

/// Run `f` with `id` set as the trace id of the current task.
pub async fn with_trace_id<F: Future>(id: Uuid, f: F) -> F::Output {
    TRACE_ID.scope(id, f).await
}

/// Extract a trace id from the `x-trace-id` header, or create a fresh one.
pub fn create_trace_id(req: &Request<Body>) -> Uuid {
    TRACE_ID_HEADER.get(req.headers()).unwrap_or_else(Uuid::new_v4)
}

#[cfg(test)]
mod test {
    use super::*;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn get_without_task() {
        assert_eq!(get_trace_id(), None);
    }

    #[test]
    fn get_in_task() {
        rt().block_on(async {
            let id = Uuid::new_v4();
            assert_eq!(get_trace_id(), None);
            with_trace_id(id, async move {
                assert_eq!(get_trace_id(), Some(id));
            })
            .await;
        });
    }
}
