use hyper::{
    header::{HeaderValue, CONNECTION, CONTENT_TYPE, SERVER},
    Body,
    Request,
    Response,
    Version,
};

use crate::{read_body, router::Router, Status};

/// Handle a single request using the given router.
///
/// If the given connection is `None` (the pool had none to give), a 503 is returned without
/// consulting the router. If more than `max_message_size` bytes are sent by the client, a 413
/// is returned without calling the handler.
pub async fn handle<T: Send, S: Send>(
    conn: Option<T>,
    source: S,
    router: &Router<(T, S)>,
    max_message_size: usize,
    mut req: Request<Body>,
) -> Response<Body> {
    let version = req.version();
    let mut response = if let Some(conn) = conn {
        let segments = req.uri().path().split('/');
        if let Some(handler) = router.route(req.method(), segments) {
            let body = if handler.needs_body() {
                read_body(req.body_mut(), Some(max_message_size)).await
            } else {
                Ok(Some(Vec::new()))
            };
            match body {
                Err(err) => {
                    error!("Failed to read message body: {}", err);
                    error_response(Status::InternalServerError, "Internal server error")
                },
                Ok(None) => {
                    warn!("Body was larger than max allowed size ({})", max_message_size);
                    error_response(Status::PayloadTooLarge, "Payload too large")
                },
                Ok(Some(body)) => {
                    info!("Found handler for request {} {}", req.method(), req.uri().path());
                    handler.handle((conn, source), req, body).await
                },
            }
        } else {
            warn!("No handler found for request {} {}", req.method(), req.uri().path());
            error_response(Status::NotFound, "No handler found for request")
        }
    } else {
        error!(
            "No database connection available for request {} {}",
            req.method(),
            req.uri().path()
        );
        error_response(Status::ServiceUnavailable, "Service unavailable, try again later")
    };
    response.headers_mut().insert(SERVER, HeaderValue::from_static("fastqueue"));
    if version <= Version::HTTP_11 {
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    }
    response
}

fn error_response(status: Status, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{{\"error\":\"{}\"}}", message)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *response.status_mut() = status.into();
    response
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::router::Handler;
    use async_trait::async_trait;
    use hyper::Method;

    struct EchoHandler {}

    #[async_trait]
    impl Handler<(i32, ())> for EchoHandler {
        fn needs_body(&self) -> bool {
            true
        }

        async fn handle(&self, args: (i32, ()), _: Request<Body>, body: Vec<u8>) -> Response<Body> {
            Response::new(Body::from(format!(
                "{} -> {}",
                args.0,
                String::from_utf8(body).unwrap()
            )))
        }
    }

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn no_connection_is_service_unavailable() {
        let router = Router::new_simple(Method::GET, EchoHandler {});
        let response = rt().block_on(handle(None, (), &router, 100, Request::new(Body::default())));
        assert_eq!(response.status(), 503);
    }

    #[test]
    fn body_too_large_is_413() {
        let router = Router::new_simple(Method::GET, EchoHandler {});
        let response = rt().block_on(handle(
            Some(42),
            (),
            &router,
            3,
            Request::new(Body::from("hello".to_string())),
        ));
        assert_eq!(response.status(), 413);
    }

    #[test]
    fn missing_route_is_404() {
        let response = rt().block_on(handle(
            Some(42),
            (),
            &Router::default(),
            3,
            Request::new(Body::from("hello".to_string())),
        ));
        assert_eq!(response.status(), 404);
    }

    #[test]
    fn found_handler_runs() {
        let router = Router::new_simple(Method::GET, EchoHandler {});
        let mut response = rt().block_on(handle(Some(42), (), &router, 100, Request::new(Body::default())));
        let body = rt().block_on(async { read_body(response.body_mut(), None).await.unwrap().unwrap() });
        assert_eq!(body, b"42 -> ");
    }
}
