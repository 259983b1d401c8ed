use fastqueue_common::{ErrorResponse, Status};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    Body,
};
use serde::Serialize;

use crate::error::{error_status, BrokerError};

pub mod messages;
pub mod queues;
pub mod topics;

/// The outcome of a route's business logic, translated into a hyper response exactly once.
#[derive(Debug)]
pub enum FastQueueResponse {
    /// A bare status code, no body.
    Status(Status),
    /// A status code with a JSON body already serialized.
    Json(Status, String),
}

impl FastQueueResponse {
    pub(crate) const fn status(status: Status) -> Self {
        Self::Status(status)
    }

    pub(crate) fn json<T: Serialize>(status: Status, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(json) => Self::Json(status, json),
            Err(err) => {
                error!("failed to serialize json response: {}", err);
                Self::Status(Status::InternalServerError)
            },
        }
    }

    pub(crate) fn list<T: Serialize>(data: Vec<T>) -> Self {
        Self::json(Status::Ok, &fastqueue_common::ListResponse { data })
    }

    pub(crate) fn from_error(err: BrokerError) -> Self {
        let status = error_status(&err);
        Self::json(status, &ErrorResponse { error: err.to_string() })
    }

    pub(crate) fn into_response(self) -> hyper::Response<Body> {
        match self {
            Self::Status(status) => {
                let mut res = hyper::Response::new(Body::default());
                *res.status_mut() = status.into();
                res
            },
            Self::Json(status, body) => {
                let mut res = hyper::Response::new(Body::from(body));
                *res.status_mut() = status.into();
                res.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                res
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_response_has_no_body() {
        let mut response = FastQueueResponse::status(Status::NoContent).into_response();
        assert_eq!(response.status().as_u16(), Status::NoContent as u16);
        assert!(response.headers().is_empty());
        assert_eq!(
            fastqueue_common::test_support::read_body(response.body_mut()),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn json_response_has_content_type() {
        let mut response = FastQueueResponse::json(Status::Ok, &ErrorResponse { error: "x".to_string() }).into_response();
        assert_eq!(response.status().as_u16(), Status::Ok as u16);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            HeaderValue::from_static("application/json")
        );
        assert_eq!(
            fastqueue_common::test_support::read_body(response.body_mut()),
            "{\"error\":\"x\"}".as_bytes().to_vec()
        );
    }
}
