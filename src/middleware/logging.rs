use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::{
    fmt,
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info};
use uuid::Uuid;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation id, assigned by [`RequestLogging`].
///
/// Handlers take it as an extractor. Outside the middleware (a bare test
/// app) a fresh id is generated instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromRequest for RequestId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let id = req
            .extensions()
            .get::<RequestId>()
            .copied()
            .unwrap_or_else(|| RequestId(Uuid::new_v4()));
        ready(Ok(id))
    }
}

/// Logs every request with its id and timing, and echoes the id back in the
/// `x-request-id` response header.
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = RequestId(Uuid::new_v4());
        req.extensions_mut().insert(request_id);

        let method = req.method().to_string();
        let path = req.path().to_string();
        let remote_addr = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            remote_addr = %remote_addr,
            "Request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration = start_time.elapsed();

            match result {
                Ok(mut response) => {
                    info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms = duration.as_millis() as u64,
                        "Request completed"
                    );

                    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        duration_ms = duration.as_millis() as u64,
                        error = %err,
                        "Request failed"
                    );
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn echo_id(id: RequestId) -> HttpResponse {
        HttpResponse::Ok().body(id.to_string())
    }

    #[actix_web::test]
    async fn test_request_id_header_matches_extractor() {
        let app = test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/", web::get().to(echo_id)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let header = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = test::read_body(resp).await;

        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(body, header.as_bytes());
    }

    #[actix_web::test]
    async fn test_request_ids_are_unique() {
        let app = test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/", web::get().to(echo_id)),
        )
        .await;

        let first = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let second = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

        assert_ne!(
            first.headers().get(REQUEST_ID_HEADER),
            second.headers().get(REQUEST_ID_HEADER)
        );
    }

    #[actix_web::test]
    async fn test_header_present_on_error_responses() {
        let app = test::init_service(App::new().wrap(RequestLogging)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    }
}
