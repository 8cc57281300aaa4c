use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower_service::Service;
use tracing::warn;

use strata::{CacheMetrics, KvStore};
use strata_http::{Lookup, PageResponse, RequestContext};

use crate::PageControl;
use crate::layer::Shared;

pub struct PageCacheMiddleware<I, S, M> {
    inner: I,
    shared: Arc<Shared<S, M>>,
}

impl<I, S, M> PageCacheMiddleware<I, S, M> {
    pub(crate) fn new(inner: I, shared: Arc<Shared<S, M>>) -> Self {
        Self { inner, shared }
    }
}

impl<I: Clone, S, M> Clone for PageCacheMiddleware<I, S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<I, S, M> Service<Request<Body>> for PageCacheMiddleware<I, S, M>
where
    I: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    I::Future: Send + 'static,
    I::Error: Send + 'static,
    S: KvStore,
    M: CacheMetrics,
{
    type Response = Response<Body>;
    type Error = I::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let shared = self.shared.clone();

        Box::pin(async move {
            let Some(engine) = shared.engine().await else {
                return inner.call(request).await;
            };

            let context = RequestContext::from_request(&request);
            let mut pending = match engine.lookup(&context).await {
                Lookup::Cached(page) => return Ok(into_response(page)),
                Lookup::Render(pending) => pending,
            };

            let control = PageControl::default();
            request.extensions_mut().insert(control.clone());

            let response = match inner.call(request).await {
                Ok(response) => response,
                Err(err) => {
                    engine.abandon(pending).await;
                    return Err(err);
                }
            };

            let (mut parts, body) = response.into_parts();
            let body = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(target: "strata", error = %err, "response body unreadable");
                    engine.abandon(pending).await;
                    return Ok(Response::from_parts(parts, Body::empty()));
                }
            };

            control.apply(&mut pending);
            let page = PageResponse::new(parts.status, std::mem::take(&mut parts.headers), body);
            let page = engine.capture(pending, page).await;

            parts.status = page.status;
            parts.headers = page.headers;
            Ok(Response::from_parts(parts, Body::from(page.body)))
        })
    }
}

fn into_response(page: PageResponse) -> Response<Body> {
    page.into_response().map(Body::from)
}
