use std::future::Future;

use botstream_payload::{ReceiveRequest, StreamingResponse};
use futures_util::future::BoxFuture;
use uuid::Uuid;

/// Application capability that answers incoming requests.
///
/// Each request is processed on its own task; the returned response is sent
/// back under the request's correlation id.
pub trait RequestHandler: Send + Sync + 'static {
    fn process_request(&self, id: Uuid, request: ReceiveRequest) -> BoxFuture<'_, StreamingResponse>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Uuid, ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StreamingResponse> + Send + 'static,
{
    fn process_request(&self, id: Uuid, request: ReceiveRequest) -> BoxFuture<'_, StreamingResponse> {
        Box::pin(self(id, request))
    }
}
