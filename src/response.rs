//! The response returned to the caller of an exchange

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{error::Error, event::Event, exchange::Exchange};

/// The outcome of one request/response exchange.
///
/// The body is either fully buffered, in which case it can be read any
/// number of times, or — when the request opted into streaming — a lazy,
/// single-pass sequence of chunks pulled while the application task keeps
/// running. A streamed body can be consumed at most once; whole-body
/// accessors fail once any chunk has been pulled, and pulling past
/// exhaustion yields nothing without blocking.
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Buffered { bytes: Bytes, read: bool },
    Streaming { exchange: Exchange, consumed: bool },
    Exhausted,
}

impl TestResponse {
    pub(crate) fn buffered(status: StatusCode, headers: HeaderMap, bytes: Bytes) -> Self {
        Self {
            status,
            headers,
            body: Body::Buffered { bytes, read: false },
        }
    }

    pub(crate) fn streaming(status: StatusCode, headers: HeaderMap, exchange: Exchange) -> Self {
        Self {
            status,
            headers,
            body: Body::Streaming { exchange, consumed: false },
        }
    }

    /// A `500` response standing in for a captured application error
    pub(crate) fn synthetic_error(err: &Error) -> Self {
        Self::buffered(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            Bytes::from(err.to_string()),
        )
    }

    /// The response status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers, duplicates preserved
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the body is consumed lazily
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Streaming { .. })
    }

    /// Pulls the next body chunk.
    ///
    /// On a buffered response the whole body arrives as one chunk. Returns
    /// `Ok(None)` once the body is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match &mut self.body {
            Body::Buffered { read, bytes } => {
                if *read {
                    Ok(None)
                } else {
                    *read = true;
                    Ok(Some(bytes.clone()))
                }
            }
            Body::Exhausted => Ok(None),
            Body::Streaming { .. } => self.stream_next().await,
        }
    }

    /// The whole response body.
    ///
    /// Fails with a stream-consumed error if a streamed body has already
    /// been read, fully or in part.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        match &self.body {
            Body::Buffered { bytes, .. } => Ok(bytes.clone()),
            Body::Streaming { consumed: true, .. } | Body::Exhausted => {
                Err(Error::stream_consumed())
            }
            Body::Streaming { .. } => {
                let mut buffered = BytesMut::new();
                while let Some(chunk) = self.stream_next().await? {
                    buffered.extend_from_slice(&chunk);
                }
                Ok(buffered.freeze())
            }
        }
    }

    /// The body decoded as text, lossily
    pub async fn text(&mut self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The body parsed as structured data
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Turns the response into a stream over its remaining body chunks
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut response = state?;
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn stream_next(&mut self) -> Result<Option<Bytes>, Error> {
        let Body::Streaming { mut exchange, .. } =
            std::mem::replace(&mut self.body, Body::Exhausted)
        else {
            return Ok(None);
        };

        match exchange.next_event().await? {
            Some(Event::ResponseBody { chunk, more }) => {
                if more {
                    self.body = Body::Streaming { exchange, consumed: true };
                } else {
                    exchange.finish().await?;
                }
                Ok(Some(chunk))
            }
            Some(other) => {
                exchange.abort();
                Err(Error::protocol_violation(format!(
                    "expected a response-body event, got {other:?}"
                )))
            }
            None => {
                exchange.reap_task().await?;
                Err(Error::protocol_violation(
                    "application finished before the final body chunk",
                ))
            }
        }
    }
}
