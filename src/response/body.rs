//! The response body model: a lazy, finite, single-pass byte stream with
//! optional trailing headers.
//!
//! A body is either a buffer known up front or a producer closure that is
//! handed a [`BodyWriter`] when the response is sent. Middleware can wrap the
//! writer to transform bytes in flight (compression, checksumming) without
//! materializing the whole body; the wrapping writer may contribute its own
//! trailers when it finishes.

use std::fmt;
use std::io;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream;
use hyper::{Body, HeaderMap};
use log::debug;
use tokio::sync::mpsc;

/// Errors raised while pumping a response body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// The receiving side is gone, typically because the client disconnected.
    #[error("body channel closed")]
    Closed,
    /// An I/O failure in the producer, e.g. a short read from disk.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The write side of a response body.
///
/// `write` may be called any number of times, including zero; the
/// concatenation of the chunks forms the body. `finish` consumes the writer,
/// so a finished writer can never be written to again, and the writer cannot
/// be shared across tasks.
pub trait BodyWriter: Send {
    /// Emits one chunk of the body.
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), BodyError>>;

    /// Terminates the body, optionally attaching trailing headers.
    fn finish(self: Box<Self>, trailers: Option<HeaderMap>) -> BoxFuture<'static, Result<(), BodyError>>;
}

type ProduceFn =
    Box<dyn FnOnce(Box<dyn BodyWriter>) -> BoxFuture<'static, Result<(), BodyError>> + Send>;

/// A producer-driven body. See [`ResponseBody::stream`].
pub struct StreamBody {
    content_length: Option<u64>,
    produce: ProduceFn,
}

/// The body of a [`Response`](crate::response::Response).
pub enum ResponseBody {
    /// No body; content length zero.
    Empty,
    /// An eager byte buffer with known length.
    Buffer(Bytes),
    /// A lazy producer invoked when the response is written out.
    Stream(StreamBody),
}

impl ResponseBody {
    /// An eager body from any byte source.
    pub fn buffer<B: Into<Bytes>>(bytes: B) -> ResponseBody {
        ResponseBody::Buffer(bytes.into())
    }

    /// A lazy body. `produce` receives the writer exactly once when the body
    /// is sent; pass the content length when it is known so the response can
    /// carry a `Content-Length` header instead of chunked encoding.
    pub fn stream<F, Fut>(content_length: Option<u64>, produce: F) -> ResponseBody
    where
        F: FnOnce(Box<dyn BodyWriter>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), BodyError>> + Send + 'static,
    {
        ResponseBody::Stream(StreamBody {
            content_length,
            produce: Box::new(move |writer| Box::pin(produce(writer))),
        })
    }

    /// The number of body bytes, when known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            ResponseBody::Empty => Some(0),
            ResponseBody::Buffer(bytes) => Some(bytes.len() as u64),
            ResponseBody::Stream(stream) => stream.content_length,
        }
    }

    /// Pumps this body into `writer`: every variant ends with exactly one
    /// `finish` call on the (possibly wrapped) writer.
    pub fn drive(self, mut writer: Box<dyn BodyWriter>) -> BoxFuture<'static, Result<(), BodyError>> {
        match self {
            ResponseBody::Empty => Box::pin(async move { writer.finish(None).await }),
            ResponseBody::Buffer(bytes) => Box::pin(async move {
                writer.write(bytes).await?;
                writer.finish(None).await
            }),
            ResponseBody::Stream(stream) => (stream.produce)(writer),
        }
    }

    /// Replaces this body with one whose writer is wrapped by `wrap`,
    /// chaining a transformation onto whatever producer already exists.
    ///
    /// `content_length` is the transformed length if the transformation
    /// preserves or predicts it, `None` otherwise.
    pub fn transform<W>(self, content_length: Option<u64>, wrap: W) -> ResponseBody
    where
        W: FnOnce(Box<dyn BodyWriter>) -> Box<dyn BodyWriter> + Send + 'static,
    {
        ResponseBody::stream(content_length, move |writer| self.drive(wrap(writer)))
    }

    /// Attaches trailing headers to this body: whatever the producer emits,
    /// `trailers` are merged into the final `finish` call (entries here win
    /// over same-named entries from the producer).
    ///
    /// This is how trailers set on a buffered
    /// [`Response`](crate::response::Response) reach the writer chain.
    pub fn with_trailers(self, trailers: HeaderMap) -> ResponseBody {
        let content_length = self.content_length();
        ResponseBody::stream(content_length, move |writer| {
            self.drive(Box::new(TrailingWriter {
                parent: writer,
                trailers,
            }))
        })
    }
}

/// Forwards writes untouched and folds a fixed set of trailers into the
/// final `finish`.
struct TrailingWriter {
    parent: Box<dyn BodyWriter>,
    trailers: HeaderMap,
}

impl BodyWriter for TrailingWriter {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), BodyError>> {
        self.parent.write(chunk)
    }

    fn finish(self: Box<Self>, trailers: Option<HeaderMap>) -> BoxFuture<'static, Result<(), BodyError>> {
        let TrailingWriter {
            parent,
            trailers: own,
        } = *self;
        let merged = match trailers {
            Some(mut produced) => {
                produced.extend(own);
                produced
            }
            None => own,
        };
        parent.finish(Some(merged))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("ResponseBody::Empty"),
            ResponseBody::Buffer(bytes) => write!(f, "ResponseBody::Buffer({} bytes)", bytes.len()),
            ResponseBody::Stream(stream) => write!(
                f,
                "ResponseBody::Stream(content_length: {:?})",
                stream.content_length
            ),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Empty
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Buffer(bytes)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Buffer(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(v: Vec<u8>) -> Self {
        ResponseBody::Buffer(Bytes::from(v))
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::Buffer(Bytes::from(s))
    }
}

/// Feeds a producer-driven body into a hyper `Body` through a bounded
/// channel. The producer runs on its own task; if the client goes away the
/// channel closes and the producer observes [`BodyError::Closed`] on its
/// next write. A write timeout bounds how long a chunk may sit waiting on a
/// stalled client.
pub(crate) fn into_hyper_body(body: ResponseBody, write_timeout: Option<std::time::Duration>) -> Body {
    match body {
        ResponseBody::Empty => Body::empty(),
        ResponseBody::Buffer(bytes) => Body::from(bytes),
        ResponseBody::Stream(stream_body) => {
            let (tx, mut rx) = mpsc::channel::<Result<Bytes, BodyError>>(8);
            tokio::spawn(async move {
                let writer = Box::new(ChannelWriter {
                    tx,
                    timeout: write_timeout,
                });
                if let Err(err) = (stream_body.produce)(writer).await {
                    debug!(target: "shrike::server", "response body producer stopped: {}", err);
                }
            });
            Body::wrap_stream(stream::poll_fn(move |cx| rx.poll_recv(cx)))
        }
    }
}

/// Writer backed by the channel feeding hyper.
struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes, BodyError>>,
    timeout: Option<std::time::Duration>,
}

impl BodyWriter for ChannelWriter {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), BodyError>> {
        Box::pin(async move {
            if chunk.is_empty() {
                return Ok(());
            }
            let send = self.tx.send(Ok(chunk));
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, send).await {
                    Ok(sent) => sent.map_err(|_| BodyError::Closed),
                    Err(_) => Err(BodyError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "response write timed out",
                    ))),
                },
                None => send.await.map_err(|_| BodyError::Closed),
            }
        })
    }

    fn finish(self: Box<Self>, trailers: Option<HeaderMap>) -> BoxFuture<'static, Result<(), BodyError>> {
        Box::pin(async move {
            if let Some(trailers) = trailers {
                // The channel library only frames data chunks, so trailers
                // stop at this boundary.
                debug!(
                    target: "shrike::server",
                    "dropping {} trailer(s) not representable on the wire channel",
                    trailers.len()
                );
            }
            Ok(())
        })
    }
}

/// A fully collected body, as produced by [`collect_body`].
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct CollectedBody {
    /// The concatenated body bytes.
    pub bytes: Bytes,
    /// Trailers passed to the final `finish`, if any.
    pub trailers: Option<HeaderMap>,
}

/// Drains a body in-process, returning its bytes and trailers. Testing aid.
#[cfg(any(test, feature = "testing"))]
pub async fn collect_body(body: ResponseBody) -> Result<CollectedBody, BodyError> {
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Sink {
        bytes: Vec<u8>,
        trailers: Option<HeaderMap>,
        finished: bool,
    }

    struct CollectWriter {
        sink: Arc<Mutex<Sink>>,
    }

    impl BodyWriter for CollectWriter {
        fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), BodyError>> {
            let sink = self.sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().bytes.extend_from_slice(&chunk);
                Ok(())
            })
        }

        fn finish(
            self: Box<Self>,
            trailers: Option<HeaderMap>,
        ) -> BoxFuture<'static, Result<(), BodyError>> {
            let sink = self.sink;
            Box::pin(async move {
                let mut guard = sink.lock().unwrap();
                guard.trailers = trailers;
                guard.finished = true;
                Ok(())
            })
        }
    }

    let sink = Arc::new(Mutex::new(Sink::default()));
    body.drive(Box::new(CollectWriter { sink: sink.clone() })).await?;
    let mut guard = sink.lock().unwrap();
    Ok(CollectedBody {
        bytes: Bytes::from(std::mem::take(&mut guard.bytes)),
        trailers: guard.trailers.take(),
    })
}
