//! Chunk stream type and test utilities.

use futures_util::stream::BoxStream;

/// Type alias for the chunk streams consumed by the uploader.
///
/// A stream item that is an error aborts the upload that is consuming it.
pub type PayloadStream = BoxStream<'static, std::io::Result<bytes::Bytes>>;

/// Creates a [`PayloadStream`] yielding the given chunks in order.
#[cfg(test)]
pub(crate) fn make_stream(chunks: Vec<Vec<u8>>) -> PayloadStream {
    use futures_util::StreamExt;
    futures_util::stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into()))).boxed()
}

/// Creates a [`PayloadStream`] that yields the given chunks and then fails.
#[cfg(test)]
pub(crate) fn failing_stream(chunks: Vec<Vec<u8>>) -> PayloadStream {
    use futures_util::StreamExt;
    let failure = std::io::Error::other("chunk source broke");
    futures_util::stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into())))
        .chain(futures_util::stream::once(async move { Err(failure) }))
        .boxed()
}
