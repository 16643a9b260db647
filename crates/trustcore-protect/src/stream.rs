//! Streaming encryption in the chunked (version 4) format.
//!
//! Encryption is a two-stage pipeline: a [`Resizer`] cuts incoming clear bytes
//! into chunks of exactly `clear_chunk_size`, and a [`ChunkEncryptor`]
//! encrypts them with an increasing index. [`EncryptorStream`] drives both
//! stages from an input stream and only pulls more input once no full clear
//! chunk is buffered. Decryption mirrors it with [`DecryptorStream`].

use bytes::{Bytes, BytesMut};
use futures::{ready, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::crypto::EncryptionKey;
use crate::error::{ProtectError, Result};
use crate::format::v4;
use crate::resource::{Resource, ResourceId};

/// Streaming parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Size of every encrypted chunk but the last.
    pub max_encrypted_chunk_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_encrypted_chunk_size: v4::DEFAULT_MAX_ENCRYPTED_CHUNK_SIZE,
        }
    }
}

impl StreamConfig {
    /// Clear bytes per full chunk. Fails if the chunk size does not leave room
    /// for any payload.
    pub fn clear_chunk_size(&self) -> Result<usize> {
        v4::clear_chunk_size(self.max_encrypted_chunk_size)
    }
}

/// Buffers bytes and re-emits them in fixed-size chunks.
#[derive(Debug)]
pub struct Resizer {
    chunk_size: usize,
    buffer: BytesMut,
}

impl Resizer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            buffer: BytesMut::new(),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take one full chunk if enough bytes are buffered.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if self.buffer.len() >= self.chunk_size {
            Some(self.buffer.split_to(self.chunk_size).freeze())
        } else {
            None
        }
    }

    /// Take whatever is left (shorter than a chunk).
    pub fn finish(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Encrypts consecutive clear chunks of one resource.
#[derive(Debug)]
pub struct ChunkEncryptor {
    key: EncryptionKey,
    resource_id: ResourceId,
    encrypted_chunk_size: u32,
    clear_chunk_size: usize,
    index: u64,
    last_clear_len: Option<usize>,
}

impl ChunkEncryptor {
    pub fn new(key: EncryptionKey, resource_id: ResourceId, encrypted_chunk_size: u32) -> Result<Self> {
        let clear_chunk_size = v4::clear_chunk_size(encrypted_chunk_size)?;
        Ok(Self {
            key,
            resource_id,
            encrypted_chunk_size,
            clear_chunk_size,
            index: 0,
            last_clear_len: None,
        })
    }

    pub fn clear_chunk_size(&self) -> usize {
        self.clear_chunk_size
    }

    pub fn encrypted_chunk_size(&self) -> u32 {
        self.encrypted_chunk_size
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Encrypt the next chunk. At most `clear_chunk_size` bytes.
    pub fn encrypt_chunk(&mut self, clear: &[u8]) -> Result<Vec<u8>> {
        if clear.len() > self.clear_chunk_size {
            return Err(ProtectError::InvalidArgument(format!(
                "clear chunk of {} bytes exceeds {}",
                clear.len(),
                self.clear_chunk_size
            )));
        }
        let next = self
            .index
            .checked_add(1)
            .ok_or_else(|| ProtectError::EncryptionFailed("chunk index overflow".into()))?;
        let chunk = v4::encrypt_chunk(
            &self.key,
            self.index,
            &self.resource_id,
            self.encrypted_chunk_size,
            clear,
        )?;
        self.index = next;
        self.last_clear_len = Some(clear.len());
        Ok(chunk)
    }

    /// Close the stream. Returns a trailing empty chunk when the last chunk
    /// was full (or nothing was encrypted at all), since a decoder only
    /// recognizes the end by a short chunk.
    pub fn finish(&mut self) -> Result<Option<Vec<u8>>> {
        match self.last_clear_len {
            Some(len) if len % self.clear_chunk_size != 0 => Ok(None),
            _ => self.encrypt_chunk(&[]).map(Some),
        }
    }
}

/// Decrypts consecutive chunks and tracks where the stream ends.
#[derive(Debug)]
pub struct ChunkDecryptor {
    key: EncryptionKey,
    index: u64,
    resource_id: Option<ResourceId>,
    encrypted_chunk_size: Option<u32>,
    finished: bool,
}

impl ChunkDecryptor {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            key,
            index: 0,
            resource_id: None,
            encrypted_chunk_size: None,
            finished: false,
        }
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    /// Decrypt the next chunk. Full-size chunks are never the last one.
    pub fn decrypt_chunk(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if self.finished {
            return Err(ProtectError::DecryptionFailed(
                "data found after the last chunk".into(),
            ));
        }
        let (header, clear) = v4::decrypt_chunk(&self.key, self.index, chunk)?;

        let expected_size = *self
            .encrypted_chunk_size
            .get_or_insert(header.encrypted_chunk_size);
        let expected_id = *self.resource_id.get_or_insert(header.resource_id);
        if header.encrypted_chunk_size != expected_size || header.resource_id != expected_id {
            return Err(ProtectError::DecryptionFailed(format!(
                "chunk {} does not belong to this stream",
                self.index
            )));
        }
        if chunk.len() > expected_size as usize {
            return Err(ProtectError::DecryptionFailed(format!(
                "chunk {} is larger than the chunk size",
                self.index
            )));
        }
        if chunk.len() < expected_size as usize {
            self.finished = true;
        }

        self.index = self
            .index
            .checked_add(1)
            .ok_or_else(|| ProtectError::DecryptionFailed("chunk index overflow".into()))?;
        Ok(clear)
    }

    /// Check that the stream ended with its last chunk.
    pub fn finish(&self) -> Result<()> {
        if self.finished {
            Ok(())
        } else {
            Err(ProtectError::DecryptionFailed("missing last chunk".into()))
        }
    }
}

/// Encrypts a stream of clear bytes into a stream of encrypted chunks.
pub struct EncryptorStream<S> {
    input: Option<S>,
    resizer: Resizer,
    encryptor: ChunkEncryptor,
    done: bool,
}

impl<S> EncryptorStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Encrypt `input` under `resource` with the given chunk size.
    pub fn new(input: S, resource: Resource, config: StreamConfig) -> Result<Self> {
        let encryptor = ChunkEncryptor::new(
            resource.key.clone(),
            resource.resource_id,
            config.max_encrypted_chunk_size,
        )?;
        Ok(Self {
            input: Some(input),
            resizer: Resizer::new(encryptor.clear_chunk_size()),
            encryptor,
            done: false,
        })
    }

    pub fn resource_id(&self) -> ResourceId {
        self.encryptor.resource_id()
    }

    pub fn clear_chunk_size(&self) -> usize {
        self.encryptor.clear_chunk_size()
    }

    pub fn encrypted_chunk_size(&self) -> u32 {
        self.encryptor.encrypted_chunk_size()
    }

    /// Encrypted length for a known clear length.
    pub fn get_encrypted_size(&self, clear_size: u64) -> Result<u64> {
        v4::get_encrypted_size(clear_size, self.encrypted_chunk_size())
    }

    fn emit(&mut self, clear: &[u8]) -> Poll<Option<Result<Bytes>>> {
        match self.encryptor.encrypt_chunk(clear) {
            Ok(chunk) => Poll::Ready(Some(Ok(chunk.into()))),
            Err(e) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}

impl<S> Stream for EncryptorStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            if let Some(chunk) = this.resizer.next_chunk() {
                return this.emit(&chunk);
            }

            let Some(input) = this.input.as_mut() else {
                // Input exhausted and no full chunk left: flush and close.
                this.done = true;
                let rest = this.resizer.finish();
                let last = if rest.is_empty() {
                    this.encryptor.finish()
                } else {
                    this.encryptor.encrypt_chunk(&rest).map(Some)
                };
                return Poll::Ready(last.map(|chunk| chunk.map(Bytes::from)).transpose());
            };

            match ready!(Pin::new(input).poll_next(cx)) {
                Some(Ok(data)) => this.resizer.push(&data),
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => this.input = None,
            }
        }
    }
}

/// Decrypts a stream of version 4 bytes, in any segmentation, to clear bytes.
pub struct DecryptorStream<S> {
    input: Option<S>,
    buffer: BytesMut,
    chunk_size: Option<usize>,
    decryptor: ChunkDecryptor,
    done: bool,
}

impl<S> DecryptorStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    pub fn new(input: S, key: EncryptionKey) -> Self {
        Self {
            input: Some(input),
            buffer: BytesMut::new(),
            chunk_size: None,
            decryptor: ChunkDecryptor::new(key),
            done: false,
        }
    }

    /// Resource id, known once the first chunk has been decrypted.
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.decryptor.resource_id()
    }

    fn fail(&mut self, e: ProtectError) -> Poll<Option<Result<Bytes>>> {
        self.done = true;
        Poll::Ready(Some(Err(e)))
    }

    fn emit(&mut self, chunk: &[u8]) -> Poll<Option<Result<Bytes>>> {
        match self.decryptor.decrypt_chunk(chunk) {
            Ok(clear) => Poll::Ready(Some(Ok(clear.into()))),
            Err(e) => self.fail(e),
        }
    }
}

impl<S> Stream for DecryptorStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }

            if this.chunk_size.is_none() && this.buffer.len() >= v4::OVERHEAD {
                match v4::read_header(&this.buffer) {
                    Ok(header) => this.chunk_size = Some(header.encrypted_chunk_size as usize),
                    Err(e) => return this.fail(e),
                }
            }
            // A full-size chunk is never the last one, so it can be
            // decrypted as soon as it is complete.
            if let Some(size) = this.chunk_size {
                if this.buffer.len() >= size {
                    let chunk = this.buffer.split_to(size).freeze();
                    return this.emit(&chunk);
                }
            }

            let Some(input) = this.input.as_mut() else {
                this.done = true;
                let rest = this.buffer.split().freeze();
                let last = if rest.is_empty() {
                    Ok(None)
                } else {
                    this.decryptor.decrypt_chunk(&rest).map(Some)
                };
                let last = last.and_then(|clear| {
                    this.decryptor.finish()?;
                    Ok(clear.map(Bytes::from))
                });
                return Poll::Ready(last.transpose());
            };

            match ready!(Pin::new(input).poll_next(cx)) {
                Some(Ok(data)) => this.buffer.extend_from_slice(&data),
                Some(Err(e)) => return this.fail(e),
                None => this.input = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::make_resource;
    use futures::stream::{self, StreamExt, TryStreamExt};

    const CHUNK: u32 = 1024;

    fn config() -> StreamConfig {
        StreamConfig {
            max_encrypted_chunk_size: CHUNK,
        }
    }

    fn input(data: &[u8], piece: usize) -> impl Stream<Item = Result<Bytes>> + Unpin {
        let pieces: Vec<Result<Bytes>> = data
            .chunks(piece.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(pieces)
    }

    async fn encrypt_all(data: &[u8], resource: &Resource, piece: usize) -> Vec<Bytes> {
        EncryptorStream::new(input(data, piece), resource.clone(), config())
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[test]
    fn test_resizer() {
        let mut resizer = Resizer::new(4);
        resizer.push(b"abcdef");
        assert_eq!(resizer.next_chunk().unwrap(), Bytes::from_static(b"abcd"));
        assert!(resizer.next_chunk().is_none());
        resizer.push(b"gh");
        assert_eq!(resizer.next_chunk().unwrap(), Bytes::from_static(b"efgh"));
        resizer.push(b"i");
        assert_eq!(resizer.finish(), Bytes::from_static(b"i"));
        assert_eq!(resizer.buffered(), 0);
    }

    #[test]
    fn test_config_rejects_small_chunks() {
        let config = StreamConfig {
            max_encrypted_chunk_size: v4::OVERHEAD as u32,
        };
        assert!(config.clear_chunk_size().is_err());
        assert_eq!(
            StreamConfig::default().clear_chunk_size().unwrap(),
            1024 * 1024 - v4::OVERHEAD
        );
    }

    #[tokio::test]
    async fn test_empty_input_gives_one_empty_chunk() {
        let resource = make_resource();
        let chunks = encrypt_all(&[], &resource, 1).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), v4::OVERHEAD);

        let (header, clear) = v4::decrypt_chunk(&resource.key, 0, &chunks[0]).unwrap();
        assert_eq!(header.resource_id, resource.resource_id);
        assert!(clear.is_empty());
    }

    #[tokio::test]
    async fn test_exact_multiple_gets_trailing_chunk() {
        let resource = make_resource();
        let clear_chunk = config().clear_chunk_size().unwrap();
        let data = vec![0x42u8; 2 * clear_chunk];

        let chunks = encrypt_all(&data, &resource, 100).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK as usize);
        assert_eq!(chunks[1].len(), CHUNK as usize);
        assert_eq!(chunks[2].len(), v4::OVERHEAD);
    }

    #[tokio::test]
    async fn test_stream_matches_size_accounting() {
        let resource = make_resource();
        let c = config().clear_chunk_size().unwrap();
        for len in [0, 1, c - 1, c, c + 1, 10 * c] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let encryptor =
                EncryptorStream::new(input(&data, 333), resource.clone(), config()).unwrap();
            let expected = encryptor.get_encrypted_size(len as u64).unwrap();
            let chunks: Vec<Bytes> = encryptor.try_collect().await.unwrap();
            let encrypted: Vec<u8> = chunks.concat();
            assert_eq!(encrypted.len() as u64, expected);
            assert_eq!(v4::decrypt(&resource.key, &encrypted).unwrap(), data);
        }
    }

    #[tokio::test]
    async fn test_decryptor_stream_any_segmentation() {
        let resource = make_resource();
        let c = config().clear_chunk_size().unwrap();
        let data: Vec<u8> = (0..3 * c + 17).map(|i| (i % 251) as u8).collect();
        let encrypted = encrypt_all(&data, &resource, 1000).await.concat();

        for piece in [1, 7, CHUNK as usize, encrypted.len()] {
            let decryptor = DecryptorStream::new(input(&encrypted, piece), resource.key.clone());
            let clear: Vec<Bytes> = decryptor.try_collect().await.unwrap();
            assert_eq!(clear.concat(), data);
        }
    }

    #[tokio::test]
    async fn test_decryptor_detects_truncation() {
        let resource = make_resource();
        let c = config().clear_chunk_size().unwrap();
        let encrypted = encrypt_all(&vec![1u8; 2 * c], &resource, c).await.concat();

        // Drop the trailing empty chunk
        let truncated = &encrypted[..2 * CHUNK as usize];
        let results: Vec<Result<Bytes>> =
            DecryptorStream::new(input(truncated, 500), resource.key.clone())
                .collect()
                .await;
        assert!(matches!(
            results.last(),
            Some(Err(ProtectError::DecryptionFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_decryptor_rejects_trailing_data() {
        let resource = make_resource();
        let mut encrypted = encrypt_all(b"short", &resource, 5).await.concat();
        let extra = encrypt_all(b"more", &resource, 5).await.concat();
        encrypted.extend_from_slice(&extra);

        let result: Result<Vec<Bytes>> =
            DecryptorStream::new(input(&encrypted, 64), resource.key.clone())
                .try_collect()
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_input_error_terminates_stream() {
        let resource = make_resource();
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(ProtectError::InvalidArgument("broken input".into())),
            Ok(Bytes::from_static(b"def")),
        ];
        let mut stream = EncryptorStream::new(stream::iter(items), resource, config()).unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(ProtectError::InvalidArgument(_)))
        ));
        assert!(stream.next().await.is_none());
    }
}
