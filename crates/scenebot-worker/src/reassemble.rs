//! Reassembly of inputs that can only be fetched in byte ranges.
//!
//! Ranges are fetched one after another, each persisted as its own chunk
//! file, then concatenated in sequence order. Chunk files never outlive
//! the call, whatever the outcome.

use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use scenebot_models::Chunk;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::retry::{retry_async_if, RetryConfig};

/// Why a range fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Worth retrying
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The transport refuses to hand over this file
    #[error("file is too big to be transferred")]
    TooLargeForDirectTransfer,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// A remote file readable by byte range.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Size of the whole file, when the transport reports it.
    fn total_size(&self) -> Option<u64>;

    /// Original file name, used to pick the reassembled file's extension.
    fn file_name(&self) -> Option<String> {
        None
    }

    /// Fetch up to `length` bytes starting at `offset`.
    ///
    /// An empty or short result means the end of the file was reached. For
    /// a source that reports its size, ending early is a failed download.
    async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>, FetchError>;
}

/// Reassembly progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl ReassemblyProgress {
    /// Fraction downloaded, or `None` while the total size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.downloaded as f64 / total as f64).clamp(0.0, 1.0)),
            None => None,
        }
    }
}

/// Sequential chunked downloader.
#[derive(Debug, Clone)]
pub struct ChunkReassembler {
    chunk_size: u64,
    retry: RetryConfig,
    fetch_timeout: Duration,
    overall_timeout: Duration,
    pause: Duration,
}

impl ChunkReassembler {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            retry: RetryConfig::new("fetch_chunk"),
            fetch_timeout: Duration::from_secs(300),
            overall_timeout: Duration::from_secs(3600),
            pause: Duration::ZERO,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.chunk_size_bytes)
            .with_retry(
                RetryConfig::new("fetch_chunk")
                    .with_max_attempts(config.chunk_retry_attempts)
                    .with_base_delay(config.chunk_retry_base_delay),
            )
            .with_fetch_timeout(config.timeouts.chunk_fetch)
            .with_overall_timeout(config.timeouts.reassemble)
            .with_pause(config.inter_chunk_pause)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Download `source` into `output`, staging chunks in `chunks_dir`.
    ///
    /// Returns the number of bytes written. `chunks_dir` is removed on
    /// every path; `output` is removed unless the call succeeds.
    pub async fn reassemble(
        &self,
        source: &dyn ChunkSource,
        chunks_dir: &Path,
        output: &Path,
        on_progress: &(dyn Fn(ReassemblyProgress) + Send + Sync),
    ) -> PipelineResult<u64> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.overall_timeout,
            self.download_and_join(source, chunks_dir, output, on_progress),
        )
        .await;

        remove_quietly(chunks_dir, true).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!("Reassembly exceeded {:?}, abandoning download", self.overall_timeout);
                Err(PipelineError::ReassemblyTimeout(self.overall_timeout))
            }
        };

        match result {
            Ok(bytes) => {
                info!(
                    "Reassembled {} bytes into {} in {:.1}s",
                    bytes,
                    output.display(),
                    start.elapsed().as_secs_f64()
                );
                Ok(bytes)
            }
            Err(e) => {
                remove_quietly(output, false).await;
                Err(e)
            }
        }
    }

    async fn download_and_join(
        &self,
        source: &dyn ChunkSource,
        chunks_dir: &Path,
        output: &Path,
        on_progress: &(dyn Fn(ReassemblyProgress) + Send + Sync),
    ) -> PipelineResult<u64> {
        fs::create_dir_all(chunks_dir)
            .await
            .map_err(PipelineError::ReassemblyIo)?;

        let total = source.total_size();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut downloaded = 0u64;

        on_progress(ReassemblyProgress { downloaded, total });

        loop {
            let wanted = match total {
                Some(total) if downloaded >= total => break,
                Some(total) => self.chunk_size.min(total - downloaded),
                None => self.chunk_size,
            };
            let sequence_number = chunks.len() as u64;

            let mut data = self.fetch_chunk(source, downloaded, wanted).await.map_err(
                |(error, attempts)| match error {
                    FetchError::TooLargeForDirectTransfer => PipelineError::TooLargeForDirectTransfer,
                    FetchError::Transient(_) if chunks.is_empty() => {
                        warn!("Giving up on first chunk after {} attempts: {}", attempts, error);
                        PipelineError::NoDataReceived
                    }
                    FetchError::Transient(message) => PipelineError::ChunkDownloadFailed {
                        sequence: sequence_number,
                        attempts,
                        message,
                    },
                },
            )?;

            if data.is_empty() {
                break;
            }
            data.truncate(wanted as usize);

            let chunk = Chunk {
                sequence_number,
                byte_offset: downloaded,
                byte_length: data.len() as u64,
                path: chunks_dir.join(Chunk::file_name(sequence_number)),
            };
            fs::write(&chunk.path, &data)
                .await
                .map_err(PipelineError::ReassemblyIo)?;
            debug!(
                "Stored chunk {} ({} bytes at offset {})",
                chunk.sequence_number, chunk.byte_length, chunk.byte_offset
            );

            downloaded = chunk.end_offset();
            chunks.push(chunk);
            on_progress(ReassemblyProgress { downloaded, total });

            let short_read = (data.len() as u64) < wanted;
            let complete = total.is_some_and(|t| downloaded >= t);
            if short_read || complete {
                break;
            }
            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        if chunks.is_empty() {
            return Err(PipelineError::NoDataReceived);
        }
        if let Some(total) = total.filter(|&t| downloaded < t) {
            warn!(
                "Source ended after {} of {} bytes, refusing a truncated file",
                downloaded, total
            );
            return Err(PipelineError::ChunkDownloadFailed {
                sequence: chunks.len() as u64,
                attempts: 1,
                message: format!("source ended after {downloaded} of {total} bytes"),
            });
        }

        join_chunks(&mut chunks, output).await?;
        Ok(downloaded)
    }

    /// One range with bounded attempts, each under the fetch timeout.
    async fn fetch_chunk(
        &self,
        source: &dyn ChunkSource,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, (FetchError, u32)> {
        let timeout = self.fetch_timeout;
        retry_async_if(&self.retry, FetchError::is_transient, move || async move {
            match tokio::time::timeout(timeout, source.fetch(offset, length)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Transient(format!(
                    "no response within {}s",
                    timeout.as_secs()
                ))),
            }
        })
        .await
        .into_result()
    }
}

/// Concatenate chunk files into `output` in sequence order.
async fn join_chunks(chunks: &mut [Chunk], output: &Path) -> PipelineResult<()> {
    chunks.sort_by_key(|c| c.sequence_number);

    let mut file = fs::File::create(output)
        .await
        .map_err(PipelineError::ReassemblyIo)?;
    for chunk in chunks.iter() {
        let mut part = fs::File::open(&chunk.path)
            .await
            .map_err(PipelineError::ReassemblyIo)?;
        tokio::io::copy(&mut part, &mut file)
            .await
            .map_err(PipelineError::ReassemblyIo)?;
    }
    file.flush().await.map_err(PipelineError::ReassemblyIo)?;
    file.sync_all().await.map_err(PipelineError::ReassemblyIo)?;
    Ok(())
}

async fn remove_quietly(path: &Path, is_dir: bool) {
    let result = if is_dir {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves ranges of an in-memory buffer and records every request.
    struct MemorySource {
        data: Vec<u8>,
        report_size: bool,
        declared_size: Option<u64>,
        fail_from: Option<u64>,
        requests: Mutex<Vec<(u64, u64)>>,
    }

    impl MemorySource {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                report_size: true,
                declared_size: None,
                fail_from: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChunkSource for MemorySource {
        fn total_size(&self) -> Option<u64> {
            self.report_size
                .then(|| self.declared_size.unwrap_or(self.data.len() as u64))
        }

        async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push((offset, length));
            if self.fail_from.is_some_and(|f| offset >= f) {
                return Err(FetchError::Transient("connection reset".into()));
            }
            let start = (offset as usize).min(self.data.len());
            let end = (start + length as usize).min(self.data.len());
            Ok(self.data[start..end].to_vec())
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn reassembler(chunk_size: u64) -> ChunkReassembler {
        ChunkReassembler::new(chunk_size).with_retry(
            RetryConfig::new("fetch_chunk")
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(1)),
        )
    }

    async fn run(
        reassembler: &ChunkReassembler,
        source: &MemorySource,
        dir: &TempDir,
    ) -> PipelineResult<u64> {
        reassembler
            .reassemble(
                source,
                &dir.path().join("chunks"),
                &dir.path().join("combined.mp4"),
                &|_: ReassemblyProgress| {},
            )
            .await
    }

    #[tokio::test]
    async fn test_output_is_byte_exact_for_any_chunk_size() {
        let data = pattern(10_000);
        for chunk_size in [999, 10_000, 50_000] {
            for report_size in [true, false] {
                let dir = TempDir::new().unwrap();
                let mut source = MemorySource::new(data.clone());
                source.report_size = report_size;

                let bytes = run(&reassembler(chunk_size), &source, &dir).await.unwrap();

                assert_eq!(bytes, 10_000);
                let written = fs::read(dir.path().join("combined.mp4")).await.unwrap();
                assert_eq!(written, data, "chunk_size={chunk_size} report_size={report_size}");
                assert!(!dir.path().join("chunks").exists());
            }
        }
    }

    #[tokio::test]
    async fn test_known_size_fetches_exact_ranges() {
        // 500 KB in 20 KB chunks
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new(pattern(500_000));
        let events = Mutex::new(Vec::new());

        reassembler(20_000)
            .reassemble(
                &source,
                &dir.path().join("chunks"),
                &dir.path().join("combined.mp4"),
                &|p: ReassemblyProgress| events.lock().unwrap().push(p),
            )
            .await
            .unwrap();

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.len(), 25);
        for (i, &(offset, length)) in requests.iter().enumerate() {
            assert_eq!(offset, i as u64 * 20_000);
            assert_eq!(length, 20_000);
        }
        assert!(!dir.path().join("chunks").exists());

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 26);
        assert!(events.windows(2).all(|w| w[0].downloaded < w[1].downloaded));
        assert_eq!(events.last().unwrap().fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn test_source_ending_before_declared_size_fails() {
        let dir = TempDir::new().unwrap();
        let mut source = MemorySource::new(pattern(4_500));
        source.declared_size = Some(10_000);

        let err = run(&reassembler(1_000), &source, &dir).await.unwrap_err();

        match err {
            PipelineError::ChunkDownloadFailed { sequence, .. } => assert_eq!(sequence, 5),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("combined.mp4").exists());
        assert!(!dir.path().join("chunks").exists());
    }

    #[tokio::test]
    async fn test_declared_size_with_nothing_served_is_no_data() {
        let dir = TempDir::new().unwrap();
        let mut source = MemorySource::new(Vec::new());
        source.declared_size = Some(10_000);

        let err = run(&reassembler(1_000), &source, &dir).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoDataReceived));
        assert!(!dir.path().join("combined.mp4").exists());
    }

    #[tokio::test]
    async fn test_empty_source_is_no_data() {
        let dir = TempDir::new().unwrap();
        let mut source = MemorySource::new(Vec::new());
        source.report_size = false;

        let err = run(&reassembler(1024), &source, &dir).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoDataReceived));
        assert!(!dir.path().join("combined.mp4").exists());
    }

    #[tokio::test]
    async fn test_failing_first_chunk_is_no_data() {
        let dir = TempDir::new().unwrap();
        let mut source = MemorySource::new(pattern(4096));
        source.fail_from = Some(0);

        let err = run(&reassembler(1024), &source, &dir).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoDataReceived));
        assert_eq!(source.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_after_some_chunks_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut source = MemorySource::new(pattern(10_000));
        source.fail_from = Some(4_000);

        let err = run(&reassembler(2_000), &source, &dir).await.unwrap_err();

        match err {
            PipelineError::ChunkDownloadFailed {
                sequence, attempts, ..
            } => {
                assert_eq!(sequence, 2);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("chunks").exists());
        assert!(!dir.path().join("combined.mp4").exists());
    }

    #[tokio::test]
    async fn test_too_large_is_not_retried() {
        struct Refusing;

        #[async_trait]
        impl ChunkSource for Refusing {
            fn total_size(&self) -> Option<u64> {
                Some(1 << 30)
            }

            async fn fetch(&self, _offset: u64, _length: u64) -> Result<Vec<u8>, FetchError> {
                Err(FetchError::TooLargeForDirectTransfer)
            }
        }

        let dir = TempDir::new().unwrap();
        let err = reassembler(1024)
            .reassemble(
                &Refusing,
                &dir.path().join("chunks"),
                &dir.path().join("combined.mp4"),
                &|_: ReassemblyProgress| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooLargeForDirectTransfer));
    }

    #[tokio::test]
    async fn test_overall_timeout() {
        struct Stalled;

        #[async_trait]
        impl ChunkSource for Stalled {
            fn total_size(&self) -> Option<u64> {
                None
            }

            async fn fetch(&self, _offset: u64, length: u64) -> Result<Vec<u8>, FetchError> {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(vec![1; length as usize])
            }
        }

        let dir = TempDir::new().unwrap();
        let err = reassembler(16)
            .with_overall_timeout(Duration::from_millis(100))
            .reassemble(
                &Stalled,
                &dir.path().join("chunks"),
                &dir.path().join("combined.mp4"),
                &|_: ReassemblyProgress| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ReassemblyTimeout(_)));
        assert!(!dir.path().join("chunks").exists());
    }

    #[test]
    fn test_progress_fraction() {
        let known = ReassemblyProgress {
            downloaded: 25,
            total: Some(100),
        };
        assert_eq!(known.fraction(), Some(0.25));
        let unknown = ReassemblyProgress {
            downloaded: 25,
            total: None,
        };
        assert_eq!(unknown.fraction(), None);
    }
}
