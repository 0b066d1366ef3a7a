// Splitter adapters - Locate or produce fixed-duration raw chunks

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

/// Chunk file name for a source, e.g. `sintel01_03.y4m`
pub fn chunk_file_name(source: &str, chunk: ChunkIndex, extension: &str) -> String {
    format!("{}_{}.{}", source, chunk, extension)
}

/// Reads already-split chunk files from the workspace
pub struct DirectorySplitter {
    workspace: PathBuf,
    extension: String,
}

impl DirectorySplitter {
    pub fn new(workspace: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            workspace: workspace.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn chunk_path(&self, source: &str, chunk: ChunkIndex) -> PathBuf {
        self.workspace
            .join(chunk_file_name(source, chunk, &self.extension))
    }

    /// Number of consecutive chunk files present, starting at 0
    pub fn count_available(&self, source: &str) -> usize {
        (0..)
            .take_while(|&i| self.chunk_path(source, ChunkIndex(i)).is_file())
            .count()
    }
}

#[async_trait]
impl SplitterPort for DirectorySplitter {
    async fn split(&self, source: &str, chunk_count: usize) -> Result<Vec<RawChunk>, SplitError> {
        if chunk_count == 0 {
            return Err(SplitError::ChunkCount {
                source_id: source.to_string(),
                expected: 0,
                found: self.count_available(source),
            });
        }

        let mut chunks = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let index = ChunkIndex(i);
            let path = self.chunk_path(source, index);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let found = self.count_available(source);
                    return Err(if found < chunk_count {
                        SplitError::ChunkCount {
                            source_id: source.to_string(),
                            expected: chunk_count,
                            found,
                        }
                    } else {
                        SplitError::MissingChunk(path.display().to_string())
                    });
                }
                Err(e) => return Err(e.into()),
            };
            debug!(chunk = %index, path = %path.display(), bytes = data.len(), "loaded raw chunk");
            chunks.push(RawChunk::new(index, path, Bytes::from(data)));
        }
        Ok(chunks)
    }
}

/// Cuts a source file into chunks with `ffmpeg -f segment`, then reads them back
pub struct SegmentSplitter {
    program: String,
    segment_time: f64,
    input: PathBuf,
    inner: DirectorySplitter,
}

impl SegmentSplitter {
    pub fn new(program: &str, segment_time: f64, input: impl Into<PathBuf>, inner: DirectorySplitter) -> Self {
        Self {
            program: program.to_string(),
            segment_time,
            input: input.into(),
            inner,
        }
    }

    fn output_pattern(&self, source: &str) -> PathBuf {
        self.inner
            .workspace
            .join(format!("{}_%02d.{}", source, self.inner.extension))
    }

    /// Run the segmenter; returns the number of chunks produced
    pub async fn segment(&self, source: &str) -> Result<usize, SplitError> {
        if !Path::new(&self.input).is_file() {
            return Err(SplitError::MissingChunk(self.input.display().to_string()));
        }
        tokio::fs::create_dir_all(&self.inner.workspace).await?;

        let pattern = self.output_pattern(source);
        info!(
            input = %self.input.display(),
            segment_time = self.segment_time,
            "segmenting source"
        );
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(&self.input)
            .args(["-f", "segment", "-segment_time"])
            .arg(self.segment_time.to_string())
            .arg(&pattern)
            .output()
            .await
            .map_err(|e| SplitError::Segmenter(format!("failed to launch {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(SplitError::Segmenter(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(self.inner.count_available(source))
    }
}

#[async_trait]
impl SplitterPort for SegmentSplitter {
    async fn split(&self, source: &str, chunk_count: usize) -> Result<Vec<RawChunk>, SplitError> {
        if self.inner.count_available(source) < chunk_count {
            self.segment(source).await?;
        }
        self.inner.split(source, chunk_count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_chunks(dir: &Path, source: &str, count: usize) {
        for i in 0..count {
            std::fs::write(
                dir.join(chunk_file_name(source, ChunkIndex(i), "y4m")),
                format!("frame-data-{}", i),
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_split_loads_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        write_chunks(dir.path(), "sintel01", 3);
        let splitter = DirectorySplitter::new(dir.path(), "y4m");

        let chunks = splitter.split("sintel01", 3).await.unwrap();
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, ChunkIndex(i));
            assert_eq!(chunk.data, Bytes::from(format!("frame-data-{}", i)));
            assert!(chunk.path.ends_with(format!("sintel01_{:02}.y4m", i)));
        }
    }

    #[tokio::test]
    async fn test_split_with_too_few_files_fails() {
        let dir = TempDir::new().unwrap();
        write_chunks(dir.path(), "clip", 2);
        let splitter = DirectorySplitter::new(dir.path(), ".y4m");

        match splitter.split("clip", 4).await.unwrap_err() {
            SplitError::ChunkCount {
                expected, found, ..
            } => {
                assert_eq!(expected, 4);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_split_zero_chunks_fails() {
        let dir = TempDir::new().unwrap();
        let splitter = DirectorySplitter::new(dir.path(), "y4m");
        assert!(splitter.split("clip", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_segment_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let splitter = SegmentSplitter::new(
            "ffmpeg",
            0.25,
            dir.path().join("missing.y4m"),
            DirectorySplitter::new(dir.path(), "y4m"),
        );
        assert!(matches!(
            splitter.split("clip", 2).await.unwrap_err(),
            SplitError::MissingChunk(_)
        ));
    }

    #[tokio::test]
    async fn test_segment_skipped_when_chunks_exist() {
        let dir = TempDir::new().unwrap();
        write_chunks(dir.path(), "clip", 2);
        // the program would fail if it were run
        let splitter = SegmentSplitter::new(
            "chunkstitch-no-such-ffmpeg",
            0.25,
            dir.path().join("clip.y4m"),
            DirectorySplitter::new(dir.path(), "y4m"),
        );
        assert_eq!(splitter.split("clip", 2).await.unwrap().len(), 2);
    }
}
