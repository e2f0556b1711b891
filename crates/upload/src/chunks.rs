//! Client-side chunk planning.
//!
//! Pure logic for splitting a file into upload chunks. No I/O.

use assetpack_common::DEFAULT_UPLOAD_CHUNK_SIZE;

use crate::error::UploadError;

/// One chunk of a file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Zero-based chunk index, sent as the chunk's key.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length of this chunk in bytes.
    pub length: u64,
}

/// Split a file of `size` bytes into chunks of `chunk_size` bytes.
///
/// The last chunk may be shorter. An empty file still yields one empty chunk
/// so the server sees a session to merge. A `chunk_size` of 0 falls back to
/// [`DEFAULT_UPLOAD_CHUNK_SIZE`].
///
/// # Arguments
/// * `size` - Total file size in bytes
/// * `chunk_size` - Size of each chunk
///
/// # Returns
/// Chunks in index order; pass `len()` as `total_chunks` to the merge.
///
/// # Errors
/// Returns `TooManyChunks` if the chunk indices would not fit in a `u32`.
pub fn plan_chunks(size: u64, chunk_size: u64) -> Result<Vec<ChunkPlan>, UploadError> {
    let chunk_size: u64 = effective_chunk_size(chunk_size);
    let count: u32 = expected_chunk_count(size, chunk_size)?;

    let chunks: Vec<ChunkPlan> = (0..count)
        .map(|index: u32| {
            let offset: u64 = u64::from(index) * chunk_size;
            ChunkPlan {
                index,
                offset,
                length: chunk_size.min(size - offset),
            }
        })
        .collect();
    Ok(chunks)
}

/// Expected number of chunks for a file of `size` bytes.
///
/// # Errors
/// Returns `TooManyChunks` if the count does not fit in a `u32`.
pub fn expected_chunk_count(size: u64, chunk_size: u64) -> Result<u32, UploadError> {
    let chunk_size: u64 = effective_chunk_size(chunk_size);
    if size == 0 {
        return Ok(1);
    }
    u32::try_from(size.div_ceil(chunk_size))
        .map_err(|_| UploadError::TooManyChunks { size, chunk_size })
}

fn effective_chunk_size(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_UPLOAD_CHUNK_SIZE
    } else {
        chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_small_file() {
        let chunks: Vec<ChunkPlan> = plan_chunks(1000, DEFAULT_UPLOAD_CHUNK_SIZE).unwrap();
        assert_eq!(
            chunks,
            vec![ChunkPlan {
                index: 0,
                offset: 0,
                length: 1000
            }]
        );
    }

    #[test]
    fn test_plan_with_remainder() {
        let chunks: Vec<ChunkPlan> = plan_chunks(250, 100).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], ChunkPlan { index: 2, offset: 200, length: 50 });
    }

    #[test]
    fn test_plan_exact_multiple_of_default() {
        let size: u64 = DEFAULT_UPLOAD_CHUNK_SIZE * 3;
        let chunks: Vec<ChunkPlan> = plan_chunks(size, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.length == DEFAULT_UPLOAD_CHUNK_SIZE));
        assert_eq!(chunks[1].offset, DEFAULT_UPLOAD_CHUNK_SIZE);
    }

    #[test]
    fn test_plan_empty_file() {
        let chunks: Vec<ChunkPlan> = plan_chunks(0, 100).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].length, 0);
    }

    #[test]
    fn test_expected_chunk_count() {
        assert_eq!(expected_chunk_count(0, 100).unwrap(), 1);
        assert_eq!(expected_chunk_count(100, 100).unwrap(), 1);
        assert_eq!(expected_chunk_count(101, 100).unwrap(), 2);
        assert_eq!(expected_chunk_count(DEFAULT_UPLOAD_CHUNK_SIZE + 1, 0).unwrap(), 2);
    }

    #[test]
    fn test_chunk_count_beyond_u32_is_rejected() {
        let size: u64 = u64::from(u32::MAX) + 1;
        assert_eq!(expected_chunk_count(size - 1, 1).unwrap(), u32::MAX);
        assert!(matches!(
            expected_chunk_count(size, 1),
            Err(UploadError::TooManyChunks { chunk_size: 1, .. })
        ));
        assert!(matches!(
            plan_chunks(u64::MAX, 1),
            Err(UploadError::TooManyChunks { .. })
        ));
    }
}
