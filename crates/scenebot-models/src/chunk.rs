//! Download chunks used while reassembling large inputs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A byte range of the source persisted to the job's chunk directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the concatenation order
    pub sequence_number: u64,
    /// Offset of the first byte in the source
    pub byte_offset: u64,
    /// Number of bytes actually received
    pub byte_length: u64,
    /// Location of the chunk on disk
    pub path: PathBuf,
}

impl Chunk {
    /// Offset one past the last byte of this chunk.
    pub fn end_offset(&self) -> u64 {
        self.byte_offset + self.byte_length
    }

    /// File name used for a chunk with the given sequence number.
    pub fn file_name(sequence_number: u64) -> String {
        format!("chunk_{sequence_number:05}.part")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_file_names_sort_in_sequence() {
        let mut names: Vec<String> = [12, 3, 100, 0].iter().map(|&n| Chunk::file_name(n)).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["chunk_00000.part", "chunk_00003.part", "chunk_00012.part", "chunk_00100.part"]
        );
    }

    #[test]
    fn test_end_offset() {
        let chunk = Chunk {
            sequence_number: 1,
            byte_offset: 20,
            byte_length: 7,
            path: PathBuf::from("chunk_00001.part"),
        };
        assert_eq!(chunk.end_offset(), 27);
    }
}
