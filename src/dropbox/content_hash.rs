//! Dropbox content hash: SHA-256 of each 4 MiB block, then SHA-256 of the concatenated digests.

use crate::constants::content_hash::BLOCK_SIZE;
use sha2::{Digest, Sha256};

pub fn content_hash(data: &[u8]) -> String {
    let mut overall = Sha256::new();
    for block in data.chunks(BLOCK_SIZE) {
        overall.update(Sha256::digest(block));
    }
    hex::encode(overall.finalize())
}

/// Incremental variant for bodies that arrive in pieces.
#[derive(Default)]
pub struct ContentHasher {
    overall: Sha256,
    block: Sha256,
    block_len: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = BLOCK_SIZE - self.block_len;
            let take = room.min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len == BLOCK_SIZE {
                self.flush_block();
            }
        }
    }

    fn flush_block(&mut self) {
        let block = std::mem::take(&mut self.block);
        self.overall.update(block.finalize());
        self.block_len = 0;
    }

    pub fn finish(mut self) -> String {
        if self.block_len > 0 {
            self.flush_block();
        }
        hex::encode(self.overall.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_hash_of_nothing() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_block_is_hash_of_block_digest() {
        let expected = hex::encode(Sha256::digest(Sha256::digest(b"hello")));
        assert_eq!(content_hash(b"hello"), expected);
    }

    #[test]
    fn incremental_matches_one_shot_across_block_boundary() {
        let data: Vec<u8> = (0..BLOCK_SIZE + 1000).map(|i| (i % 251) as u8).collect();
        let mut hasher = ContentHasher::new();
        for piece in data.chunks(777_777) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finish(), content_hash(&data));
    }
}
