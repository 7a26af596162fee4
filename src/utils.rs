// src/utils.rs
// Block range helpers shared by the operator source and the CLI

/// Creates a vector of (start_block, end_block) tuples for a given range and chunk size.
/// Both ends are inclusive; an empty vector is returned when `from_block > to_block`.
pub fn create_block_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = current_from
            .saturating_add(chunk_size - 1)
            .min(to_block);
        chunks.push((current_from, current_to));
        if current_to == to_block {
            break;
        }
        current_from = current_to + 1;
    }
    chunks
}

/// Splits an inclusive range in two halves. `None` for a single block.
pub fn split_block_range(from_block: u64, to_block: u64) -> Option<((u64, u64), (u64, u64))> {
    if from_block >= to_block {
        return None;
    }
    let mid = from_block + (to_block - from_block) / 2;
    Some(((from_block, mid), (mid + 1, to_block)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_block_chunks() {
        assert_eq!(
            create_block_chunks(0, 25, 10),
            vec![(0, 9), (10, 19), (20, 25)]
        );
        assert_eq!(create_block_chunks(5, 5, 10), vec![(5, 5)]);
        assert!(create_block_chunks(6, 5, 10).is_empty());
    }

    #[test]
    fn test_create_block_chunks_edge_sizes() {
        assert_eq!(create_block_chunks(0, 2, 0), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(
            create_block_chunks(u64::MAX - 1, u64::MAX, 10),
            vec![(u64::MAX - 1, u64::MAX)]
        );
    }

    #[test]
    fn test_split_block_range() {
        assert_eq!(split_block_range(0, 9), Some(((0, 4), (5, 9))));
        assert_eq!(split_block_range(3, 4), Some(((3, 3), (4, 4))));
        assert_eq!(split_block_range(7, 7), None);
    }
}
