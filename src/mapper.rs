//! Id remapping used while merging several COCO datasets into one.

use std::collections::HashMap;

/// Maps `(dataset index, old id)` to the id assigned in the merged dataset
#[derive(Debug, Default, Clone)]
pub struct IdMapper {
    map: HashMap<(usize, u64), u64>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dataset: usize, old_id: u64, new_id: u64) {
        self.map.insert((dataset, old_id), new_id);
    }

    pub fn get(&self, dataset: usize, old_id: u64) -> Option<u64> {
        self.map.get(&(dataset, old_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One mapper per COCO record kind that other records refer to
#[derive(Debug, Default, Clone)]
pub struct CocoMapper {
    pub licenses: IdMapper,
    pub images: IdMapper,
    pub categories: IdMapper,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_per_dataset() {
        let mut mapper = IdMapper::new();
        mapper.add(0, 5, 0);
        mapper.add(1, 5, 3);
        assert_eq!(mapper.get(0, 5), Some(0));
        assert_eq!(mapper.get(1, 5), Some(3));
        assert_eq!(mapper.get(2, 5), None);
        assert_eq!(mapper.len(), 2);
    }
}
