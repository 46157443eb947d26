use lord_model::TenantKey;
use rand::seq::SliceRandom;

/// Round-robin over a shuffled tenant list.
///
/// A pass visits every key once; the order is reshuffled for the next
/// pass. `invalidate` forces the list to be re-read before the next pick.
#[derive(Debug, Default)]
pub(crate) struct Candidates {
    keys: Vec<TenantKey>,
    cursor: usize,
    loaded: bool,
}

impl Candidates {
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn invalidate(&mut self) {
        self.loaded = false;
    }

    pub fn reset(&mut self, keys: Vec<TenantKey>) {
        self.keys = keys;
        self.loaded = true;
        self.rewind();
    }

    /// Start a new pass in a new order.
    pub fn rewind(&mut self) {
        self.keys.shuffle(&mut rand::rng());
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Next key of the current pass; `None` once the pass is exhausted.
    pub fn next(&mut self) -> Option<TenantKey> {
        let key = self.keys.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(key)
    }
}
