use rustc_hash::FxHashSet;
use std::{collections::VecDeque, hash::Hash};

/// A FIFO queue that holds each element at most once.
///
/// Insert and pop are amortized O(1).
#[derive(Clone, Debug)]
pub(crate) struct UniqueQueue<T>
where
  T: Eq + Hash + Clone,
{
  set: FxHashSet<T>,
  queue: VecDeque<T>,
}

impl<T> Default for UniqueQueue<T>
where
  T: Eq + Hash + Clone,
{
  fn default() -> Self {
    UniqueQueue {
      set: FxHashSet::default(),
      queue: VecDeque::new(),
    }
  }
}

impl<T> UniqueQueue<T>
where
  T: Eq + Hash + Clone,
{
  pub(crate) fn insert(&mut self, t: T) {
    if self.set.insert(t.clone()) {
      self.queue.push_back(t);
    }
  }

  pub(crate) fn extend<I>(&mut self, iter: I)
  where
    I: IntoIterator<Item = T>,
  {
    for t in iter {
      self.insert(t);
    }
  }

  pub(crate) fn pop(&mut self) -> Option<T> {
    let res = self.queue.pop_front();
    if let Some(t) = &res {
      self.set.remove(t);
    }
    res
  }

  /// Pops up to `k` elements, oldest first.
  pub(crate) fn pop_batch(&mut self, k: usize) -> Vec<T> {
    let n = k.min(self.queue.len());
    let batch: Vec<T> = self.queue.drain(..n).collect();
    for t in &batch {
      self.set.remove(t);
    }
    batch
  }

  pub(crate) fn len(&self) -> usize {
    self.queue.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    let r = self.queue.is_empty();
    debug_assert_eq!(r, self.set.is_empty());
    r
  }
}
