/// Number of weight buckets: one for zero and one per bit length of a `u64`.
const NUM_BUCKETS: usize = 65;

/// A queue that hands out light entries before heavy ones, approximately.
///
/// Entries are grouped by the bit length of their weight, so all entries whose weights
/// fall in the same power-of-two range are treated as equal. Within a bucket the most
/// recently added entry is visited first. Polling is linear in the number of entries
/// in the worst case, which is fine for the small populations this is meant for
/// (one entry per writer).
///
/// # Examples
///
/// ```
/// use piggy_collections::ApproximatePriorityQueue;
///
/// let mut queue = ApproximatePriorityQueue::new();
/// queue.add("heavy", 1 << 20);
/// queue.add("light", 10);
/// queue.add("skipped", 0);
///
/// assert_eq!(queue.poll(|&e| e != "skipped"), Some("light"));
/// assert_eq!(queue.poll(|_| true), Some("skipped"));
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Clone)]
pub struct ApproximatePriorityQueue<T> {
    buckets: Vec<Vec<T>>,
    len: usize,
}

impl<T> ApproximatePriorityQueue<T> {
    pub fn new() -> ApproximatePriorityQueue<T> {
        ApproximatePriorityQueue {
            buckets: (0..NUM_BUCKETS).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    #[inline]
    fn bucket_of(weight: u64) -> usize {
        (u64::BITS - weight.leading_zeros()) as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(&mut self, entry: T, weight: u64) {
        self.buckets[Self::bucket_of(weight)].push(entry);
        self.len += 1;
    }

    /// Removes and returns the lightest entry accepted by `predicate`.
    pub fn poll(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.poll_map(|e| predicate(e).then_some(()))
            .map(|(entry, _)| entry)
    }

    /// Removes the lightest entry for which `f` returns `Some`, together with that value.
    ///
    /// `f` is invoked on candidates in approximate weight order until it succeeds.
    pub fn poll_map<R>(&mut self, mut f: impl FnMut(&T) -> Option<R>) -> Option<(T, R)> {
        for bucket in self.buckets.iter_mut() {
            for i in (0..bucket.len()).rev() {
                if let Some(r) = f(&bucket[i]) {
                    let entry = bucket.swap_remove(i);
                    self.len -= 1;
                    return Some((entry, r));
                }
            }
        }
        None
    }

    /// Removes the first entry matching `predicate`. Returns whether one was found.
    pub fn remove(&mut self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        for bucket in self.buckets.iter_mut() {
            if let Some(i) = bucket.iter().position(&mut predicate) {
                bucket.swap_remove(i);
                self.len -= 1;
                return true;
            }
        }
        false
    }

    pub fn contains(&self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        self.iter().any(|e| predicate(e))
    }

    /// Iterates over all entries, lightest buckets first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets.iter().flat_map(|bucket| bucket.iter().rev())
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.len = 0;
    }
}

impl<T> Default for ApproximatePriorityQueue<T> {
    fn default() -> Self {
        ApproximatePriorityQueue::new()
    }
}
