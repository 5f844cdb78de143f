use std::cmp::Ordering;
use std::collections::VecDeque;

use super::task::TaskPriority;

/// Ordering key of a queued item.
///
/// Lower priority rank dequeues first; ties are broken by the publish
/// sequence number, which gives stable FIFO order within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub priority: TaskPriority,
    pub sequence: u64,
}

impl QueueKey {
    pub const fn new(priority: TaskPriority, sequence: u64) -> Self {
        Self { priority, sequence }
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Priority queue item wrapper
#[derive(Debug, Clone)]
struct QueueItem<T> {
    key: QueueKey,
    item: T,
}

/// Priority-ordered queue for a single topic.
///
/// Items are kept sorted by [`QueueKey`]. Re-inserting an item with its
/// original key (for example after a lease expires) restores its original
/// position relative to everything else in the queue.
///
/// # Examples
///
/// ```
/// use convoy::domain::models::{QueueKey, TaskPriority, TopicQueue};
///
/// let mut queue = TopicQueue::new();
/// queue.enqueue("low", QueueKey::new(TaskPriority::Low, 0));
/// queue.enqueue("critical", QueueKey::new(TaskPriority::Critical, 1));
/// queue.enqueue("medium", QueueKey::new(TaskPriority::Medium, 2));
///
/// assert_eq!(queue.dequeue(), Some("critical"));
/// assert_eq!(queue.dequeue(), Some("medium"));
/// assert_eq!(queue.dequeue(), Some("low"));
/// ```
#[derive(Debug, Clone)]
pub struct TopicQueue<T> {
    items: VecDeque<QueueItem<T>>,
}

impl<T> TopicQueue<T> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Adds an item at the position dictated by its key.
    pub fn enqueue(&mut self, item: T, key: QueueKey) {
        // Items with an equal key cannot occur (sequences are unique), so
        // inserting after every smaller key keeps FIFO for equal priorities.
        let position = self
            .items
            .iter()
            .position(|existing| key < existing.key)
            .unwrap_or(self.items.len());

        self.items.insert(position, QueueItem { key, item });
    }

    /// Removes and returns the most urgent item.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front().map(|queue_item| queue_item.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front().map(|queue_item| &queue_item.item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates items in dequeue order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|queue_item| &queue_item.item)
    }

    /// Removes and returns items matching a predicate, in dequeue order.
    pub fn remove_matching<F>(&mut self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut removed = Vec::new();
        let mut i = 0;

        while i < self.items.len() {
            if predicate(&self.items[i].item) {
                if let Some(queue_item) = self.items.remove(i) {
                    removed.push(queue_item.item);
                }
            } else {
                i += 1;
            }
        }

        removed
    }
}

impl<T> Default for TopicQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
