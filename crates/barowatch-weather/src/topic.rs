//! Publish/subscribe channels for weather notifications.

use parking_lot::Mutex;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 16;

/// Fan-out of every published value to all current subscribers.
#[derive(Debug)]
pub struct Topic<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers reached.
    pub fn publish(&self, value: T) -> usize {
        // No subscribers is not an error
        self.sender.send(value).unwrap_or(0)
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A topic that remembers its value and drops repeats.
#[derive(Debug)]
pub struct DistinctTopic<T: Clone + PartialEq> {
    current: Mutex<T>,
    topic: Topic<T>,
}

impl<T: Clone + PartialEq> DistinctTopic<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Mutex::new(initial),
            topic: Topic::new(),
        }
    }

    pub fn get(&self) -> T {
        self.current.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.topic.subscribe()
    }

    /// Publishes only when `value` differs from the current one. Returns whether it did.
    pub fn publish(&self, value: T) -> bool {
        let mut current = self.current.lock();
        if *current == value {
            return false;
        }
        *current = value.clone();
        // Sent under the lock so subscribers see changes in order
        self.topic.publish(value);
        true
    }
}
