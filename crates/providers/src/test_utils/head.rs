use crate::{Head, HeadBroadcaster};

use std::sync::Arc;
use tokio::sync::broadcast;

/// A [`HeadBroadcaster`] fed by the test.
#[derive(Debug, Clone)]
pub struct MockHeadBroadcaster {
    sender: broadcast::Sender<Arc<Head>>,
}

impl Default for MockHeadBroadcaster {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }
}

impl MockHeadBroadcaster {
    /// Returns a new [`MockHeadBroadcaster`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts the head to the current subscribers, returning their count.
    pub fn broadcast(&self, head: Head) -> usize {
        self.sender.send(Arc::new(head)).unwrap_or_default()
    }
}

impl HeadBroadcaster for MockHeadBroadcaster {
    fn subscribe(&self) -> broadcast::Receiver<Arc<Head>> {
        self.sender.subscribe()
    }
}
