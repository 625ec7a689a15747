// Timeline-point based deletion queue.
//
// Ported from the renderer's own deletion queue: items are scheduled
// against a future timeline value and released in bulk once that value
// has been observed signaled by the device's timeline semaphore. This
// is the mechanism behind the render command list's deferred
// deallocation queue and the render command allocator's reset-refusal
// rule.

pub trait Droppable {}
impl<T> Droppable for T {}

struct TimelinePointQueue {
    sync_point: u64,
    items: Vec<Box<dyn Droppable + Send + Sync>>,
}

pub struct DeletionQueue {
    last_signaled: u64,
    point_queues: Vec<TimelinePointQueue>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self {
            last_signaled: 0,
            point_queues: Vec::new(),
        }
    }

    /// Schedules `item` to be dropped once `sync_point` has been
    /// signaled. If that point is already known to have passed, the
    /// item is dropped immediately instead of being queued.
    pub fn schedule_drop_at_point(&mut self, item: Box<dyn Droppable + Send + Sync>, sync_point: u64) {
        if sync_point <= self.last_signaled {
            return;
        }

        if let Some(queue) = self
            .point_queues
            .iter_mut()
            .find(|q| q.sync_point == sync_point)
        {
            queue.items.push(item);
            return;
        }

        self.point_queues.push(TimelinePointQueue {
            sync_point,
            items: vec![item],
        });
    }

    /// Releases every item scheduled at or before `sync_point`,
    /// including queues for points earlier than this one.
    pub fn drop_all_at_point(&mut self, sync_point: u64) {
        self.last_signaled = sync_point;
        self.point_queues.retain(|q| q.sync_point > sync_point);
    }

    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);
    impl Drop for Counter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn items_survive_until_their_point_is_reached() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut queue = DeletionQueue::new();

        queue.schedule_drop_at_point(Box::new(Counter(dropped.clone())), 5);
        queue.drop_all_at_point(4);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);

        queue.drop_all_at_point(5);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn already_passed_points_drop_immediately() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut queue = DeletionQueue::new();
        queue.drop_all_at_point(10);

        queue.schedule_drop_at_point(Box::new(Counter(dropped.clone())), 3);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
}
