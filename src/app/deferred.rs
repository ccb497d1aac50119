// End-of-frame task queue

use std::collections::VecDeque;

pub type DeferredTask = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct DeferredQueue {
    tasks: VecDeque<DeferredTask>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: DeferredTask) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Detach the queued batch, leaving the queue empty.
    pub fn take_batch(&mut self) -> VecDeque<DeferredTask> {
        std::mem::take(&mut self.tasks)
    }
}

/// Run a detached batch in FIFO order. Each task runs once and is dropped.
pub fn run_batch(batch: VecDeque<DeferredTask>) -> usize {
    let count = batch.len();
    for task in batch {
        task();
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn batch_runs_in_fifo_order_and_empties_queue() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeferredQueue::new();
        for i in 0..4 {
            let log = log.clone();
            queue.push(Box::new(move || log.borrow_mut().push(i)));
        }

        let ran = run_batch(queue.take_batch());

        assert_eq!(ran, 4);
        assert!(queue.is_empty());
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn tasks_run_exactly_once() {
        let count = Rc::new(RefCell::new(0));
        let mut queue = DeferredQueue::new();
        let c = count.clone();
        queue.push(Box::new(move || *c.borrow_mut() += 1));

        run_batch(queue.take_batch());
        run_batch(queue.take_batch());

        assert_eq!(*count.borrow(), 1);
    }
}
