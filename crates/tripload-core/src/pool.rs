//! Bounded worker pool: shared task queue, fixed number of OS threads, result
//! channel, join barrier.
//!
//! All tasks are queued up front; each worker pops the next task until the
//! queue is empty. Results arrive in completion order. Workers are scoped
//! threads, so tasks may borrow the caller's collaborators.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;

/// Runs `task` over every item with at most `workers` in flight.
///
/// `on_result` is called on the caller's thread as each result arrives (used
/// for progress reporting). Returns every result, in completion order.
pub fn run_bounded<T, R, F, P>(items: Vec<T>, workers: usize, task: F, mut on_result: P) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
    P: FnMut(&R),
{
    let count = items.len();
    if count == 0 {
        return Vec::new();
    }
    let num_workers = workers.max(1).min(count);
    let work: Mutex<VecDeque<T>> = Mutex::new(items.into_iter().collect());
    let (tx, rx) = mpsc::channel::<R>();

    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let tx = tx.clone();
            let work = &work;
            let task = &task;
            scope.spawn(move || loop {
                let next = match work.lock() {
                    Ok(mut q) => q.pop_front(),
                    Err(poisoned) => poisoned.into_inner().pop_front(),
                };
                let Some(item) = next else {
                    break;
                };
                if tx.send(task(item)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(count);
        // Ends early only if a worker panicked; the scope re-raises the panic.
        while let Ok(res) = rx.recv() {
            on_result(&res);
            results.push(res);
        }
        results
    })
}
