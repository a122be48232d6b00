//! RT-safe deferred deallocation of retired effect nodes
//!
//! A process-wide `basedrop` collector lives on its own thread. Nodes sent
//! to the render half are wrapped in `basedrop::Owned`; when the render half
//! replaces or clears its slot the old node is only enqueued, and its engine
//! and buffers are freed later on the collector thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread frees retired nodes
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("denoise-gc".to_string())
        .spawn(move || {
            // Collector is !Sync and must stay on this thread
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Node GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn node GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for wrapping values in `basedrop::Owned`
///
/// Starts the collector thread on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_deferred_to_collector() {
        let dropped = Arc::new(AtomicBool::new(false));
        let owned = Owned::new(&gc_handle(), DropFlag(dropped.clone()));
        drop(owned);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
