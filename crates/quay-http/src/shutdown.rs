use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Handle to stop a running server from any thread.
///
/// The server notices the request at the latest once its current poll times out.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
