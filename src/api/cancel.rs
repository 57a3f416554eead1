// Cooperative cancellation shared between the signal handler and the resolver.
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The first SIGINT/SIGTERM sets the token; a second one exits with status 1.
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM] {
            // Runs before `register`, so it only fires once the flag is already set.
            flag::register_conditional_shutdown(signal, 1, Arc::clone(&self.flag))?;
            flag::register(signal, Arc::clone(&self.flag))?;
        }
        Ok(())
    }
}
