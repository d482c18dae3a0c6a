use std::sync::{Arc, Mutex};

use myftp_core::CancelToken;

/// Routes Ctrl-C: the running transfer is cancelled if there is one,
/// otherwise the whole process shuts down.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    active: Arc<Mutex<Option<CancelToken>>>,
    shutdown: CancelToken,
}

/// Marks a transfer as active until dropped.
pub struct TransferScope {
    active: Arc<Mutex<Option<CancelToken>>>,
    token: CancelToken,
}

impl TransferScope {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for TransferScope {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_transfer(&self) -> TransferScope {
        let token = CancelToken::new();
        if let Ok(mut active) = self.active.lock() {
            *active = Some(token.clone());
        }
        TransferScope {
            active: self.active.clone(),
            token,
        }
    }

    /// Returns `true` when a transfer absorbed the interrupt.
    pub fn interrupt(&self) -> bool {
        let active = self.active.lock().ok().and_then(|mut a| a.take());
        match active {
            Some(token) => {
                token.cancel();
                true
            }
            None => {
                self.shutdown.cancel();
                false
            }
        }
    }

    pub fn shutdown(&self) -> &CancelToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_cancels_active_transfer_first() {
        let interrupts = Interrupts::new();
        let scope = interrupts.begin_transfer();

        assert!(interrupts.interrupt());
        assert!(scope.token().is_cancelled());
        assert!(!interrupts.shutdown().is_cancelled());

        // The transfer already took its interrupt; the next one shuts down.
        assert!(!interrupts.interrupt());
        assert!(interrupts.shutdown().is_cancelled());
    }

    #[test]
    fn finished_transfer_no_longer_absorbs_interrupts() {
        let interrupts = Interrupts::new();
        drop(interrupts.begin_transfer());
        assert!(!interrupts.interrupt());
        assert!(interrupts.shutdown().is_cancelled());
    }
}
