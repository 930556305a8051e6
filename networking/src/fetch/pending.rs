/// Single-assignment result slot shared by many waiters.
///
/// A `Promise` is resolved at most once; the first value wins and later
/// resolutions are rejected. Any number of `Waiter`s, created before or
/// after resolution, observe the same value.
use tokio::sync::watch;

#[derive(Debug)]
pub struct Promise<T> {
    slot: watch::Sender<Option<T>>,
}

impl<T: Clone> Promise<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    pub fn waiter(&self) -> Waiter<T> {
        Waiter {
            slot: self.slot.subscribe(),
        }
    }

    /// Store `value` unless a value is already present.
    ///
    /// Returns `false` if the promise had already been resolved.
    pub fn resolve(&self, value: T) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = value.take();
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<T: Clone> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Waiter<T> {
    slot: watch::Receiver<Option<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Wait for the resolved value.
    ///
    /// Returns `None` if the promise was dropped without being resolved.
    pub async fn wait(mut self) -> Option<T> {
        match self.slot.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}
