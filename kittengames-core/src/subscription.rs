// ABOUTME: Scoped listener lifecycle: every registration returns a disposer that runs exactly once
// ABOUTME: SubscriptionSet owns many disposers and closes them together on teardown

use std::fmt;

/// Handle for an active listener registration.
///
/// The disposer runs on [`Subscription::dispose`] or when the handle is
/// dropped, whichever comes first.
pub struct Subscription {
    label: &'static str,
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(label: &'static str, disposer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Subscription for a spawned listener task. Disposing aborts the task.
    pub fn from_task(label: &'static str, handle: tokio::task::JoinHandle<()>) -> Self {
        Self::new(label, move || handle.abort())
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_active(&self) -> bool {
        self.disposer.is_some()
    }

    pub fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            tracing::trace!(listener = self.label, "Disposing listener");
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns a group of subscriptions. Closing (or dropping) the set disposes every
/// member, newest first.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispose the member registered under `label`, if any.
    pub fn remove(&mut self, label: &str) -> bool {
        let Some(index) = self.subscriptions.iter().rposition(|s| s.label == label) else {
            return false;
        };
        self.subscriptions.remove(index).dispose();
        true
    }

    pub fn close_all(&mut self) {
        while let Some(mut subscription) = self.subscriptions.pop() {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.close_all();
    }
}
