use tokio::sync::mpsc;

/// Application lifecycle transitions reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  /// App came to the foreground
  Foreground,
  /// App is about to be suspended
  Background,
}

/// Receiving end of the lifecycle channel, consumed by the sync scheduler
pub struct LifecycleEvents {
  rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl LifecycleEvents {
  /// Create the channel. The sender goes to the platform integration; the
  /// stream ends once every sender is dropped.
  pub fn channel() -> (mpsc::UnboundedSender<LifecycleEvent>, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { rx })
  }

  /// Receive the next event, None once the platform side is gone
  pub async fn next(&mut self) -> Option<LifecycleEvent> {
    self.rx.recv().await
  }
}
