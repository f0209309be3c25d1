//! Watch entry point (behind `watch` feature).

use crate::datastore::WatchStream;
use crate::types::Revision;

use super::Engine;

impl Engine {
    /// Streams relationship changes committed after the given revision.
    ///
    /// Changes already committed are replayed first; the stream then
    /// follows new writes. Use the checkpoint on each
    /// [`crate::types::WatchEvent`] to resume after a disconnect.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use warrant::Engine;
    /// # async fn example(engine: &Engine) -> Result<(), warrant::Error> {
    /// use tokio_stream::StreamExt;
    ///
    /// let start = engine.head_revision().await?;
    /// let mut stream = engine.watch(start);
    /// while let Some(event) = stream.next().await {
    ///     let event = event?;
    ///     println!("{} updates at {}", event.updates.len(), event.checkpoint);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch(&self, after: Revision) -> WatchStream {
        self.store().watch(after)
    }
}
