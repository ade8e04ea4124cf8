/// Key schema for one stream in the shared store.
///
/// Four keys are derived from the opaque stream id by suffix. The bare id
/// holds the byte log itself; the `:id` marker is the registration whose
/// absence means the stream is unknown (or expired); `:done` and `:kill`
/// are the terminal markers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Channel(String);

impl Channel {
    /// Wraps a stream id.
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    /// The opaque stream id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Key of the append-only byte log.
    #[must_use]
    pub fn log_key(&self) -> String {
        self.0.clone()
    }

    /// Key of the registration marker.
    #[must_use]
    pub fn registration_key(&self) -> String {
        format!("{}:id", self.0)
    }

    /// Key of the clean-completion marker.
    #[must_use]
    pub fn done_key(&self) -> String {
        format!("{}:done", self.0)
    }

    /// Key of the forced-termination marker.
    #[must_use]
    pub fn kill_key(&self) -> String {
        format!("{}:kill", self.0)
    }

    /// Pub/sub topic carrying wakeups for this stream.
    #[must_use]
    pub fn topic(&self) -> String {
        self.0.clone()
    }
}
