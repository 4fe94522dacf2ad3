//! Navigation signals emitted by the session lifecycle.
//!
//! Routing belongs to the embedding application; the lifecycle only says
//! where the user should go next.

/// Where the application should take the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The main view for a signed-in user.
    Authenticated,
    /// The sign-in entry view.
    Entry,
}

/// Receives navigation signals.
pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: Destination);
}

impl<F> Navigator for F
where
    F: Fn(Destination) + Send + Sync,
{
    fn navigate(&self, destination: Destination) {
        self(destination)
    }
}

/// Ignores navigation signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, destination: Destination) {
        tracing::trace!(?destination, "Navigation signal ignored");
    }
}
