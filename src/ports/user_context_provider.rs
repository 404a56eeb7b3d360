//! UserContextProvider port - Interface to the signed-in user.

use tokio::sync::watch;

use crate::domain::foundation::UserContext;

/// Port exposing the current user and a stream of changes.
///
/// Login, logout and user switches are all published on the same channel;
/// `None` means nobody is signed in.
pub trait UserContextProvider: Send + Sync {
    fn current(&self) -> Option<UserContext>;

    /// Receiver that observes every subsequent change.
    fn changes(&self) -> watch::Receiver<Option<UserContext>>;
}
