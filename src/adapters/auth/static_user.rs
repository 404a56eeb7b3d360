//! Watch-backed user context provider.
//!
//! The application's credential layer pushes the signed-in user here; the
//! connection manager reads and watches it.

use tokio::sync::watch;

use crate::domain::foundation::UserContext;
use crate::ports::UserContextProvider;

/// `UserContextProvider` whose value is set explicitly.
///
/// # Example
///
/// ```ignore
/// let users = StaticUserContextProvider::signed_in(alice);
/// users.sign_in(bob);   // user switch
/// users.sign_out();     // logout
/// ```
#[derive(Debug)]
pub struct StaticUserContextProvider {
    sender: watch::Sender<Option<UserContext>>,
}

impl StaticUserContextProvider {
    pub fn new(initial: Option<UserContext>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn signed_in(user: UserContext) -> Self {
        Self::new(Some(user))
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    /// Publishes `user` as the current user. Re-publishing the same user is
    /// not reported as a change.
    pub fn sign_in(&self, user: UserContext) {
        self.sender.send_if_modified(|current| {
            if current.as_ref() == Some(&user) {
                return false;
            }
            *current = Some(user);
            true
        });
    }

    pub fn sign_out(&self) {
        self.sender.send_if_modified(|current| current.take().is_some());
    }
}

impl UserContextProvider for StaticUserContextProvider {
    fn current(&self) -> Option<UserContext> {
        self.sender.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<UserContext>> {
        self.sender.subscribe()
    }
}
