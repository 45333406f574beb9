/// Session lifecycle notifications, delivered over a broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    /// The refresh failed or the server kept rejecting the token. The user has
    /// to log in again.
    Expired,
    LoggedOut,
}
