//! Per-credential crawl session state machine
//!
//! `NotLoggedIn -> LoginSubmitted -> Redirected -> OnShowsPage -> OnSeancePage* -> Done`,
//! with `LoginFailed` as the only failure state the runner reports by name.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NotLoggedIn,
    LoginSubmitted,
    /// Current URL matched the post-login host pattern
    Redirected,
    OnShowsPage,
    OnSeancePage { show: String },
    Done,
    LoginFailed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use SessionState::{
            Done, LoginFailed, LoginSubmitted, NotLoggedIn, OnSeancePage, OnShowsPage, Redirected,
        };
        matches!(
            (self, next),
            (NotLoggedIn, LoginSubmitted)
                | (LoginSubmitted, Redirected | LoginFailed)
                | (Redirected, OnShowsPage)
                | (OnShowsPage | OnSeancePage { .. }, OnSeancePage { .. } | Done)
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::LoginFailed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoggedIn => write!(f, "not-logged-in"),
            Self::LoginSubmitted => write!(f, "login-submitted"),
            Self::Redirected => write!(f, "redirected"),
            Self::OnShowsPage => write!(f, "on-shows-page"),
            Self::OnSeancePage { show } => write!(f, "on-seance-page({show})"),
            Self::Done => write!(f, "done"),
            Self::LoginFailed => write!(f, "login-failed"),
        }
    }
}
