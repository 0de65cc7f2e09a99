use serde::Deserialize;

pub const CONNECTED_PLACEHOLDER: &str = "Gmail connected";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub email: Option<String>,
}

/// What the single auth button does for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Destructive,
}

/// A login or logout request that has not come back yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Login,
    Logout,
}

impl AuthState {
    pub fn signed_in(email: Option<String>) -> Self {
        AuthState { authenticated: true, email }
    }

    pub fn signed_out() -> Self {
        AuthState::default()
    }

    pub fn primary_action(&self) -> PrimaryAction {
        if self.authenticated {
            PrimaryAction::Logout
        } else {
            PrimaryAction::Login
        }
    }
}

/// Where a finished login or logout leaves the auth state, and what to tell
/// the user about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub state: AuthState,
    pub message: &'static str,
    pub succeeded: bool,
}

/// `reply` is the state reported by `/auth/gmail`, or the transport error.
pub fn settle_login(reply: Result<AuthState, String>) -> Settled {
    match reply {
        Ok(state) if state.authenticated => Settled {
            state,
            message: "Successfully authenticated with Gmail!",
            succeeded: true,
        },
        Ok(_) => Settled {
            state: AuthState::signed_out(),
            message: "Authentication failed. Please try again.",
            succeeded: false,
        },
        Err(_) => Settled {
            state: AuthState::signed_out(),
            message: "Authentication failed. Make sure server is running.",
            succeeded: false,
        },
    }
}

/// A failed logout leaves `previous` in place.
pub fn settle_logout(previous: &AuthState, reply: Result<bool, String>) -> Settled {
    match reply {
        Ok(true) => Settled {
            state: AuthState::signed_out(),
            message: "Successfully logged out. Gmail access revoked.",
            succeeded: true,
        },
        Ok(false) | Err(_) => Settled {
            state: previous.clone(),
            message: "Logout failed. Please try again.",
            succeeded: false,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthView {
    pub indicator_on: bool,
    pub status_text: String,
    pub identity: String,
    pub button_label: String,
    pub button_style: ButtonStyle,
    pub busy: bool,
}

impl AuthView {
    pub fn render(state: &AuthState) -> Self {
        if state.authenticated {
            AuthView {
                indicator_on: true,
                status_text: "Authenticated".to_string(),
                identity: state
                    .email
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| CONNECTED_PLACEHOLDER.to_string()),
                button_label: "Logout".to_string(),
                button_style: ButtonStyle::Destructive,
                busy: false,
            }
        } else {
            AuthView {
                indicator_on: false,
                status_text: "Not authenticated".to_string(),
                identity: String::new(),
                button_label: "Authenticate".to_string(),
                button_style: ButtonStyle::Primary,
                busy: false,
            }
        }
    }

    /// Overlay the in-flight labels on top of the settled view.
    pub fn with_pending(mut self, pending: Option<Pending>) -> Self {
        match pending {
            Some(Pending::Login) => {
                self.button_label = "Authenticating...".to_string();
                self.status_text = "Connecting...".to_string();
                self.busy = true;
            }
            Some(Pending::Logout) => {
                self.button_label = "Logging out...".to_string();
                self.busy = true;
            }
            None => {}
        }
        self
    }
}
