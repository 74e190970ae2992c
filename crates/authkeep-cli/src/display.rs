//! Output formatting for session state.

use authkeep_core::{SessionPhase, SessionSnapshot, User};

/// Characters of a token shown before the mask
const TOKEN_PREFIX_LEN: usize = 6;

/// Show only the start of a token so it can be told apart but not reused.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
    if visible.len() == token.len() {
        "*".repeat(token.chars().count().max(1))
    } else {
        format!("{}…", visible)
    }
}

pub fn describe_user(user: &User) -> String {
    let mut line = format!("{} <{}> (id {})", user.display_name(), user.email, user.id);
    if user.display_name() != user.username {
        line.push_str(&format!(" [{}]", user.username));
    }
    if user.is_superuser {
        line.push_str(" superuser");
    }
    if !user.is_active {
        line.push_str(" inactive");
    }
    line
}

pub fn describe_status(snapshot: &SessionSnapshot, phase: SessionPhase) -> String {
    let mut lines = vec![format!("Session: {}", phase)];
    match &snapshot.user {
        Some(user) => lines.push(format!("User:    {}", describe_user(user))),
        None if snapshot.is_authenticated => lines.push("User:    (not loaded)".to_string()),
        None => {}
    }
    if let Some(access) = &snapshot.access_token {
        lines.push(format!("Access:  {}", mask_token(access)));
    }
    if let Some(refresh) = &snapshot.refresh_token {
        lines.push(format!("Refresh: {}", mask_token(refresh)));
    }
    lines.join("\n")
}
