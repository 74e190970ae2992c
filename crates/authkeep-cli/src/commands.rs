//! Command parsing and execution.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use tracing::warn;

use authkeep_core::{Config, RegisterData, SessionManager};

use crate::display::{describe_status, describe_user};

/// Username override, checked before the last used username
const ENV_USERNAME: &str = "AUTHKEEP_USERNAME";

/// Password for non-interactive logins
const ENV_PASSWORD: &str = "AUTHKEEP_PASSWORD";

pub const USAGE: &str = "\
Usage: authkeep <command>

Commands:
  login [username]                      Sign in and store the session
  logout                                Revoke and forget the session
  register <username> <email> [name]    Create an account (does not sign in)
  refresh                               Renew the access token
  whoami                                Fetch and show the signed-in user
  status                                Show the stored session
  passwd                                Change the account password
  help                                  Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: Option<String> },
    Logout,
    Register {
        username: String,
        email: String,
        full_name: Option<String>,
    },
    Refresh,
    Whoami,
    Status,
    Passwd,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Status);
        };

        let command = match name.as_str() {
            "login" => Command::Login {
                username: rest.first().cloned(),
            },
            "logout" => Command::Logout,
            "register" => match rest {
                [username, email, name @ ..] => Command::Register {
                    username: username.clone(),
                    email: email.clone(),
                    full_name: if name.is_empty() { None } else { Some(name.join(" ")) },
                },
                _ => bail!("register needs a username and an email"),
            },
            "refresh" => Command::Refresh,
            "whoami" => Command::Whoami,
            "status" => Command::Status,
            "passwd" => Command::Passwd,
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("Unknown command: {}", other),
        };
        Ok(command)
    }
}

pub async fn run(command: Command, manager: &SessionManager, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username } => login(manager, config, username).await,
        Command::Logout => {
            manager.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Register {
            username,
            email,
            full_name,
        } => register(manager, username, email, full_name).await,
        Command::Refresh => {
            manager.refresh().await?;
            println!("Access token renewed.");
            Ok(())
        }
        Command::Whoami => whoami(manager).await,
        Command::Status => {
            println!("{}", describe_status(&manager.snapshot(), manager.phase()));
            Ok(())
        }
        Command::Passwd => passwd(manager).await,
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

async fn login(manager: &SessionManager, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var(ENV_USERNAME).ok())
        .filter(|u| !u.trim().is_empty())
    {
        Some(u) => u,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(p) if !p.is_empty() => p,
        _ => rpassword::prompt_password("Password: ")?,
    };

    println!("Authenticating...");
    manager.login(&username, &password).await?;

    config.last_username = Some(username.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    match manager.snapshot().user {
        Some(user) => println!("Logged in as {}", describe_user(&user)),
        None => println!("Logged in as {} (profile not loaded)", username),
    }
    Ok(())
}

async fn register(
    manager: &SessionManager,
    username: String,
    email: String,
    full_name: Option<String>,
) -> Result<()> {
    let password = prompt_new_password("Password: ")?;
    let data = RegisterData {
        username,
        email,
        password,
        full_name,
    };

    let user = manager.register(&data).await?;
    println!("Created {}", describe_user(&user));
    println!("Run `authkeep login {}` to sign in.", user.username);
    Ok(())
}

async fn whoami(manager: &SessionManager) -> Result<()> {
    if !manager.snapshot().is_authenticated {
        println!("Not logged in.");
        return Ok(());
    }

    manager.ensure_fresh().await?;
    match manager.fetch_user_data().await? {
        Some(user) => println!("{}", describe_user(&user)),
        None => match manager.snapshot().user {
            // Token was renewed or the service is unreachable; show what we have
            Some(user) => println!("{} (cached)", describe_user(&user)),
            None => println!("Logged in, profile unavailable. Try again."),
        },
    }
    Ok(())
}

async fn passwd(manager: &SessionManager) -> Result<()> {
    let current = rpassword::prompt_password("Current password: ")?;
    let new = prompt_new_password("New password: ")?;
    manager.change_password(&current, &new).await?;
    println!("Password changed.");
    Ok(())
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (false, _) => Ok(input.to_string()),
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => Err(anyhow!("Username required")),
    }
}

fn prompt_new_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt)?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults_to_status() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Status);
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { username: None }
        );
        assert_eq!(
            Command::parse(&args(&["login", "alice"])).unwrap(),
            Command::Login {
                username: Some("alice".to_string())
            }
        );
    }

    #[test]
    fn test_parse_register() {
        assert_eq!(
            Command::parse(&args(&["register", "alice", "alice@example.com", "Alice", "Liddell"])).unwrap(),
            Command::Register {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: Some("Alice Liddell".to_string()),
            }
        );
        assert_eq!(
            Command::parse(&args(&["register", "alice", "alice@example.com"])).unwrap(),
            Command::Register {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: None,
            }
        );
        assert!(Command::parse(&args(&["register", "alice"])).is_err());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(Command::parse(&args(&["frobnicate"])).is_err());
        assert_eq!(Command::parse(&args(&["--help"])).unwrap(), Command::Help);
    }
}
