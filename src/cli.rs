use crate::auth::{AuthError, AuthGate, CredentialStatus, SecurityStatus};
use crate::config::StatePaths;
use crate::prompt::Prompter;
use anyhow::Result;
use chrono::Local;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use zeroize::Zeroizing;

pub struct Context<P: Prompter> {
    pub gate: AuthGate,
    pub paths: StatePaths,
    pub prompter: RefCell<P>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Interactive loop for an authenticated operator.
///
/// The session is held for the whole loop and released on every way out.
pub fn run_repl<P: Prompter>(ctx: &Context<P>) -> Result<()> {
    let _guard = ctx.gate.session_guard();
    let mut rl = DefaultEditor::new()?;
    if rl.load_history(&ctx.paths.history).is_err() {
        tracing::debug!("no console history at {}", ctx.paths.history.display());
    }

    println!("Type 'help' for commands, 'exit' to quit");

    loop {
        if let Err(e) = ctx.gate.check_session() {
            println!("{}", e);
            break;
        }

        match rl.readline("warden> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Idle time spent at the prompt counts
                if let Err(e) = ctx.gate.check_session() {
                    println!("{}", e);
                    break;
                }
                ctx.gate.touch_session();
                rl.add_history_entry(line)?;

                if handle_command(ctx, line) == Flow::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!();
                ctx.gate.interrupt();
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&ctx.paths.history) {
        tracing::warn!("could not save console history: {}", e);
    }
    Ok(())
}

pub fn handle_command<P: Prompter>(ctx: &Context<P>, cmd: &str) -> Flow {
    let Some(name) = cmd.split_whitespace().next() else {
        return Flow::Continue;
    };
    match name.to_ascii_lowercase().as_str() {
        "exit" | "quit" => {
            if let Err(e) = ctx.gate.logout() {
                eprintln!("Error: {}", e);
            }
            println!("Goodbye!");
            return Flow::Exit;
        }
        "logout" => {
            if let Err(e) = ctx.gate.logout() {
                eprintln!("Error: {}", e);
            }
            println!("Logged out.");
            return Flow::Exit;
        }
        "help" => {
            println!("Commands:");
            println!("  help        - show commands");
            println!("  status      - show security status");
            println!("  session     - show session details");
            println!("  changepass  - change the console password");
            println!("  logout      - end the session");
            println!("  exit, quit  - end the session and leave");
        }
        "status" => {
            print!("{}", format_status(&ctx.gate.status()));
        }
        "session" => match ctx.gate.status().session {
            Some(session) => {
                println!("Session: {}", session.id);
                println!(
                    "Started: {}",
                    session.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                );
                println!(
                    "Last activity: {}",
                    session
                        .last_activity
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S")
                );
            }
            None => println!("No active session"),
        },
        "changepass" => match change_password(ctx) {
            Ok(true) => println!("Password changed successfully!"),
            Ok(false) => println!("Password change cancelled."),
            Err(AuthError::InvalidCredential) => {
                println!("Current password is incorrect. Password not changed.")
            }
            Err(e) => println!("Password not changed: {}", e),
        },
        _ => {
            println!("Unknown command: {}. Type 'help' for commands.", name);
        }
    }
    Flow::Continue
}

/// Prompt for the current and new password, then hand both to the gate.
/// Returns `Ok(false)` if the operator cancelled.
fn change_password<P: Prompter>(ctx: &Context<P>) -> Result<bool, AuthError> {
    let mut prompter = ctx.prompter.borrow_mut();

    let Some(current) = prompter.secret("Current password: ")? else {
        return Ok(false);
    };

    let new: Zeroizing<String> = loop {
        let Some(new) = prompter.secret("New password: ")? else {
            return Ok(false);
        };
        if let Err(violation) = ctx.gate.policy().check(&new) {
            prompter.say(&violation.to_string());
            continue;
        }
        let Some(confirm) = prompter.secret("Confirm new password: ")? else {
            return Ok(false);
        };
        if *new != *confirm {
            prompter.say(&AuthError::PasswordMismatch.to_string());
            continue;
        }
        break new;
    };

    ctx.gate.change_password(&current, &new)?;
    Ok(true)
}

pub fn format_status(status: &SecurityStatus) -> String {
    let mut out = String::new();

    let password = match status.credential {
        CredentialStatus::Missing => "not set",
        CredentialStatus::Set => "set",
        CredentialStatus::Unreadable => "unreadable",
    };
    out.push_str(&format!("Password: {}\n", password));

    match (&status.session, status.session_remaining) {
        (Some(session), Some(remaining)) => out.push_str(&format!(
            "Session: active ({}), expires in {}\n",
            session.short_id(),
            format_secs(remaining.num_seconds().max(0) as u64)
        )),
        (Some(_), None) => out.push_str("Session: expired\n"),
        (None, _) => out.push_str("Session: none\n"),
    }

    out.push_str(&format!("Failed attempts: {}\n", status.failed_attempts));
    match status.locked_for_secs {
        Some(secs) => out.push_str(&format!("Locked: yes ({} remaining)\n", format_secs(secs))),
        None => out.push_str("Locked: no\n"),
    }
    out
}

fn format_secs(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{cheap_hashing, AuthState, Session};
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::prompt::ScriptedPrompter;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn logged_in(answers: &[&str]) -> (TempDir, Context<ScriptedPrompter>) {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            hashing: cheap_hashing(),
            ..Default::default()
        };
        let gate = AuthGate::with_clock(&config, Arc::new(ManualClock::new())).unwrap();
        let mut setup = ScriptedPrompter::new(&["abc123", "abc123"]);
        assert!(gate.authenticate(&mut setup).unwrap().is_granted());

        let ctx = Context {
            gate,
            paths: config.paths(),
            prompter: RefCell::new(ScriptedPrompter::new(answers)),
        };
        (dir, ctx)
    }

    #[test]
    fn test_exit_and_logout_end_session() {
        for cmd in ["exit", "quit", "logout", "EXIT", "Quit", "Logout"] {
            let (_dir, ctx) = logged_in(&[]);
            assert_eq!(handle_command(&ctx, cmd), Flow::Exit);
            assert_eq!(ctx.gate.state(), AuthState::Exited);
            assert!(!ctx.gate.is_session_valid());
        }
    }

    #[test]
    fn test_informational_commands_continue() {
        let (_dir, ctx) = logged_in(&[]);
        for cmd in ["help", "status", "session", "bogus", "status extra"] {
            assert_eq!(handle_command(&ctx, cmd), Flow::Continue);
        }
        assert!(ctx.gate.is_authenticated());
    }

    #[test]
    fn test_changepass_reprompts_until_valid() {
        let (_dir, ctx) = logged_in(&[
            "abc123", "weak", "newpass9", "other999", "newpass9", "newpass9",
        ]);

        assert_eq!(handle_command(&ctx, "changepass"), Flow::Continue);

        let prompter = ctx.prompter.borrow();
        assert_eq!(prompter.remaining(), 0);
        assert!(prompter.said("at least 6 characters"));
        assert!(prompter.said("Passwords do not match"));
        drop(prompter);

        // The new password is now required to change it again
        ctx.prompter
            .replace(ScriptedPrompter::new(&["abc123", "third333", "third333"]));
        assert!(matches!(
            change_password(&ctx),
            Err(AuthError::InvalidCredential)
        ));
        ctx.prompter
            .replace(ScriptedPrompter::new(&["newpass9", "third333", "third333"]));
        assert!(change_password(&ctx).unwrap());
    }

    #[test]
    fn test_changepass_cancel_keeps_password() {
        let (_dir, ctx) = logged_in(&["abc123", "newpass9"]);
        assert!(!change_password(&ctx).unwrap());

        ctx.prompter
            .replace(ScriptedPrompter::new(&["abc123", "again123", "again123"]));
        assert!(change_password(&ctx).unwrap());
    }

    #[test]
    fn test_format_status_active_session() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let status = SecurityStatus {
            credential: CredentialStatus::Set,
            failed_attempts: 1,
            locked_for_secs: None,
            session: Some(Session {
                id: "0123456789abcdef".to_string(),
                start_time: now,
                last_activity: now,
            }),
            session_remaining: Some(Duration::seconds(3540)),
        };

        let text = format_status(&status);
        assert!(text.contains("Password: set"));
        assert!(text.contains("Session: active (01234567), expires in 59m 00s"));
        assert!(text.contains("Failed attempts: 1"));
        assert!(text.contains("Locked: no"));
    }

    #[test]
    fn test_format_status_locked() {
        let status = SecurityStatus {
            credential: CredentialStatus::Unreadable,
            failed_attempts: 3,
            locked_for_secs: Some(42),
            session: None,
            session_remaining: None,
        };

        let text = format_status(&status);
        assert!(text.contains("Password: unreadable"));
        assert!(text.contains("Session: none"));
        assert!(text.contains("Locked: yes (42s remaining)"));
    }
}
