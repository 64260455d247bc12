use std::io::{self, Write};
use std::time::Duration;

use eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use market::HttpMarketplace;
use market_core::model::Session;
use market_core::ports::AuthApi;

use crate::errors::custom::{classify, ClientError};
use crate::local_store::{clear_session, load_session, persist_session, PersistSession};

/// Sign-in flow: reuse the stored session when the backend still accepts
/// its token, otherwise run the interactive prompt. The returned session
/// is installed in the engine's session store and persisted locally.
pub async fn run(api: &HttpMarketplace) -> Result<Session> {
    if let Some(stored) = load_session().await? {
        let candidate = Session {
            token: stored.token,
            user: stored.profile,
        };
        api.session().install(candidate.clone());

        let spinner = progress_spinner("Checking stored session");
        match api.fetch_me().await {
            Ok(profile) => {
                spinner.finish_with_message(format!("Signed in as {}", profile.username));
                return Ok(Session {
                    token: candidate.token,
                    user: profile,
                });
            }
            Err(_) => {
                // 401 already cleared the in-memory session; drop the
                // stale local copy too
                spinner.finish_with_message("Stored session expired");
                clear_session().await?;
            }
        }
    }
    interactive(api).await
}

async fn interactive(api: &HttpMarketplace) -> Result<Session> {
    println!("Sello marketplace sign-in");
    println!("=========================\n");

    loop {
        let register = prompt_mode()?;
        let username = prompt_non_empty("Username: ")?;
        let password = rpassword::prompt_password("Password: ")?;
        if password.trim().is_empty() {
            println!("Password cannot be empty. Try again.\n");
            continue;
        }

        if register {
            let spinner = progress_spinner("Creating account");
            match api.register(&username, &password).await {
                Ok(profile) => {
                    spinner.finish_with_message(format!("Account {} created", profile.username))
                }
                Err(err) => {
                    spinner.finish_with_message("Registration failed");
                    print_api_error(&err);
                    continue;
                }
            }
        }

        let spinner = progress_spinner("Signing in");
        match api.login(&username, &password).await {
            Ok(session) => {
                spinner.finish_with_message(format!("Welcome back, {}", session.user.username));
                persist_session(&PersistSession {
                    token: &session.token,
                    profile: &session.user,
                    secret: None,
                })
                .await?;
                return Ok(session);
            }
            Err(err) => {
                spinner.finish_with_message("Sign-in failed");
                print_api_error(&err);
                println!();
            }
        }
    }
}

fn prompt_mode() -> Result<bool> {
    loop {
        println!("Choose an option:");
        println!("  1) Sign in");
        println!("  2) Create a new account");
        print!("Selection [1/2]: ");
        io::stdout().flush().ok();
        let mut selection = String::new();
        io::stdin().read_line(&mut selection)?;
        match selection.trim() {
            "1" | "" => return Ok(false),
            "2" => return Ok(true),
            _ => println!("Invalid selection. Please choose 1 or 2.\n"),
        }
    }
}

fn prompt_non_empty(prompt: &str) -> Result<String> {
    loop {
        print!("{}", prompt);
        io::stdout().flush().ok();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            println!("Value cannot be empty. Try again.\n");
            continue;
        }
        return Ok(trimmed.to_string());
    }
}

fn print_api_error(err: &anyhow::Error) {
    match classify(err) {
        ClientError::InvalidCredentials => println!("Invalid username or password."),
        ClientError::HttpStatusError { text, .. } if !text.is_empty() => println!("{}", text),
        other => println!("{}", other),
    }
}

fn progress_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["|", "/", "-", "\\"])
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
