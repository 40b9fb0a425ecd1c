//! Marquee CLI entry point

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use marquee::api::ApiClient;
use marquee::auth::{generate_state, RefreshState, SessionManager};
use marquee::config::Config;
use marquee::ui;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "Sign in to and query a media-tracking API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the OAuth application credentials
    Configure,

    /// Sign in (device code by default)
    Login {
        /// Use the browser authorization-code flow instead of a device code
        #[arg(long)]
        browser: bool,
    },

    /// Sign out and remove stored tokens
    Logout {
        /// Also revoke the access token on the server
        #[arg(long)]
        revoke: bool,
    },

    /// Show the session status
    Status,

    /// Refresh the access token now
    Refresh,

    /// List trending movies
    Trending {
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Configure => {
            marquee::config::configure()?;
            println!("\nNext: marquee login");
        }

        Commands::Login { browser } => {
            let session = open_session()?;
            if browser {
                run_browser_login(&session).await?;
            } else {
                run_device_login(&session).await?;
            }
        }

        Commands::Logout { revoke } => {
            let session = open_session()?;
            if revoke {
                if let Err(e) = session.revoke().await {
                    ui::print_warning(&format!("Server-side revocation failed: {}", e));
                }
            } else {
                session.sign_out();
            }
            ui::print_success("Logged out");
        }

        Commands::Status => {
            let session = open_session()?;
            run_status(&session).await?;
        }

        Commands::Refresh => {
            let session = open_session()?;
            match session.get_access_token_from_refresh_token().await {
                Ok(()) => {
                    if let Some(credential) = session.credential() {
                        ui::print_success(&format!("Token refreshed, valid until {}", credential.expires_at));
                    }
                }
                Err(e) => {
                    ui::print_error(e.user_message());
                    return Err(e.into());
                }
            }
        }

        Commands::Trending { page, limit } => {
            let session = open_session()?;
            let api = ApiClient::new(session);
            let trending = api.trending_movies(page, limit).await?;

            for entry in &trending.items {
                let year = entry.movie.year.map(|y| format!(" ({})", y)).unwrap_or_default();
                println!(
                    "  {:>5}  {}{}",
                    entry.watchers.to_string().cyan(),
                    entry.movie.title.bold(),
                    year
                );
            }
            if let Some(pagination) = trending.pagination {
                println!("\n  page {}/{}", pagination.page, pagination.page_count);
            }
        }
    }

    Ok(())
}

fn open_session() -> Result<SessionManager> {
    let config: Config = marquee::config::load()?;
    config.validate()?;
    Ok(SessionManager::from_config(config))
}

async fn run_device_login(session: &SessionManager) -> Result<()> {
    ui::print_thinking("Requesting a device code");
    let code = session
        .request_device_code()
        .await
        .ok_or_else(|| anyhow!("Could not sign in, try again."))?;

    ui::print_user_code(&code.user_code, &code.verification_url);
    if let Err(e) = open::that(&code.verification_url) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    let poll = session.poll_for_device_token(code);

    // Ctrl+C abandons the sign-in
    let cancel = poll.cancellation_token();
    ctrlc::set_handler(move || cancel.cancel()).ok();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("  {spinner:.magenta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Waiting for approval");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut progress = poll.progress();
    let ticker = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let attempts = *progress.borrow_and_update();
                spinner.set_message(format!("Waiting for approval (attempt {})", attempts));
            }
        })
    };

    let result = poll.wait().await;
    ticker.abort();
    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            ui::print_success("Signed in");
            Ok(())
        }
        Err(e) => {
            ui::print_error(e.user_message());
            Err(e.into())
        }
    }
}

async fn run_browser_login(session: &SessionManager) -> Result<()> {
    let state = generate_state();
    let url = session.authorize_url(&state)?;

    println!("\n  Opening browser for authorization...\n");
    println!("  If the browser doesn't open, visit this URL:\n  {}\n", url);
    if let Err(e) = open::that(url.as_str()) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    let code = inquire::Text::new("Paste the authorization code:").prompt()?;

    ui::print_thinking("Exchanging code");
    match session.exchange_authorization_code(code.trim()).await {
        Ok(()) => {
            ui::print_success("Signed in");
            Ok(())
        }
        Err(e) => {
            ui::print_error(e.user_message());
            Err(e.into())
        }
    }
}

async fn run_status(session: &SessionManager) -> Result<()> {
    ui::print_header("Status");

    let state = session.refresh_state();
    match state {
        RefreshState::NoTokens => {
            ui::print_step("Not signed in (run 'marquee login')");
            return Ok(());
        }
        RefreshState::ExpiredTokens => {
            ui::print_warning("Session expired, please sign in again.");
            return Ok(());
        }
        RefreshState::ValidTokens | RefreshState::RefreshTokens => {}
    }

    if let Some(credential) = session.credential() {
        ui::print_step(&format!("Token valid until {}", credential.expires_at));
    }

    if let Err(e) = session.check_to_refresh().await {
        ui::print_error(e.user_message());
        return Err(e.into());
    }
    if state == RefreshState::RefreshTokens {
        ui::print_success("Token refreshed");
    }

    let api = ApiClient::new(session.clone());
    let settings = api.user_settings().await?;
    ui::print_success(&format!("Signed in as {}", settings.user.username));

    Ok(())
}
