use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use std::process::ExitCode;
use tradedash::prelude::*;
use tradedash::AuthError;

#[derive(Parser)]
#[clap(name = "tradedash", version, about = "Manage the Tradedash dashboard session")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
        #[clap(long)]
        name: Option<String>,
    },
    /// Show who is signed in
    Status,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// End the session
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    pretty_env_logger::init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                Error::Auth(auth) => eprintln!("{}", auth.user_message()),
                other => eprintln!("{}", other),
            }
            if let Some(status) = err.status() {
                eprintln!("server answered with HTTP {}", status);
            }
            if err.requires_login() {
                eprintln!("run `tradedash login` to sign in again");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), Error> {
    let dashboard = Dashboard::from_env()?;
    dashboard.start().await;
    let session = dashboard.session();

    match command {
        Command::Login { email, password } => {
            session.login(&email, &password).await?;
        }
        Command::Register {
            email,
            password,
            name,
        } => {
            let mut fields = json!({ "email": email, "password": password });
            if let Some(name) = name {
                fields["name"] = json!(name);
            }
            session.register(&fields).await?;
        }
        Command::Status => {}
        Command::Refresh => {
            if !session.has_refresh_token() {
                return Err(Error::Auth(AuthError::MissingSession));
            }
            session.refresh().await?;
        }
        Command::Logout => {
            session.logout().await;
        }
    }

    print_status(&dashboard);
    Ok(())
}

fn print_status(dashboard: &Dashboard) {
    let session = dashboard.session();
    let status = session.status();
    println!("status: {:?}", status);

    if status != AuthStatus::Authenticated {
        return;
    }
    if let Some(claims) = session.claims() {
        println!("role:   {}", claims.role);
        println!("home:   {}", claims.role.landing_path());
    }
    if let Some(identity) = session.identity() {
        println!("user:   {}", identity.display_name());
    }
}
