//! Management tool for a running launcher.
//!
//! Resolves a connection either from an explicit `--host` or from the
//! connection descriptor a launcher running in the current directory
//! published, issues exactly one control operation, and maps the outcome
//! to a process exit code stable enough for scripting.

use clap::{Args, Parser, Subcommand};
use std::io::Write;
use updating_launcher::control::client::Connector;
use updating_launcher::control::descriptor::ConnectionDescriptor;
use updating_launcher::control::proto::{ErrorKind, Response};
use updating_launcher::errors::Result;

/// Process exit codes, stable for scripting.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    // clap reports usage problems with code 2 on its own.
    pub const COMMAND_NOT_EXECUTED: i32 = 3;
    pub const FAILED_LOGIN: i32 = 10;
}

#[derive(Debug, Parser)]
#[command(
    name = "ul",
    about = "Management tool for UpdatingLauncher",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Starts the managed process.
    #[command(alias = "s")]
    Start(ConnectArgs),
    /// Shows the managed process state and diagnostics.
    Status(ConnectArgs),
}

#[derive(Debug, Args)]
struct ConnectArgs {
    /// Host to connect to, as ip:port. Omit to connect to a launcher
    /// running in the directory the command is run in.
    #[arg(long)]
    host: Option<String>,

    /// Username to use for connecting to the launcher.
    #[arg(short, long, default_value = "admin")]
    username: String,

    /// Password to use for connecting to the launcher. Prompted for when
    /// omitted together with an explicit host.
    #[arg(short, long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let (Command::Start(args) | Command::Status(args)) = &cli.command;
    let mut connector = match resolve_connector(args).await {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("Exception trying to connect to launcher: {e}");
            return exit_codes::ERROR;
        }
    };

    let outcome = match &cli.command {
        Command::Start(_) => connector.start_process().await,
        Command::Status(_) => connector.status().await,
    };
    match outcome {
        Ok(response) => report(&response),
        Err(e) => {
            eprintln!("Exception executing command: {e}");
            exit_codes::ERROR
        }
    }
}

/// Maps a launcher response to console output and an exit code.
fn report(response: &Response) -> i32 {
    if response.success {
        println!("=== {} ===", response.service);
        println!("{}", response.message);
        if let Some(data) = &response.data {
            match serde_json::to_string_pretty(data) {
                Ok(pretty) => println!("{pretty}"),
                Err(_) => println!("{data}"),
            }
        }
        exit_codes::SUCCESS
    } else {
        eprintln!("{}", response.message);
        match response.error {
            Some(ErrorKind::AuthenticationFailure) => exit_codes::FAILED_LOGIN,
            _ => exit_codes::COMMAND_NOT_EXECUTED,
        }
    }
}

/// Explicit host first; otherwise discovery through the local descriptor.
async fn resolve_connector(args: &ConnectArgs) -> Result<Connector> {
    if let Some(host) = &args.host {
        let password = match &args.password {
            Some(password) => password.clone(),
            None => prompt_password()?,
        };
        return Connector::connect(host, args.username.clone(), password).await;
    }

    let directory = updating_launcher::ul_directory();
    let descriptor = ConnectionDescriptor::read(&directory).await?;
    println!(
        "=== Successfully read the connection descriptor; connecting to port {} on localhost. ===",
        descriptor.port
    );
    Connector::connect(
        &format!("127.0.0.1:{}", descriptor.port),
        args.username.clone(),
        // An explicit password wins over the descriptor's one.
        args.password
            .clone()
            .unwrap_or(descriptor.admin_password),
    )
    .await
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}
