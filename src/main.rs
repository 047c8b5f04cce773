//! FGP daemon for Piccolo Admin operations.
//!
//! Drives a Piccolo Admin instance over its REST API: table listings with
//! filters, ordering and pagination, row editing, and custom forms.
//!
//! # Usage
//! ```bash
//! fgp-piccolo-admin start           # Start daemon in background
//! fgp-piccolo-admin start -f        # Start in foreground
//! fgp-piccolo-admin stop            # Stop daemon
//! fgp-piccolo-admin status          # Check daemon status
//! ```

mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fgp_daemon::{cleanup_socket, FgpServer};
use fgp_piccolo_admin::config::AdminConfig;
use fgp_piccolo_admin::preferences::{FilePreferences, PreferenceStore};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::service::AdminService;

const DEFAULT_SOCKET: &str = "~/.fgp/services/piccolo-admin/daemon.sock";
const LOG_FILTER: &str = "fgp_piccolo_admin=debug,fgp_daemon=debug";

#[derive(Parser)]
#[command(name = "fgp-piccolo-admin")]
#[command(about = "FGP daemon for Piccolo Admin listing, row and form operations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the FGP daemon
    Start {
        /// Socket path (default: ~/.fgp/services/piccolo-admin/daemon.sock)
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,

        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,

        /// Preferences file (default: <config dir>/piccolo-admin/preferences.json)
        #[arg(long)]
        preferences: Option<String>,
    },

    /// Stop the running daemon
    Stop {
        /// Socket path
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },

    /// Check daemon status
    Status {
        /// Socket path
        #[arg(short, long, default_value = DEFAULT_SOCKET)]
        socket: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            socket,
            foreground,
            preferences,
        } => cmd_start(socket, foreground, preferences),
        Commands::Stop { socket } => cmd_stop(socket),
        Commands::Status { socket } => cmd_status(socket),
    }
}

fn open_preferences(path: Option<String>) -> Result<Arc<dyn PreferenceStore>> {
    let path = match path {
        Some(path) => shellexpand::tilde(&path).to_string().into(),
        None => FilePreferences::default_path().context("Failed to locate preferences file")?,
    };
    Ok(Arc::new(FilePreferences::new(path)))
}

fn serve(
    config: AdminConfig,
    preferences: Arc<dyn PreferenceStore>,
    socket_path: &str,
) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(LOG_FILTER).init();

    let service =
        AdminService::new(config, preferences).context("Failed to create AdminService")?;
    let server = FgpServer::new(service, socket_path).context("Failed to create FGP server")?;
    server.serve().context("Server error")?;
    Ok(())
}

fn cmd_start(socket: String, foreground: bool, preferences: Option<String>) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();

    // Create parent directory
    if let Some(parent) = Path::new(&socket_path).parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    // Resolve configuration BEFORE fork so errors reach the terminal
    let config = AdminConfig::load().context(
        "No PICCOLO_ADMIN_URL set and ~/.config/piccolo-admin/credentials.json not found.",
    )?;
    let preferences = open_preferences(preferences)?;

    let pid_file = format!("{}.pid", socket_path);

    println!("Starting fgp-piccolo-admin daemon...");
    println!("Socket: {}", socket_path);
    println!("Admin: {}", config.base_url);

    if foreground {
        serve(config, preferences, &socket_path)?;
    } else {
        // Tokio runtime must be created AFTER fork
        use daemonize::Daemonize;

        let daemonize = Daemonize::new()
            .pid_file(&pid_file)
            .working_directory("/tmp");

        match daemonize.start() {
            Ok(_) => serve(config, preferences, &socket_path)?,
            Err(e) => {
                eprintln!("Failed to daemonize: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn cmd_stop(socket: String) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();
    let pid_file = format!("{}.pid", socket_path);

    if Path::new(&socket_path).exists() {
        if let Ok(client) = fgp_daemon::FgpClient::new(&socket_path) {
            if let Ok(response) = client.stop() {
                if response.ok {
                    println!("Daemon stopped.");
                    return Ok(());
                }
            }
        }
    }

    let pid_str = std::fs::read_to_string(&pid_file)
        .context("Failed to read PID file - daemon may not be running")?;
    let pid: i32 = pid_str.trim().parse().context("Invalid PID in file")?;

    if !pid_matches_process(pid, "fgp-piccolo") {
        anyhow::bail!("Refusing to stop PID {}: unexpected process", pid);
    }

    println!("Stopping fgp-piccolo-admin daemon (PID: {})...", pid);

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }

    std::thread::sleep(std::time::Duration::from_millis(500));

    let _ = cleanup_socket(&socket_path, Some(Path::new(&pid_file)));
    let _ = std::fs::remove_file(&pid_file);

    println!("Daemon stopped.");

    Ok(())
}

fn pid_matches_process(pid: i32, expected_name: &str) -> bool {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "comm="])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let command = String::from_utf8_lossy(&output.stdout);
            command.trim().contains(expected_name)
        }
        _ => false,
    }
}

fn cmd_status(socket: String) -> Result<()> {
    let socket_path = shellexpand::tilde(&socket).to_string();

    if !Path::new(&socket_path).exists() {
        println!("Status: NOT RUNNING");
        println!("Socket {} does not exist", socket_path);
        return Ok(());
    }

    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;

    match UnixStream::connect(&socket_path) {
        Ok(mut stream) => {
            let request = r#"{"id":"status","v":1,"method":"health","params":{}}"#;
            writeln!(stream, "{}", request)?;
            stream.flush()?;

            let mut reader = BufReader::new(stream);
            let mut response = String::new();
            reader.read_line(&mut response)?;

            println!("Status: RUNNING");
            println!("Socket: {}", socket_path);
            println!("Health: {}", response.trim());
        }
        Err(e) => {
            println!("Status: NOT RESPONDING");
            println!("Socket exists but connection failed: {}", e);
        }
    }

    Ok(())
}
