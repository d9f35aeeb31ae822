//! Interactive admin console on stdin.
//!
//! Parses one command per line and maps it onto an [`Admin`] operation:
//!
//! ```text
//! help
//! quit
//! clients
//! ban add|remove <id|ip>              (alias: blacklist)
//! allow enable|disable                (alias: whitelist)
//! allow add|remove <id|ip>
//! songs add <dir> | remove <id> | list
//! ```
//!
//! Paths containing spaces can be quoted: `songs add "my songs/1234"`.

use std::fmt::Write as _;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::admin::Admin;

pub const HELP: &str = "\
commands:
  clients                      list connected sessions
  ban add|remove <id|ip>       edit the ban list
  allow enable|disable         toggle allow-list mode
  allow add|remove <id|ip>     edit the allow list
  songs add <dir>              load a song directory into the catalog
  songs remove <id>            remove a song by external id
  songs list                   show the catalog
  quit                         shut the server down
  help                         show this text";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Clients,
    Ban(String),
    Unban(String),
    AllowList(bool),
    Allow(String),
    Disallow(String),
    AddSong(PathBuf),
    RemoveSong(u32),
    ListSongs,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command {0:?}, try \"help\"")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0:?} is not a song id")]
    InvalidSongId(String),
}

impl Command {
    /// Parses one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let tokens = tokenize(line);
        let mut args = tokens.iter().map(String::as_str);
        let Some(name) = args.next() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "quit" | "exit" | "stop" => Self::Quit,
            "clients" => Self::Clients,
            "ban" | "blacklist" => match (args.next(), args.next()) {
                (Some("add"), Some(entry)) => Self::Ban(entry.to_owned()),
                (Some("remove"), Some(entry)) => Self::Unban(entry.to_owned()),
                _ => return Err(CommandError::Usage("ban add|remove <id|ip>")),
            },
            "allow" | "whitelist" => match (args.next(), args.next()) {
                (Some("enable"), None) => Self::AllowList(true),
                (Some("disable"), None) => Self::AllowList(false),
                (Some("add"), Some(entry)) => Self::Allow(entry.to_owned()),
                (Some("remove"), Some(entry)) => Self::Disallow(entry.to_owned()),
                _ => {
                    return Err(CommandError::Usage(
                        "allow enable|disable | allow add|remove <id|ip>",
                    ));
                }
            },
            "songs" => match (args.next(), args.next()) {
                (Some("add"), Some(dir)) => Self::AddSong(PathBuf::from(dir)),
                (Some("remove"), Some(id)) => Self::RemoveSong(
                    id.parse()
                        .map_err(|_| CommandError::InvalidSongId(id.to_owned()))?,
                ),
                (Some("list"), None) => Self::ListSongs,
                _ => return Err(CommandError::Usage("songs add <dir> | remove <id> | list")),
            },
            other => return Err(CommandError::Unknown(other.to_owned())),
        };
        Ok(Some(command))
    }
}

/// Splits on whitespace, keeping double-quoted runs together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.trim().chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Runs `command` and renders the result for the console.
pub async fn execute(admin: &Admin, command: Command) -> String {
    match command {
        Command::Help => HELP.to_owned(),
        Command::Quit => {
            admin.shutdown();
            "shutting down".to_owned()
        }
        Command::Clients => {
            let clients = admin.clients().await;
            if clients.is_empty() {
                return "no clients connected".to_owned();
            }
            let mut out = String::new();
            for client in clients {
                let who = client
                    .player
                    .map(|p| format!("{} ({})", p.player_name, p.player_id))
                    .unwrap_or_else(|| "-".to_owned());
                let _ = writeln!(
                    out,
                    "{:<8} {:<22} {:<12} {}",
                    client.session_id.to_string(),
                    client.addr.to_string(),
                    client.state.to_string(),
                    who
                );
            }
            out.trim_end().to_owned()
        }
        Command::Ban(entry) => report(admin.ban(&entry).await, &entry, "banned", "already banned"),
        Command::Unban(entry) => report(admin.unban(&entry).await, &entry, "unbanned", "not banned"),
        Command::AllowList(enabled) => match admin.set_allow_list(enabled).await {
            Ok(()) if enabled => "allow list enabled".to_owned(),
            Ok(()) => "allow list disabled".to_owned(),
            Err(e) => format!("error: {e}"),
        },
        Command::Allow(entry) => report(admin.allow(&entry).await, &entry, "allowed", "already allowed"),
        Command::Disallow(entry) => {
            report(admin.disallow(&entry).await, &entry, "removed from allow list", "not on allow list")
        }
        Command::AddSong(dir) => match admin.add_song(&dir).await {
            Ok(song) => format!("added {} ({})", song.title, song.external_id),
            Err(e) => format!("error: {e}"),
        },
        Command::RemoveSong(id) => match admin.remove_song(id).await {
            Ok(song) => format!("removed {} ({})", song.title, song.external_id),
            Err(e) => format!("error: {e}"),
        },
        Command::ListSongs => {
            let songs = admin.songs().await;
            if songs.is_empty() {
                return "catalog is empty".to_owned();
            }
            let mut out = String::new();
            for (index, song) in songs.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{index:>3}  {:<8} {} - {}",
                    song.external_id, song.author, song.title
                );
            }
            out.trim_end().to_owned()
        }
    }
}

fn report(
    result: Result<bool, crate::ServerError>,
    entry: &str,
    changed: &str,
    unchanged: &str,
) -> String {
    match result {
        Ok(true) => format!("{entry} {changed}"),
        Ok(false) => format!("{entry} {unchanged}"),
        Err(e) => format!("error: {e}"),
    }
}

/// Reads commands from stdin until EOF, `quit`, or shutdown.
pub async fn run(admin: Admin, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("console input closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "console read failed");
                break;
            }
        };

        match Command::parse(&line) {
            Ok(Some(command)) => {
                let quit = command == Command::Quit;
                println!("{}", execute(&admin, command).await);
                if quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }
}
