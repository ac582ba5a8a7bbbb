// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::path::PathBuf;
use std::process::ExitCode;

use spinedb::{Database, EngineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: spinedb <file> <command>

commands:
  versions                       list every version and its root offset
  get <version> <key>            print the value of <key>
  put <version> <key> <value>    commit <key>=<value> on top of <version>
  del <version> <key>            commit <version> without <key>
  history <version> <key>        print every value <key> has held, newest first
  path <version> <key>           print the offsets descent visits for <key>
  scan <version>                 print every key and value in order
  check <version>                verify the tree of <version>

<version> may be `current`.";

enum Command {
    Versions,
    Get { version: Version, key: String },
    Put { version: Version, key: String, value: String },
    Del { version: Version, key: String },
    History { version: Version, key: String },
    Path { version: Version, key: String },
    Scan { version: Version },
    Check { version: Version },
}

#[derive(Clone, Copy)]
enum Version {
    Current,
    Number(u64),
}

impl Version {
    fn parse(arg: &str) -> Result<Self, String> {
        if arg == "current" {
            return Ok(Self::Current);
        }
        arg.parse()
            .map(Self::Number)
            .map_err(|_| format!("'{arg}' is not a version number"))
    }

    fn resolve(self, db: &Database) -> u64 {
        match self {
            Self::Current => db.current_version(),
            Self::Number(n) => n,
        }
    }
}

fn parse_args(args: &[String]) -> Result<(PathBuf, Command), String> {
    let [file, command, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let version = || {
        rest.first()
            .ok_or_else(|| USAGE.to_string())
            .and_then(|v| Version::parse(v))
    };
    let arg = |i: usize| rest.get(i).cloned().ok_or_else(|| USAGE.to_string());

    let command = match (command.as_str(), rest.len()) {
        ("versions", 0) => Command::Versions,
        ("get", 2) => Command::Get {
            version: version()?,
            key: arg(1)?,
        },
        ("put", 3) => Command::Put {
            version: version()?,
            key: arg(1)?,
            value: arg(2)?,
        },
        ("del", 2) => Command::Del {
            version: version()?,
            key: arg(1)?,
        },
        ("history", 2) => Command::History {
            version: version()?,
            key: arg(1)?,
        },
        ("path", 2) => Command::Path {
            version: version()?,
            key: arg(1)?,
        },
        ("scan", 1) => Command::Scan { version: version()? },
        ("check", 1) => Command::Check { version: version()? },
        _ => return Err(USAGE.to_string()),
    };
    Ok((PathBuf::from(file), command))
}

fn run(db: &Database, command: Command) -> Result<(), spinedb::DatabaseError> {
    match command {
        Command::Versions => {
            for (version, root) in db.versions() {
                println!("{version}\t{root}");
            }
        }
        Command::Get { version, key } => match db.lookup(version.resolve(db), &key)? {
            Some(value) => println!("{value}"),
            None => println!("(absent)"),
        },
        Command::Put {
            version,
            key,
            value,
        } => {
            let committed = db.commit(version.resolve(db), key.as_str(), value.as_str())?;
            println!("{committed}");
        }
        Command::Del { version, key } => {
            let committed = db.delete(version.resolve(db), &key)?;
            println!("{committed}");
        }
        Command::History { version, key } => {
            for value in db.history(version.resolve(db), &key)? {
                println!("{value}");
            }
        }
        Command::Path { version, key } => {
            println!("{}", db.path(version.resolve(db), &key)?);
        }
        Command::Scan { version } => {
            for (key, value) in db.scan(version.resolve(db))? {
                println!("{key}\t{value}");
            }
        }
        Command::Check { version } => {
            let stats = db.check(version.resolve(db))?;
            println!(
                "ok: depth {} blocks {} records {}",
                stats.depth, stats.blocks, stats.records
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spinedb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, command) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(usage) => {
            eprintln!("{usage}");
            return ExitCode::FAILURE;
        }
    };

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(
        "Loaded configuration: max_block_entries={}, inline_limit={}, sync_on_commit={}",
        config.max_block_entries,
        config.inline_limit,
        config.sync_on_commit
    );

    let db = match Database::open(&path, config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(&db, command) {
        if e.is_corruption() {
            tracing::error!("{} is corrupt: {e}", path.display());
        } else {
            tracing::error!("{e}");
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
