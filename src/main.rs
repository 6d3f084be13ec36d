use clap::{Parser, Subcommand};
use filesmith::config::{self, Config};
use filesmith::{Filesmith, Rebuild};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "filesmith")]
#[command(about = "Pluggable file-transformation build engine")]
#[command(long_about = "\
Pluggable file-transformation build engine

Reads every file under the source directory into memory, parses
frontmatter, and writes the result to the destination directory.

Project layout:

  site/
  ├── filesmith.toml      # Optional config (see gen-config)
  ├── src/                # Source files (default)
  │   ├── index.md        # ---\\ntitle: Home\\n--- frontmatter is parsed
  │   └── img/logo.png    # Binary files are copied as-is
  └── build/              # Output (default), cleaned before each build

Run 'filesmith gen-config' to print a documented filesmith.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Working directory; source and destination resolve against it
    #[arg(long, default_value = ".", global = true)]
    directory: PathBuf,

    /// Config file (default: <directory>/filesmith.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Set a build environment variable, e.g. --env DEBUG=filesmith*
    #[arg(long = "env", value_name = "NAME=VALUE", value_parser = parse_env_pair, global = true)]
    env: Vec<(String, String)>,

    /// Log per-file reads and writes
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read, transform and write the whole project
    Build,
    /// Build, then rebuild on every change until stdin closes (Ctrl-D)
    Watch,
    /// Read and transform without writing; list the resulting paths
    Check,
    /// Print a stock filesmith.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose || std::env::var_os("DEBUG").is_some());

    match cli.command {
        Command::Build => {
            let (smith, _) = setup(&cli)?;
            println!("==> Building {}", smith.source_dir().display());
            let files = smith.build()?;
            println!(
                "==> Build complete: {} files → {}",
                files.len(),
                smith.destination_dir().display()
            );
        }
        Command::Watch => {
            let (smith, config) = setup(&cli)?;
            println!("==> Watching {}", smith.source_dir().display());
            let handle = smith.watch(config.watch.options())?;

            let (stop_tx, stop_rx) = mpsc::channel();
            thread::spawn(move || {
                let _ = io::stdin().read_to_end(&mut Vec::new());
                let _ = stop_tx.send(());
            });

            while stop_rx.try_recv().is_err() {
                match handle.next_rebuild(Duration::from_millis(200)) {
                    Some(Ok(rebuild)) => print_rebuild(&rebuild),
                    Some(Err(e)) => eprintln!("==> Rebuild failed: {e}"),
                    None => {}
                }
            }
            for report in handle.stop() {
                match report {
                    Ok(rebuild) => print_rebuild(&rebuild),
                    Err(e) => eprintln!("==> Rebuild failed: {e}"),
                }
            }
            println!("==> Stopped watching");
        }
        Command::Check => {
            let (smith, _) = setup(&cli)?;
            println!("==> Checking {}", smith.source_dir().display());
            let files = smith.process()?;
            for path in files.keys() {
                println!("    {path}");
            }
            println!("==> {} files", files.len());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config and apply it, then layer `DEBUG` from the process
/// environment and `--env` flags on top.
fn setup(cli: &Cli) -> Result<(Filesmith, Config), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(&cli.directory)?,
    };
    let mut smith = Filesmith::from_config(&cli.directory, &config)?;
    if let Ok(debug) = std::env::var("DEBUG") {
        smith = smith.env("DEBUG", debug);
    }
    smith = smith.env_all(cli.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok((smith, config))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "filesmith=debug" } else { "filesmith=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_rebuild(rebuild: &Rebuild) {
    let kind = if rebuild.full { "full" } else { "incremental" };
    println!("==> Rebuilt ({kind}): {}", rebuild.changes);
    for path in &rebuild.changes.added {
        println!("    + {path}");
    }
    for path in &rebuild.changes.changed {
        println!("    ~ {path}");
    }
    for path in &rebuild.changes.removed {
        println!("    - {path}");
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}
