//! appmgr - SteamCMD server manager CLI

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use appmgr::prompt::confirm;
use appmgr::validate::parse_app_id;
use appmgr::{
    delete_install_dir, server_table, Created, Operator, Orchestrator, PathOverrides, Paths, Registry, ServerEntry,
    Shell, Terminal, UpdateOutcome,
};

#[derive(Parser)]
#[command(name = "appmgr")]
#[command(about = "SteamCMD server manager - register, update, and maintain dedicated server installs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Registry file (default: ~/.local/share/appmgr/registry.json)
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Directory holding one install directory per server (default: home directory)
    #[arg(long, global = true)]
    install_root: Option<String>,

    /// SteamCMD executable (default: ~/steamcmd/steamcmd.sh)
    #[arg(long, global = true)]
    installer: Option<String>,

    /// Account that must run this tool
    #[arg(long, global = true, default_value = "steam")]
    account: String,

    /// Skip the account check
    #[arg(long, global = true)]
    any_account: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Shell,

    /// List registered servers
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install or update a server with SteamCMD
    Update {
        /// Server name
        name: String,
    },

    /// Register a new server and create its install directory
    Add {
        /// Server name (also the install directory name)
        name: String,

        /// Steam app id
        #[arg(value_parser = parse_app_id)]
        app_id: u64,

        /// Log in with a Steam account instead of anonymously
        #[arg(long)]
        login: bool,

        /// Reuse the install directory if it already exists
        #[arg(long)]
        force: bool,

        /// Extra SteamCMD arguments (after --)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Unregister a server
    Remove {
        /// Server name
        name: String,

        /// Also delete the install directory and everything in it
        #[arg(long)]
        delete_files: bool,
    },

    /// Show resolved paths (for debugging)
    Paths,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let paths = Paths::resolve(&PathOverrides {
        registry_file: cli.registry.clone(),
        install_root: cli.install_root.clone(),
        installer: cli.installer.clone(),
    });

    match &cli.command {
        None | Some(Commands::Shell) => run_shell(&cli, &paths),
        Some(Commands::Paths) => {
            println!("Registry file: {}", paths.registry_file().display());
            println!("Install root:  {}", paths.install_root().display());
            println!("Installer:     {}", paths.installer().display());
            println!("Registry exists:  {}", paths.registry_file().exists());
            println!("Installer exists: {}", paths.installer().exists());
        }
        Some(Commands::List { json }) => {
            let registry = Registry::load(paths.registry_file()).unwrap_or_else(|e| fail(e));
            if *json {
                let entries: Vec<&ServerEntry> = registry.list().map(|(_, e)| e).collect();
                let output = serde_json::to_string_pretty(&entries).unwrap_or_else(|e| fail(e));
                println!("{output}");
            } else {
                for line in server_table(&registry) {
                    println!("{line}");
                }
            }
        }
        Some(Commands::Update { name }) => {
            let operator = operator(&cli);
            let mut registry = Registry::open(paths.registry_file()).unwrap_or_else(|e| fail(e));
            let mut credentials = Terminal::new();
            let mut output = Terminal::new();
            let mut orchestrator = Orchestrator::new(&paths, &operator);
            let outcome = orchestrator
                .update(&mut registry, name, &mut credentials, &mut output)
                .unwrap_or_else(|e| fail(e));
            if registry.is_dirty() {
                registry.save().unwrap_or_else(|e| fail(e));
            }
            match outcome {
                UpdateOutcome::Succeeded { .. } => println!("Updated {}", name),
                UpdateOutcome::Cancelled => println!("Update cancelled"),
                UpdateOutcome::Failed { code, .. } => {
                    match code {
                        Some(code) => eprintln!("Error: SteamCMD exited with code {}", code),
                        None => eprintln!("Error: SteamCMD was terminated"),
                    }
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Add {
            name,
            app_id,
            login,
            force,
            args,
        }) => {
            operator(&cli);
            let mut registry = Registry::open(paths.registry_file()).unwrap_or_else(|e| fail(e));
            let entry = ServerEntry::new(name.clone(), *app_id, !*login, args.clone());
            match registry.create_entry(&paths, entry, |_| *force) {
                Ok(Created::Inserted) => {
                    registry.save().unwrap_or_else(|e| fail(e));
                    println!("Added {}", name);
                }
                Ok(Created::Declined) => {
                    eprintln!(
                        "Error: {} already exists (use --force to reuse it)",
                        paths.install_dir(name).display()
                    );
                    std::process::exit(1);
                }
                Err(e) => fail(e),
            }
        }
        Some(Commands::Remove { name, delete_files }) => {
            operator(&cli);
            let mut registry = Registry::open(paths.registry_file()).unwrap_or_else(|e| fail(e));
            registry.remove_entry(name).unwrap_or_else(|e| fail(e));
            registry.save().unwrap_or_else(|e| fail(e));
            println!("Removed {}", name);
            if *delete_files {
                delete_install_dir(&paths.install_dir(name)).unwrap_or_else(|e| fail(e));
                println!("Deleted {}", paths.install_dir(name).display());
            }
        }
    }
}

fn run_shell(cli: &Cli, paths: &Paths) {
    let operator = operator(cli);
    let mut menus = Terminal::new();

    let mut registry = match Registry::open(paths.registry_file()) {
        Ok(r) => r,
        Err(e) if e.is_corrupt() => {
            eprintln!("Error: {}", e);
            if !confirm(&mut menus, "Start a fresh, empty registry? The unreadable file is kept as a backup.") {
                std::process::exit(1);
            }
            let (registry, backup) = Registry::start_fresh(paths.registry_file()).unwrap_or_else(|e| fail(e));
            if let Some(backup) = backup {
                println!("Old registry moved to {}", backup.display());
            }
            registry
        }
        Err(e) => fail(e),
    };

    let mut credentials = Terminal::new();
    let mut output = Terminal::new();
    let result = Shell::new(&mut registry, paths, &operator, &mut menus, &mut credentials, &mut output).run();

    // Save even if the shell bailed out, so edits are not lost.
    if registry.is_dirty() {
        registry.save().unwrap_or_else(|e| fail(e));
    }
    if let Err(e) = result {
        fail(e);
    }
}

fn operator(cli: &Cli) -> Operator {
    let result = if cli.any_account {
        Operator::current()
    } else {
        Operator::require(&cli.account)
    };
    result.unwrap_or_else(|e| fail(e))
}

fn init_logging(debug: bool) {
    let filter = if debug { "appmgr=debug" } else { "appmgr=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}
