use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stake_ledger::chaincode::with_state_file;
use stake_ledger::{log::log_init, LedgerConfig, LedgerError};

#[derive(Parser)]
#[command(name = "stake-ledger", version, about = "Asset registry and proportional purchase engine")]
struct Cli {
    /// Ledger snapshot file; created on first successful write.
    #[arg(long, default_value = "ledger.state.json")]
    state: PathBuf,

    /// JSON file with ledger settings (e.g. {"fraction_tolerance": 1e-9}).
    #[arg(long)]
    config: Option<PathBuf>,

    /// -v warn, -vv info, -vvv debug; otherwise RUST_LOG applies.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the instantiate hook against the state file.
    Init,
    /// Invoke a named function with positional arguments.
    Invoke {
        /// createAsset | getAsset | buyAsset | createWallet | getWallet
        function: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn run(cli: Cli) -> Result<Option<Vec<u8>>, LedgerError> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    with_state_file(&cli.state, config, |chaincode| match &cli.command {
        Command::Init => chaincode.init().map(|_| None),
        Command::Invoke { function, args } => chaincode.invoke(function, args),
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    log_init(cli.verbose);

    match run(cli) {
        Ok(Some(payload)) => {
            println!("{}", String::from_utf8_lossy(&payload));
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("OK");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
