use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use deb_store::Location;
use deb_types::{Account, Date, DateRange, EntrySpec, Moment, MomentRange};

#[derive(Parser)]
#[command(
    name = "deb",
    about = "Double-entry ledger spaces over a chunked block store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Directory holding the block store
    #[arg(long, global = true, default_value = ".deb")]
    pub store: PathBuf,

    /// Space configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new, empty space
    Init(InitArgs),
    /// Record one transaction
    Append(AppendArgs),
    /// List transactions, optionally sliced or projected
    List(ListArgs),
    /// Sum entries per account
    Balances(BalancesArgs),
    /// Show the blocks backing a space
    Blocks(BlocksArgs),
    /// Append the (filtered) contents of one space to another
    Copy(CopyArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct InitArgs {
    /// Nest the new space under this location
    #[arg(long)]
    pub parent: Option<Location>,
}

#[derive(Args)]
pub struct AppendArgs {
    pub space: Location,
    /// Entry as ACCOUNT=AMOUNT; repeat for each account
    #[arg(short, long = "entry", required = true)]
    pub entries: Vec<EntrySpec>,
    /// Date as YYYY-MM-DD; defaults to the moment's date
    #[arg(long)]
    pub date: Option<Date>,
    /// Microseconds since the epoch; defaults to now
    #[arg(long)]
    pub moment: Option<u64>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// Keep transactions touching any of these accounts
    #[arg(short, long = "account")]
    pub accounts: Vec<Account>,
    /// Keep transactions dated within START..END (end exclusive)
    #[arg(long = "dates", value_parser = parse_date_range)]
    pub dates: Vec<DateRange>,
    /// Keep transactions recorded within START..END microseconds (end exclusive)
    #[arg(long = "moments", value_parser = parse_moment_range)]
    pub moments: Vec<MomentRange>,
    /// Keep only the entries of the selected accounts
    #[arg(long)]
    pub project: bool,
}

impl FilterArgs {
    pub fn is_unrestricted(&self) -> bool {
        self.accounts.is_empty() && self.dates.is_empty() && self.moments.is_empty()
    }
}

#[derive(Args)]
pub struct ListArgs {
    pub space: Location,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Stop after this many transactions
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct BalancesArgs {
    pub space: Location,
    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args)]
pub struct BlocksArgs {
    pub space: Location,
}

#[derive(Args)]
pub struct CopyArgs {
    pub from: Location,
    pub to: Location,
    #[command(flatten)]
    pub filter: FilterArgs,
}

fn split_range(s: &str) -> Result<(&str, &str), String> {
    s.split_once("..")
        .ok_or_else(|| format!("{s:?}: expected START..END"))
}

fn parse_date_range(s: &str) -> Result<DateRange, String> {
    let (start, end) = split_range(s)?;
    let start: Date = start.parse().map_err(|e| format!("{e}"))?;
    let end: Date = end.parse().map_err(|e| format!("{e}"))?;
    DateRange::new(start, end).map_err(|e| e.to_string())
}

fn parse_moment_range(s: &str) -> Result<MomentRange, String> {
    let (start, end) = split_range(s)?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u64>()
            .map(Moment::from_micros)
            .map_err(|e| format!("{v:?}: {e}"))
    };
    MomentRange::new(parse(start)?, parse(end)?).map_err(|e| e.to_string())
}
