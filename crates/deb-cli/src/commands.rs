use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use colored::Colorize;
use deb_space::{AppendError, AppendReport, Space, SpaceConfig};
use deb_store::{BlockStore, FileBlockStore, Location};
use deb_types::{Account, Entries, EntrySpec, Moment, Transaction};
use serde::Serialize;
use tokio_stream::StreamExt;

use crate::cli::*;

/// Store, configuration and output settings shared by every command.
struct Context {
    store: Arc<dyn BlockStore>,
    config: SpaceConfig,
    format: OutputFormat,
}

impl Context {
    async fn open(store: &Path, config: Option<&Path>, format: OutputFormat) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => SpaceConfig::load(path)?,
            None => SpaceConfig::default(),
        };
        let store = FileBlockStore::open(store)
            .await
            .with_context(|| format!("opening store at {}", store.display()))?;
        Ok(Self {
            store: Arc::new(store),
            config,
            format,
        })
    }

    async fn space(&self, location: &Location) -> anyhow::Result<Space> {
        let space = Space::open(Arc::clone(&self.store), location.clone(), self.config.clone())
            .await
            .with_context(|| format!("opening space {location}"))?;
        Ok(space)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let ctx = Context::open(&cli.store, cli.config.as_deref(), cli.format).await?;
        run(&ctx, cli.command).await
    })
}

async fn run(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init(args) => cmd_init(ctx, args).await,
        Command::Append(args) => cmd_append(ctx, args).await,
        Command::List(args) => cmd_list(ctx, args).await,
        Command::Balances(args) => cmd_balances(ctx, args).await,
        Command::Blocks(args) => cmd_blocks(ctx, args).await,
        Command::Copy(args) => cmd_copy(ctx, args).await,
        Command::Config => cmd_config(ctx),
    }
}

/// Build entries from command-line pairs, enforcing the double-entry rules:
/// distinct accounts, at least one debit (positive) and one credit
/// (negative), and amounts summing to zero.
fn build_entries(specs: &[EntrySpec]) -> anyhow::Result<Entries> {
    let mut entries = Entries::new();
    for spec in specs {
        if entries.insert(spec.account, spec.amount).is_some() {
            bail!("account {} appears more than once", spec.account);
        }
    }
    if !entries.iter().any(|(_, amount)| amount > 0) {
        bail!("at least one debit must be given");
    }
    if !entries.iter().any(|(_, amount)| amount < 0) {
        bail!("at least one credit must be given");
    }
    if !entries.is_balanced() {
        bail!("entries do not balance: they sum to {}", entries.balance());
    }
    Ok(entries)
}

fn apply_filter(space: &Space, filter: &FilterArgs) -> anyhow::Result<Space> {
    if filter.is_unrestricted() {
        return Ok(space.clone());
    }
    let (accounts, dates, moments) = (
        filter.accounts.clone(),
        filter.dates.clone(),
        filter.moments.clone(),
    );
    let derived = if filter.project {
        space.projection(accounts, dates, moments)?
    } else {
        space.slice(accounts, dates, moments)?
    };
    Ok(derived)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct AppendSummary {
    committed: Vec<String>,
    transactions: usize,
}

impl From<&AppendReport> for AppendSummary {
    fn from(report: &AppendReport) -> Self {
        Self {
            committed: report.committed.iter().map(ToString::to_string).collect(),
            transactions: report.transactions_written,
        }
    }
}

fn explain_append_error(err: AppendError) -> anyhow::Error {
    if let AppendError::Partial(report) = &err {
        for failure in &report.failures {
            eprintln!("  {} block {}: {}", "✗".red(), failure.seq, failure.error);
        }
        if let Some(source) = &report.source_error {
            eprintln!("  {} source: {}", "✗".red(), source);
        }
    }
    if err.conflict().is_some() {
        return anyhow::Error::new(err).context("another writer changed the space; retry");
    }
    err.into()
}

async fn cmd_init(ctx: &Context, args: InitArgs) -> anyhow::Result<()> {
    let space = match &args.parent {
        Some(parent) => Space::create_under(Arc::clone(&ctx.store), parent, ctx.config.clone()).await?,
        None => Space::create(Arc::clone(&ctx.store), ctx.config.clone()).await?,
    };
    match ctx.format {
        OutputFormat::Json => print_json(&serde_json::json!({ "location": space.location() })),
        OutputFormat::Text => {
            println!("{} Created space {}", "✓".green().bold(), space.location().to_string().bold());
            Ok(())
        }
    }
}

async fn cmd_append(ctx: &Context, args: AppendArgs) -> anyhow::Result<()> {
    let entries = build_entries(&args.entries)?;
    let moment = args.moment.map(Moment::from_micros).unwrap_or_else(Moment::now);
    let date = args.date.unwrap_or_else(|| moment.date());
    let tx = Transaction::new(moment, date, entries);

    let space = ctx.space(&args.space).await?;
    let report = space
        .append_transactions(vec![tx.clone()])
        .await
        .map_err(explain_append_error)?;
    match ctx.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "transaction": tx,
            "report": AppendSummary::from(&report),
        })),
        OutputFormat::Text => {
            println!("{} Appended to {}", "✓".green().bold(), args.space.to_string().bold());
            println!("  {}", tx);
            for block in &report.committed {
                println!("  Block: {}", block.to_string().yellow());
            }
            Ok(())
        }
    }
}

async fn cmd_list(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let space = apply_filter(&ctx.space(&args.space).await?, &args.filter)?;
    let mut stream = space.transactions();
    let limit = args.limit.unwrap_or(usize::MAX);

    let mut listed = Vec::new();
    while listed.len() < limit {
        let Some(item) = stream.next().await else { break };
        let tx = item?;
        if let OutputFormat::Text = ctx.format {
            println!("{} {} {}", tx.date.to_string().cyan(), tx.moment.to_string().dimmed(), tx.entries);
        }
        listed.push(tx);
    }
    drop(stream);

    match ctx.format {
        OutputFormat::Json => print_json(&listed),
        OutputFormat::Text => {
            if listed.is_empty() {
                println!("No transactions.");
            }
            Ok(())
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct BalanceRow {
    account: Account,
    balance: i128,
}

async fn balances(space: &Space) -> anyhow::Result<Vec<BalanceRow>> {
    let mut totals: BTreeMap<Account, i128> = BTreeMap::new();
    let mut stream = space.transactions();
    while let Some(item) = stream.next().await {
        for (account, amount) in item?.entries.iter() {
            *totals.entry(account).or_default() += i128::from(amount);
        }
    }
    Ok(totals
        .into_iter()
        .map(|(account, balance)| BalanceRow { account, balance })
        .collect())
}

async fn cmd_balances(ctx: &Context, args: BalancesArgs) -> anyhow::Result<()> {
    let space = apply_filter(&ctx.space(&args.space).await?, &args.filter)?;
    let rows = balances(&space).await?;
    match ctx.format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No entries.");
            }
            for row in &rows {
                let amount = if row.balance < 0 {
                    row.balance.to_string().red()
                } else {
                    row.balance.to_string().green()
                };
                println!("{:>8}  {:>16}", row.account.to_string().bold(), amount);
            }
            Ok(())
        }
    }
}

async fn cmd_blocks(ctx: &Context, args: BlocksArgs) -> anyhow::Result<()> {
    let space = ctx.space(&args.space).await?;
    let blocks = space.blocks().await?;
    match ctx.format {
        OutputFormat::Json => print_json(&blocks),
        OutputFormat::Text => {
            for block in &blocks {
                println!(
                    "{}  {}  {:>8} bytes  {:>6} txs",
                    block.id.to_string().yellow(),
                    block.version.to_string().dimmed(),
                    block.size,
                    block.transactions
                );
            }
            let total: usize = blocks.iter().map(|b| b.transactions).sum();
            println!("{} block(s), {} transaction(s)", blocks.len().to_string().bold(), total);
            Ok(())
        }
    }
}

async fn cmd_copy(ctx: &Context, args: CopyArgs) -> anyhow::Result<()> {
    let source = apply_filter(&ctx.space(&args.from).await?, &args.filter)?;
    let target = ctx.space(&args.to).await?;
    let report = target.append(&source).await.map_err(explain_append_error)?;
    match ctx.format {
        OutputFormat::Json => print_json(&AppendSummary::from(&report)),
        OutputFormat::Text => {
            println!(
                "{} Copied {} transaction(s) from {} to {} in {} block(s)",
                "✓".green().bold(),
                report.transactions_written,
                args.from.to_string().bold(),
                args.to.to_string().bold(),
                report.committed.len()
            );
            Ok(())
        }
    }
}

fn cmd_config(ctx: &Context) -> anyhow::Result<()> {
    match ctx.format {
        OutputFormat::Json => print_json(&ctx.config),
        OutputFormat::Text => {
            print!("{}", ctx.config.to_toml_string()?);
            Ok(())
        }
    }
}
