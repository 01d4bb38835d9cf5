//! `launchpad-calc`: command-line front end for the launchpad calculators.
//!
//! Dates are RFC 3339 in UTC (`2025-01-01T00:00:00Z`). Results are printed as
//! pretty JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use humantime_serde::re::humantime;
use serde::Serialize;
use tracing::{debug, info};

use launchpad::config;
use launchpad::staking::{remaining_days, ExitQuote};
use launchpad::telemetry::{self, LoggingConfig};
use launchpad::vesting::{Allocation, UnlockKind};
use launchpad::{
    Amount, Bps, ClaimLedger, ClaimState, ClaimStatus, Price, SaleTerms, StakingRewardModel, Timestamp,
    UnlockAlignment, VestingCalculator, VestingSchedule, MILLIS_PER_DAY,
};

#[derive(Debug, Parser)]
#[command(name = "launchpad-calc", version, about = "Vesting, claim and staking calculators")]
struct Cli {
    /// Config file (toml/yaml/json); auto-discovered when omitted.
    #[arg(long, global = true, env = "DECENTRAMIND_CONFIG")]
    config: Option<PathBuf>,

    /// EnvFilter directives; overrides `telemetry.log_filter`.
    #[arg(long, global = true, env = "DECENTRAMIND_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "text" or "json"; overrides `telemetry.json`.
    #[arg(long, global = true, env = "DECENTRAMIND_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Alignment {
    Drifting,
    Grid,
}

impl From<Alignment> for UnlockAlignment {
    fn from(a: Alignment) -> Self {
        match a {
            Alignment::Drifting => UnlockAlignment::Drifting,
            Alignment::Grid => UnlockAlignment::Grid,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Split a contribution into TGE and vesting tokens.
    Allocate(SaleArgs),
    /// Next unlock date and amount for a contribution.
    NextUnlock {
        #[command(flatten)]
        sale: SaleArgs,
        /// Reference time; defaults to now.
        #[arg(long, value_parser = parse_time)]
        at: Option<Timestamp>,
        /// Overrides `vesting.alignment`.
        #[arg(long)]
        alignment: Option<Alignment>,
    },
    /// Sale window progress at a reference time.
    Progress {
        #[arg(long, value_parser = parse_time)]
        start: Timestamp,
        #[arg(long, value_parser = parse_time)]
        end: Timestamp,
        #[arg(long, value_parser = parse_time)]
        at: Option<Timestamp>,
    },
    /// Full release schedule of a contribution.
    Schedule(SaleArgs),
    /// Unlocked and claimable tokens given what was already claimed.
    Claimable {
        #[command(flatten)]
        sale: SaleArgs,
        /// Tokens already claimed.
        #[arg(long, default_value_t = 0)]
        claimed: Amount,
        #[arg(long, value_parser = parse_time)]
        at: Option<Timestamp>,
    },
    /// Simple-interest staking reward.
    Accrue {
        #[arg(long)]
        principal: Amount,
        /// APY in basis points; defaults to `staking.base_apy`.
        #[arg(long)]
        apy_bps: Option<u16>,
        /// Accrual period, e.g. "180days".
        #[arg(long, value_parser = humantime::parse_duration)]
        period: Duration,
    },
    /// Lock status and exit quote of a stake.
    Lock {
        #[arg(long)]
        principal: Amount,
        /// Stake start.
        #[arg(long, value_parser = parse_time)]
        start: Timestamp,
        #[arg(long, value_parser = parse_time)]
        at: Option<Timestamp>,
    },
}

/// Sale terms plus one contribution.
#[derive(Debug, Args)]
struct SaleArgs {
    /// Contribution in quote units.
    #[arg(long)]
    amount: Amount,
    /// Quote per token as a decimal, e.g. "0.1".
    #[arg(long)]
    price: Price,
    /// TGE share in basis points.
    #[arg(long, default_value_t = 0)]
    tge_bps: u16,
    #[arg(long, default_value_t = 0)]
    cliff_days: u32,
    #[arg(long, default_value_t = 0)]
    vesting_days: u32,
    #[arg(long, default_value_t = 30)]
    frequency_days: u32,
    /// Sale start.
    #[arg(long, value_parser = parse_time)]
    start: Timestamp,
    /// Sale end.
    #[arg(long, value_parser = parse_time)]
    end: Timestamp,
}

impl SaleArgs {
    fn terms(&self) -> anyhow::Result<SaleTerms> {
        let schedule = VestingSchedule::new(Bps(self.tge_bps), self.cliff_days, self.vesting_days, self.frequency_days)
            .context("invalid vesting schedule")?;
        SaleTerms::builder()
            .price(self.price)
            .schedule(schedule)
            .window(self.start, self.end)
            .build()
            .context("invalid sale terms")
    }

    fn allocation(&self, calc: &VestingCalculator) -> anyhow::Result<(SaleTerms, Allocation)> {
        let terms = self.terms()?;
        let alloc = calc.allocate(self.amount, &terms)?;
        Ok((terms, alloc))
    }
}

fn parse_time(s: &str) -> Result<Timestamp, String> {
    let t = humantime::parse_rfc3339_weak(s).map_err(|e| e.to_string())?;
    let d = t.duration_since(UNIX_EPOCH).map_err(|_| "dates before 1970 are not supported".to_string())?;
    Timestamp::try_from(d.as_millis()).map_err(|_| "date out of range".to_string())
}

fn now_ms() -> anyhow::Result<Timestamp> {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).context("system clock before 1970")?;
    Ok(Timestamp::try_from(d.as_millis())?)
}

fn rfc3339(ts: Timestamp) -> String {
    match u64::try_from(ts) {
        Ok(ms) => humantime::format_rfc3339_millis(UNIX_EPOCH + Duration::from_millis(ms)).to_string(),
        Err(_) => ts.to_string(),
    }
}

// ---------- Output rows ----------

#[derive(Serialize)]
struct NextUnlockOut {
    date: String,
    date_ms: Timestamp,
    amount: Amount,
    periods_elapsed: u32,
}

#[derive(Serialize)]
struct ProgressOut {
    at: String,
    progress_bps: u16,
    progress: String,
}

#[derive(Serialize)]
struct ScheduleRow {
    date: String,
    amount: Amount,
    #[serde(flatten)]
    kind: UnlockKind,
}

#[derive(Serialize)]
struct ClaimableOut {
    at: String,
    total_tokens: Amount,
    unlocked: Amount,
    claimed: Amount,
    claimable: Amount,
    status: ClaimStatus,
}

#[derive(Serialize)]
struct AccrueOut {
    principal: Amount,
    apy: String,
    days: f64,
    reward: Amount,
}

#[derive(Serialize)]
struct LockOut {
    lock_end: String,
    can_unstake: bool,
    remaining_ms: u64,
    remaining_days: u64,
    reward: Amount,
    exit: ExitQuote,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    let mut log_cfg = LoggingConfig::from(&cfg.telemetry);
    if let Some(level) = &cli.log_level {
        log_cfg.env_filter = Some(level.clone());
    }
    if let Some(fmt) = cli.log_format {
        log_cfg.json = matches!(fmt, LogFormat::Json);
    }
    telemetry::init(log_cfg)?;
    debug!(config = %cfg, "configuration loaded");

    let calc = VestingCalculator::new();
    let model = StakingRewardModel::new(cfg.staking.params())?;

    match cli.command {
        Command::Allocate(sale) => {
            let (_, alloc) = sale.allocation(&calc)?;
            info!(amount = sale.amount, tokens = alloc.total_tokens, "allocation computed");
            print_json(&alloc)
        }
        Command::NextUnlock { sale, at, alignment } => {
            let (terms, alloc) = sale.allocation(&calc)?;
            let at = at.map_or_else(now_ms, Ok)?;
            let alignment = alignment.map(Into::into).unwrap_or(cfg.vesting.alignment);
            let next = calc.next_unlock(&terms, &alloc, at, alignment).map(|n| NextUnlockOut {
                date: rfc3339(n.date),
                date_ms: n.date,
                amount: n.amount,
                periods_elapsed: n.periods_elapsed,
            });
            print_json(&next)
        }
        Command::Progress { start, end, at } => {
            if end < start {
                bail!("--end must not precede --start");
            }
            let terms = SaleTerms::builder()
                .price(Price::new(1, 1)?)
                .schedule(VestingSchedule::immediate())
                .window(start, end)
                .build()?;
            let at = at.map_or_else(now_ms, Ok)?;
            let p = calc.progress(&terms, at);
            print_json(&ProgressOut { at: rfc3339(at), progress_bps: p.get(), progress: p.to_string() })
        }
        Command::Schedule(sale) => {
            let (terms, alloc) = sale.allocation(&calc)?;
            let rows: Vec<ScheduleRow> = calc
                .unlock_schedule(&terms, &alloc)
                .into_iter()
                .map(|e| ScheduleRow { date: rfc3339(e.date), amount: e.amount, kind: e.kind })
                .collect();
            print_json(&rows)
        }
        Command::Claimable { sale, claimed, at } => {
            let (terms, alloc) = sale.allocation(&calc)?;
            let state = ClaimState::restore(alloc.total_tokens, alloc.tge_tokens, alloc.vesting_tokens, claimed)
                .context("--claimed exceeds the allocation")?;
            let at = at.map_or_else(now_ms, Ok)?;
            let ledger = ClaimLedger::new(calc);
            print_json(&ClaimableOut {
                at: rfc3339(at),
                total_tokens: state.total_tokens(),
                unlocked: ledger.total_unlocked(&state, &terms, at),
                claimed,
                claimable: ledger.claimable_now(&state, &terms, at),
                status: state.status(),
            })
        }
        Command::Accrue { principal, apy_bps, period } => {
            let apy = apy_bps.map(Bps).unwrap_or(model.params().base_apy);
            let elapsed = i64::try_from(period.as_millis()).context("period too long")?;
            let reward = model.accrue(principal, apy, elapsed)?;
            print_json(&AccrueOut {
                principal,
                apy: apy.to_string(),
                days: elapsed as f64 / MILLIS_PER_DAY as f64,
                reward,
            })
        }
        Command::Lock { principal, start, at } => {
            let position = model.open_position(principal, model.params().base_apy, start)?;
            let at = at.map_or_else(now_ms, Ok)?;
            let remaining_ms = model.time_remaining(position.lock_end, at);
            print_json(&LockOut {
                lock_end: rfc3339(position.lock_end),
                can_unstake: model.can_unstake(at, position.lock_end),
                remaining_ms,
                remaining_days: remaining_days(remaining_ms),
                reward: model.reward_at(&position, at)?,
                exit: model.early_exit_quote(&position, at)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rfc3339() {
        assert_eq!(parse_time("1970-01-02T00:00:00Z").unwrap(), MILLIS_PER_DAY);
        assert!(parse_time("yesterday").is_err());
        assert_eq!(rfc3339(MILLIS_PER_DAY), "1970-01-02T00:00:00.000Z");
    }

    #[test]
    fn allocate_args() {
        let cli = Cli::try_parse_from([
            "launchpad-calc",
            "allocate",
            "--amount",
            "1000",
            "--price",
            "0.1",
            "--tge-bps",
            "2000",
            "--vesting-days",
            "180",
            "--start",
            "2025-01-01T00:00:00Z",
            "--end",
            "2025-01-08T00:00:00Z",
        ])
        .unwrap();
        let Command::Allocate(sale) = cli.command else { panic!("wrong subcommand") };
        let (_, alloc) = sale.allocation(&VestingCalculator::new()).unwrap();
        assert_eq!(alloc, Allocation { total_tokens: 10_000, tge_tokens: 2_000, vesting_tokens: 8_000 });
    }
}
