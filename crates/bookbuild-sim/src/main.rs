//! Simulated raise on the in-memory ledger.
//!
//! Issues one auction and a random bid per bidder, schedules settlement at
//! expiry and prints the report.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use bookbuild_ledger::{InMemoryNotary, InMemoryVault, LocalNetwork};
use bookbuild_settlement::{BidderResponder, Collaborators, ExpiryScheduler, SettlementOrchestrator};
use bookbuild_types::{
    AuctionRecord, AuctionRef, AuctionState, BidRecord, BidRef, BidSettlement, BidStatus,
    BookbuildError, Broadcaster, LedgerRecord, PartyDirectory, PartyIdentity, PartyKey, RecordStore, Responder,
    Result, SequencingOracle, SettlementConfig, SettlementReport,
};
use chrono::Utc;
use clap::Parser;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;

#[derive(Debug, Parser)]
#[command(name = "bookbuild-sim", about = "Settle a simulated sealed-bid raise")]
struct Args {
    /// Number of bidders, one bid each.
    #[arg(long, env = "BOOKBUILD_BIDDERS", default_value_t = 8)]
    bidders: u8,

    /// Capital the auction must raise.
    #[arg(long, env = "BOOKBUILD_TARGET", default_value = "500")]
    target: Decimal,

    /// Lowest bid price.
    #[arg(long, default_value_t = 5)]
    min_price: u32,

    /// Highest bid price.
    #[arg(long, default_value_t = 15)]
    max_price: u32,

    /// Bidders decline allotments above this clearing price.
    #[arg(long)]
    decline_above: Option<Decimal>,

    /// Milliseconds until the auction expires.
    #[arg(long, default_value_t = 250)]
    expiry_ms: u64,

    /// Artificial notary latency per finalization, in milliseconds.
    #[arg(long, default_value_t = 0)]
    notary_latency_ms: u64,

    /// Seed for keys and bids.
    #[arg(long, env = "BOOKBUILD_SEED", default_value_t = 7)]
    seed: u64,

    /// JSON settlement configuration. Missing fields take their defaults.
    #[arg(long, env = "BOOKBUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `worker_limit` from the configuration.
    #[arg(long)]
    worker_limit: Option<usize>,

    /// Log filter directives.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_filter: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(filter: &str, json: bool) {
    let builder =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<SettlementConfig> {
    let mut config = match &args.config {
        Some(path) => SettlementConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SettlementConfig::default(),
    };
    if let Some(limit) = args.worker_limit {
        config.worker_limit = limit;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<SettlementReport> {
    let config = load_config(&args)?;
    if args.min_price == 0 || args.min_price > args.max_price {
        return Err(BookbuildError::Configuration(format!(
            "price range {}..={} is empty or not positive",
            args.min_price, args.max_price
        )));
    }
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut notary = InMemoryNotary::new(PartyKey::from_seed(rng.r#gen()));
    if args.notary_latency_ms > 0 {
        notary = notary.with_latency(Duration::from_millis(args.notary_latency_ms));
    }
    let notary = Arc::new(notary);
    let owner = PartyKey::from_seed(rng.r#gen());
    let owner_vault = Arc::new(InMemoryVault::new(owner.id()));
    let network = Arc::new(LocalNetwork::new(owner.id()));
    network.register(owner.id(), owner_vault.clone(), None).await;

    let mut directory = PartyDirectory::new();
    directory.insert(PartyIdentity::new(owner.id(), "issuer"));
    let mut bidders = Vec::with_capacity(usize::from(args.bidders));
    for i in 0..args.bidders {
        let key = PartyKey::from_seed(rng.r#gen());
        let vault = Arc::new(InMemoryVault::new(key.id()));
        let mut responder = BidderResponder::new(key.clone(), vault.clone(), notary.identity());
        if let Some(ceiling) = args.decline_above {
            responder = responder.with_price_ceiling(ceiling);
        }
        let responder: Arc<dyn Responder> = Arc::new(responder);
        network.register(key.id(), vault, Some(responder)).await;
        directory.insert(PartyIdentity::new(key.id(), format!("investor-{i}")));
        bidders.push(key);
    }

    let expiry = Utc::now()
        + chrono::Duration::milliseconds(i64::try_from(args.expiry_ms).unwrap_or(i64::MAX));
    let auction = AuctionRecord {
        id: AuctionRef::new(),
        item_name: "Simulated raise".to_string(),
        item_description: format!("{} bidders, seed {}", args.bidders, args.seed),
        capital_target: args.target,
        expiry,
        owner: owner.id(),
        participants: bidders.iter().map(PartyKey::id).collect(),
        active: true,
        state: AuctionState::Open,
        allocation_root: None,
    };
    let issued = notary
        .issue(vec![LedgerRecord::Auction(auction.clone())], &owner)
        .await?;
    network.broadcast(&issued, &auction.audience()).await?;

    for key in &bidders {
        let bid = BidRecord {
            id: BidRef::new(),
            auction: auction.id,
            bidder: key.id(),
            owner: owner.id(),
            price: Decimal::from(rng.gen_range(args.min_price..=args.max_price)),
            quantity: Decimal::from(rng.gen_range(1..=20u32)),
            status: BidStatus::Open,
            clearing_price: None,
        };
        tracing::debug!(bid = %bid.id, bidder = %key.id(), price = %bid.price, quantity = %bid.quantity, "Bid submitted");
        let submitted = notary.issue(vec![LedgerRecord::Bid(bid)], key).await?;
        network.broadcast(&submitted, &[owner.id(), key.id()]).await?;
    }
    let open = owner_vault.open_bids(auction.id).await?.len();
    tracing::info!(auction = %auction.id, bids = open, target = %auction.capital_target, %expiry, "Auction open");

    let ports = Collaborators {
        store: owner_vault,
        oracle: notary,
        network: network.clone(),
        broadcaster: network,
        directory: Arc::new(directory),
    };
    let orchestrator = SettlementOrchestrator::new(owner, ports, config)?;
    ExpiryScheduler::new(Arc::new(orchestrator))
        .schedule(&auction)
        .join()
        .await
}

fn print_report(report: &SettlementReport) {
    let clearing = report
        .clearing_price
        .map_or_else(|| "-".to_string(), |cp| cp.to_string());
    println!("auction        {}", report.auction);
    println!("state          {}", report.state);
    println!("closing tx     {}", report.closing);
    println!("available      {}", report.total_available);
    println!("raised         {}", report.total_raised);
    println!("clearing price {clearing}");
    println!();
    for result in &report.bids {
        let detail = match &result.settlement {
            BidSettlement::Allotted { transition, .. } => format!("tx {transition}"),
            BidSettlement::Failed { error, .. } if error.is_retryable() => {
                format!("{error} (retryable)")
            }
            BidSettlement::Failed { error, .. } => error.to_string(),
            BidSettlement::NotAllotted => String::new(),
        };
        println!("{} {} {:<40} {detail}", result.bid, result.bidder, result.settlement.to_string());
    }
    println!();
    println!("allotted {} / failed {} / bids {}", report.allotted(), report.failed(), report.bids.len());
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_filter, args.log_json);

    match run(args).await {
        Ok(report) => {
            print_report(&report);
            if report.failed() > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            tracing::error!(error = %err, kind = %err.kind(), "Settlement aborted");
            ExitCode::FAILURE
        }
    }
}
