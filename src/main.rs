use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crossrec::{
    stable_set, FastMf, FileSimilarity, ImplicitMf, ItemKnn, ItemNeighborhoods, Jaccard,
    MfHyperParams, NeighborMf, PreferenceData, Recommender, SimMf, StableSet, UserKnn,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Cross-domain recommendation runner: trains the selected algorithm on the
/// merged source + target data and prints `user TAB item TAB score`
/// recommendations for every test user, restricted to target-domain items.
#[derive(Parser)]
#[command(name = "crossrec", version)]
struct Cli {
    /// Source-domain preference file (auxiliary signal)
    source: PathBuf,
    /// Target-domain training preference file
    train: PathBuf,
    /// Test preference file; its users receive recommendations
    test: PathBuf,
    /// Maximum recommendations per user
    num_recs: usize,
    #[command(subcommand)]
    algorithm: Algorithm,
}

#[derive(Subcommand)]
enum Algorithm {
    /// User kNN with Jaccard similarity over item profiles
    UserKnn {
        #[arg(long, default_value_t = 50)]
        neighbors: usize,
    },
    /// Item kNN with Jaccard similarity over user profiles
    ItemKnn,
    /// Implicit-feedback MF with exact ALS solves
    Imf(MfArgs),
    /// Implicit-feedback MF trained with RR1 fast ALS
    FastImf(MfArgs),
    /// Cross-domain MF coupled through pairwise item similarities
    SimMf {
        #[command(flatten)]
        mf: MfArgs,
        #[arg(long, default_value_t = 0.015)]
        lambda_cross: f32,
        /// Three-column item similarity file
        sim_file: PathBuf,
    },
    /// Cross-domain MF with neighbor-distance regularization
    NeighborMf {
        #[command(flatten)]
        mf: MfArgs,
        #[arg(long, default_value_t = 0.015)]
        lambda_cross: f32,
        /// Neighbor list size per item
        #[arg(long, default_value_t = 10)]
        neighbors: usize,
        /// L1-normalize each neighbor list
        #[arg(long)]
        normalize: bool,
        /// Three-column item similarity file, read as directed edges
        sim_file: PathBuf,
    },
}

#[derive(Args)]
struct MfArgs {
    #[arg(long, default_value_t = 10)]
    factors: usize,
    #[arg(long, default_value_t = 0.015)]
    lambda: f32,
    #[arg(long, default_value_t = 15)]
    iterations: usize,
    #[arg(long, default_value_t = 1.0)]
    alpha: f32,
}

impl MfArgs {
    fn apply(&self, params: &mut MfHyperParams) -> crossrec::Result<()> {
        params.set_factors(self.factors)?;
        params.set_lambda(self.lambda)?;
        params.set_iterations(self.iterations)?;
        params.set_alpha(self.alpha)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = load(&cli.source, "source")?;
    let mut train = load(&cli.train, "train")?;
    let test = load(&cli.test, "test")?;

    // All source-domain data becomes training signal, but only the original
    // target-domain items are recommendation candidates.
    let mut target_items: StableSet<String> = stable_set();
    target_items.extend(train.items().map(str::to_owned));
    train.merge(&source);
    info!(
        users = train.num_users(),
        items = train.num_items(),
        likes = train.size(),
        "merged training data"
    );

    let recommender: Box<dyn Recommender + '_> = match &cli.algorithm {
        Algorithm::UserKnn { neighbors } => {
            Box::new(UserKnn::new(&train, Jaccard::over_users(&train), *neighbors))
        }
        Algorithm::ItemKnn => Box::new(ItemKnn::new(&train, Jaccard::over_items(&train))),
        Algorithm::Imf(args) => {
            let mut mf = ImplicitMf::new(&train);
            args.apply(mf.params_mut())?;
            mf.train()?;
            Box::new(mf)
        }
        Algorithm::FastImf(args) => {
            let mut mf = FastMf::new(&train);
            args.apply(mf.params_mut())?;
            mf.train()?;
            Box::new(mf)
        }
        Algorithm::SimMf { mf: args, lambda_cross, sim_file } => {
            let sim = FileSimilarity::from_file(sim_file, &train)
                .with_context(|| format!("loading similarities from {}", sim_file.display()))?;
            let mut mf = SimMf::new(&train, sim, target_items.iter().map(String::as_str));
            args.apply(mf.params_mut())?;
            mf.set_lambda_cross(*lambda_cross)?;
            mf.train()?;
            Box::new(mf)
        }
        Algorithm::NeighborMf { mf: args, lambda_cross, neighbors, normalize, sim_file } => {
            let neighborhoods = ItemNeighborhoods::from_file(sim_file, &train, *neighbors, *normalize)
                .with_context(|| format!("loading neighborhoods from {}", sim_file.display()))?;
            let mut mf = NeighborMf::new(&train, neighborhoods, target_items.iter().map(String::as_str));
            args.apply(mf.params_mut())?;
            mf.set_lambda_cross(*lambda_cross)?;
            mf.train()?;
            Box::new(mf)
        }
    };

    for user in test.users() {
        for rec in recommender.recommend_from(user, cli.num_recs, &target_items) {
            println!("{user}\t{}\t{}", rec.item, rec.score);
        }
    }

    Ok(())
}

fn load(path: &PathBuf, name: &str) -> Result<PreferenceData> {
    let data = PreferenceData::from_file(path)
        .with_context(|| format!("loading {name} data from {}", path.display()))?;
    info!(
        users = data.num_users(),
        items = data.num_items(),
        likes = data.size(),
        "{name} dataset"
    );
    Ok(data)
}
