//! ferrite-trainer: trains an MLP classifier on IDX (MNIST-format) data or a
//! synthetic dataset, with checkpointing, early stopping and experiment
//! tracking.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ferrite_trainer::data::{gaussian_blobs, load_idx_pair, InMemoryDataset};
use ferrite_trainer::{run, Mlp, NetworkSpec, StopReason, Tracker, TrainingConfig};

#[derive(Parser, Debug)]
#[command(name = "ferrite-trainer", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (FERRITE_* environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracking backends: none, local, remote-a, remote-b or a comma list
    #[arg(long)]
    tracker: Option<String>,

    /// Directory for the best checkpoint and the reports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Train on generated Gaussian blobs instead of IDX files
    #[arg(long, conflicts_with_all = ["train_images", "train_labels", "test_images", "test_labels"])]
    synthetic: bool,

    #[arg(long, required_unless_present = "synthetic")]
    train_images: Option<PathBuf>,

    #[arg(long, required_unless_present = "synthetic")]
    train_labels: Option<PathBuf>,

    #[arg(long, required_unless_present = "synthetic")]
    test_images: Option<PathBuf>,

    #[arg(long, required_unless_present = "synthetic")]
    test_labels: Option<PathBuf>,

    /// Number of classes in the IDX labels
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// Fraction of the training data held out for validation
    #[arg(long, default_value_t = 0.1)]
    val_split: f64,

    /// Hidden layer sizes, e.g. 256,128
    #[arg(long, value_delimiter = ',', default_value = "128")]
    hidden: Vec<usize>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let mut config = TrainingConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(tracker) = &cli.tracker {
        config.tracking.backends = tracker.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.checkpoint_path = Some(dir.join("best_model.json"));
        config.report_dir = Some(dir.join("reports"));
    }
    config.validate().context("validating configuration")?;
    if !(0.0..1.0).contains(&cli.val_split) {
        bail!("--val-split must lie in [0, 1), got {}", cli.val_split);
    }

    let (train_full, mut test) = if cli.synthetic {
        let (x, y) = gaussian_blobs(300, 4, 16, 1.5, config.seed);
        let all = InMemoryDataset::new(x, y, config.batch_size)?;
        all.split(0.2, config.seed.wrapping_add(1))
    } else {
        let (Some(train_images), Some(train_labels), Some(test_images), Some(test_labels)) =
            (&cli.train_images, &cli.train_labels, &cli.test_images, &cli.test_labels)
        else {
            bail!("IDX mode needs --train-images, --train-labels, --test-images and --test-labels");
        };
        let train = load_idx_pair(train_images, train_labels, cli.classes).context("reading training data")?;
        let test = load_idx_pair(test_images, test_labels, cli.classes).context("reading test data")?;
        (
            InMemoryDataset::new(train.inputs, train.labels, config.batch_size)?,
            InMemoryDataset::new(test.inputs, test.labels, config.batch_size)?,
        )
    };
    let num_classes = if cli.synthetic { train_full.num_classes().max(test.num_classes()) } else { cli.classes };
    let input_size = train_full.num_features();
    let (train, mut val) = train_full.split(cli.val_split, config.seed);
    let mut train = train.shuffled(config.seed);
    info!(train = train.len(), val = val.len(), test = test.len(), input_size, num_classes, "datasets ready");

    let spec = NetworkSpec::relu(input_size, &cli.hidden, num_classes);
    let mut model = Mlp::new(&spec, &mut StdRng::seed_from_u64(config.seed));

    let mut tracker = Tracker::from_config(&config.tracking)?;
    let report = run(&mut model, &mut train, &mut val, &mut test, &config, &mut tracker)?;

    if let Some(best) = &report.best {
        info!(epoch = best.epoch, val_accuracy = best.val_acc, "best checkpoint");
    }
    if let Some(eval) = &report.test {
        println!(
            "test accuracy {:.4}  precision {:.4}  recall {:.4}  f1 {:.4}",
            eval.accuracy, eval.precision, eval.recall, eval.f1
        );
    }
    if let StopReason::Aborted(exhausted) = &report.stop_reason {
        bail!("training aborted: {exhausted}");
    }
    Ok(())
}
