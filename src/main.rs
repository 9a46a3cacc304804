use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use traffic_movements::cluster::TuneGrid;
use traffic_movements::{Config, Pipeline};

/// Traffic movement discovery from camera tracks
#[derive(Parser, Debug)]
#[command(name = "traffic-movements")]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override a configuration value, e.g. `--set dataset.cluster.min_samples=20`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a frame-results file into the tracks table
    Track {
        /// Frame-results file; defaults to dataset.video
        source: Option<PathBuf>,
    },

    /// Import a legacy entity archive into the tracks table
    ImportLegacy {
        /// Archive path; defaults to dataset.legacy_json
        input: Option<PathBuf>,
    },

    /// Smooth tracks into trajectories
    BuildTrajectories,

    /// Vectorize trajectories with the configured preset
    GenFeatures,

    /// Cluster tracks, report outliers and consolidate exit groups
    Cluster,

    /// Cross-validate the configured classifier on the feature table
    Train,

    /// Summarize the outlier report
    ExploreOutliers {
        /// Number of most anomalous tracks to list and export
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Sweep OPTICS parameters over normalized entry/exit points
    Tune {
        #[arg(long, value_delimiter = ',')]
        min_samples: Vec<usize>,
        #[arg(long, value_delimiter = ',')]
        xi: Vec<f64>,
        #[arg(long, value_delimiter = ',')]
        max_eps: Vec<f64>,
    },

    /// Run the track stage for every matching file in a directory
    Batch {
        /// File or directory; defaults to dataset.video
        source: Option<PathBuf>,
        /// File extensions to pick up
        #[arg(long = "ext", value_delimiter = ',', default_value = "jsonl")]
        extensions: Vec<String>,
        #[arg(short, long)]
        recursive: bool,
        /// Turn on dataset.visualize for every run
        #[arg(long)]
        visualize: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    let mut overrides = cli.overrides.clone();
    if let Commands::Batch { visualize: true, .. } = cli.command {
        overrides.push("dataset.visualize=true".into());
    }
    let config = Config::load(cli.config.as_deref(), &overrides).context("loading configuration")?;
    let pipeline = Pipeline::new(config)?;

    match cli.command {
        Commands::Track { source } => {
            pipeline.track_frames(source.as_deref())?;
        }
        Commands::ImportLegacy { input } => {
            pipeline.import_legacy(input.as_deref())?;
        }
        Commands::BuildTrajectories => {
            pipeline.build_trajectories()?;
        }
        Commands::GenFeatures => {
            pipeline.generate_features()?;
        }
        Commands::Cluster => {
            let analysis = pipeline.cluster_tracks()?;
            println!(
                "{} tracks, {} clusters, {} outliers ({:.1}%)",
                analysis.stats.n_total, analysis.stats.n_clusters, analysis.stats.n_outliers, analysis.stats.pct_outliers
            );
        }
        Commands::Train => match pipeline.train_classifier()? {
            Some(report) => println!(
                "{} balanced-accuracy: mean={:.3} +- {:.3}",
                report.classifier, report.mean, report.std
            ),
            None => println!("nothing to train; see log"),
        },
        Commands::ExploreOutliers { top } => {
            let summary = pipeline.explore_outliers(top)?;
            println!(
                "total {}  clustered {} ({:.1}%)  outliers {} ({:.1}%)",
                summary.n_total,
                summary.n_clustered,
                summary.pct_of_total(summary.n_clustered),
                summary.n_outliers,
                summary.pct_of_total(summary.n_outliers)
            );
            for t in &summary.top {
                let o = &t.record;
                println!(
                    "  track {:5}: reach={:7.3} duration={:4} entry=({:.3},{:.3}) exit=({:.3},{:.3})",
                    o.track_id, o.reachability, t.duration, o.x_entry, o.y_entry, o.x_exit, o.y_exit
                );
            }
        }
        Commands::Tune { min_samples, xi, max_eps } => {
            let defaults = TuneGrid::default();
            let grid = TuneGrid {
                min_samples: if min_samples.is_empty() { defaults.min_samples } else { min_samples },
                xi: if xi.is_empty() { defaults.xi } else { xi },
                max_eps: if max_eps.is_empty() { defaults.max_eps } else { max_eps },
            };
            for r in pipeline.tune(&grid)? {
                println!(
                    "min_samples={:3} xi={:.3} max_eps={:.3} -> {:3} clusters, {:5} outliers ({:.1}%)",
                    r.min_samples, r.xi, r.max_eps, r.n_clusters, r.n_outliers, r.pct_outliers
                );
            }
        }
        Commands::Batch {
            source,
            extensions,
            recursive,
            ..
        } => {
            let Some(source) = source.or_else(|| pipeline.config().dataset.video.clone()) else {
                bail!("no batch source given and dataset.video is not set");
            };
            let report = pipeline.run_batch(&source, &extensions, recursive)?;
            if report.total() == 0 {
                bail!("no files with extensions {extensions:?} under {}", source.display());
            }
            for (file, err) in &report.failed {
                println!("failed: {} ({err})", file.display());
            }
            info!(succeeded = report.succeeded.len(), failed = report.failed.len(), "done");
        }
    }
    Ok(())
}
