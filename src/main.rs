use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use fitjoin::{
    logging, ActivityAggregation, MemberConflictPolicy, MemberCoverage, Pipeline, PipelineConfig,
};

/// Join member profiles with daily fitness activity by (memberID, date)
#[derive(Parser)]
#[command(name = "fitjoin")]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the join and write merged output
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Write the run report as JSON
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Parse both inputs and report malformed lines without writing output
    Validate {
        #[command(flatten)]
        job: JobArgs,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Member profile input
    #[arg(long)]
    members: Option<PathBuf>,

    /// Fitness activity input
    #[arg(long)]
    activity: Option<PathBuf>,

    /// Merged output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Side output for malformed lines
    #[arg(long, value_name = "PATH")]
    dead_letter: Option<PathBuf>,

    /// Field delimiter for inputs and outputs
    #[arg(long)]
    delimiter: Option<char>,

    /// Inputs have no header row
    #[arg(long)]
    no_headers: bool,

    /// Decimal places for numeric output fields
    #[arg(long)]
    precision: Option<usize>,

    /// Worker partitions (at most 256)
    #[arg(short = 'j', long)]
    partitions: Option<usize>,

    #[arg(long, value_enum)]
    activity_policy: Option<AggregationArg>,

    #[arg(long, value_enum)]
    member_policy: Option<MemberPolicyArg>,

    /// Also emit one MEMBER_ONLY row per member without activity
    #[arg(long)]
    include_member_only: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    SumAndAverage,
    AverageAll,
    KeepLargest,
}

impl From<AggregationArg> for ActivityAggregation {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::SumAndAverage => ActivityAggregation::SumAndAverage,
            AggregationArg::AverageAll => ActivityAggregation::AverageAll,
            AggregationArg::KeepLargest => ActivityAggregation::KeepLargest,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MemberPolicyArg {
    LargestSerialized,
    SmallestSerialized,
}

impl From<MemberPolicyArg> for MemberConflictPolicy {
    fn from(arg: MemberPolicyArg) -> Self {
        match arg {
            MemberPolicyArg::LargestSerialized => MemberConflictPolicy::LargestSerialized,
            MemberPolicyArg::SmallestSerialized => MemberConflictPolicy::SmallestSerialized,
        }
    }
}

impl JobArgs {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(p) = self.members {
            config.members_input = p;
        }
        if let Some(p) = self.activity {
            config.activity_input = p;
        }
        if let Some(p) = self.output {
            config.output = p;
        }
        if let Some(p) = self.dead_letter {
            config.dead_letter = Some(p);
        }
        if let Some(d) = self.delimiter {
            config.delimiter = d;
        }
        if self.no_headers {
            config.has_headers = false;
        }
        if let Some(p) = self.precision {
            config.precision = p;
        }
        if let Some(n) = self.partitions {
            config.partitions = n;
        }
        if let Some(policy) = self.activity_policy {
            config.activity_policy = policy.into();
        }
        if let Some(policy) = self.member_policy {
            config.member_policy = policy.into();
        }
        if self.include_member_only {
            config.coverage = MemberCoverage::IncludeMemberOnly;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Run { job, report } => run(job, report),
        Commands::Validate { job } => validate(job),
    }
}

fn run(job: JobArgs, report_path: Option<PathBuf>) -> Result<()> {
    let pipeline = Pipeline::new(job.into_config()?).context("Invalid configuration")?;
    let report = pipeline.run().context("Join run failed")?;

    println!("{}", report.summary());

    if let Some(path) = report_path {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    Ok(())
}

fn validate(job: JobArgs) -> Result<()> {
    let pipeline = Pipeline::new(job.into_config()?).context("Invalid configuration")?;
    let config = pipeline.config();

    let members = File::open(&config.members_input).with_context(|| {
        format!("Failed to open members input: {}", config.members_input.display())
    })?;
    let activity = File::open(&config.activity_input).with_context(|| {
        format!("Failed to open activity input: {}", config.activity_input.display())
    })?;

    let (members, activity) =
        pipeline.parse_sources(BufReader::new(members), BufReader::new(activity))?;

    for bad in members.malformed.iter().chain(activity.malformed.iter()) {
        println!("{}", bad);
    }
    println!(
        "members: {} lines, {} malformed | activity: {} lines, {} malformed",
        members.lines,
        members.malformed.len(),
        activity.lines,
        activity.malformed.len()
    );

    Ok(())
}
