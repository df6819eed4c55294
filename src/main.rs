use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dockbuild::constants::CONFIG_ENV_VAR;
use dockbuild::error::exit_code;
use dockbuild::logging::{init_logging, RunSummary};
use dockbuild::{
    BuildError, BuildPlan, Builder, CliOverrides, DockerCli, DockerfileIndexer, ExcludeRules,
    FileConfig, RunOptions,
};
use std::path::PathBuf;
use std::process;

/// Builds interdependent container images in dependency order
#[derive(Parser, Debug)]
#[command(name = "dockbuild", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        env = CONFIG_ENV_VAR,
        value_name = "FILE",
        help = "Config file (defaults to ./dockbuild.toml when present)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<String>,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Pull, build and push images in dependency order")]
    Build(BuildArgs),

    #[command(about = "Print the pull/build/push order without running anything")]
    Order(OrderArgs),

    #[command(about = "Print the dependency graph in DOT format")]
    Graph(ScanArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct ScanArgs {
    #[arg(short = 'd', long = "dir", value_name = "DIR", help = "Directory to scan for Dockerfiles (repeatable)")]
    directories: Vec<PathBuf>,

    #[arg(long, value_name = "GLOB", help = "Skip paths matching this pattern (repeatable)")]
    exclude: Vec<String>,

    #[arg(long, help = "Treat duplicate image names as an error")]
    strict_duplicates: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct SelectionArgs {
    #[arg(value_name = "IMAGES", help = "Images to build (defaults to all)")]
    images: Vec<String>,

    #[arg(long, help = "Only the selected images and their dependents; assume prerequisites exist")]
    downstream: bool,
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
    #[command(flatten)]
    scan: ScanArgs,

    #[command(flatten)]
    selection: SelectionArgs,

    #[arg(short = 'r', long = "registry", value_name = "URL", help = "Registry to push to (repeatable)")]
    registries: Vec<String>,

    #[arg(long, overrides_with = "no_push", help = "Push built images")]
    push: bool,

    #[arg(long, overrides_with = "push", help = "Do not push, even if the config file enables it")]
    no_push: bool,

    #[arg(long, help = "Abort on the first failed build or push")]
    fail_fast: bool,

    #[arg(long, help = "Abort when a remote image cannot be pulled")]
    abort_on_pull_failure: bool,
}

#[derive(Args, Debug, Clone)]
struct OrderArgs {
    #[command(flatten)]
    scan: ScanArgs,

    #[command(flatten)]
    selection: SelectionArgs,

    #[arg(long, help = "Print the plan as JSON")]
    json: bool,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            log_level: self.log_level.clone(),
            json_logs: flag(self.json_logs),
            ..Default::default()
        };

        let (scan, selection) = match &self.command {
            Commands::Build(args) => {
                overrides.registries = args.registries.clone();
                overrides.push = match (args.push, args.no_push) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                overrides.fail_fast = flag(args.fail_fast);
                overrides.abort_on_pull_failure = flag(args.abort_on_pull_failure);
                (&args.scan, Some(&args.selection))
            }
            Commands::Order(args) => (&args.scan, Some(&args.selection)),
            Commands::Graph(scan) => (scan, None),
        };

        overrides.directories = scan.directories.clone();
        overrides.exclude = scan.exclude.clone();
        overrides.strict_duplicates = flag(scan.strict_duplicates);
        if let Some(selection) = selection {
            overrides.images = selection.images.clone();
            overrides.downstream = flag(selection.downstream);
        }
        overrides
    }
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            err.downcast_ref::<BuildError>().map_or(1, exit_code)
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let mut options = RunOptions::merge(file, cli.overrides());

    init_logging(&options.log_level, options.json_logs)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    // Nothing is pushed when only planning or inspecting.
    if !matches!(cli.command, Commands::Build(_)) {
        options.push = false;
    }

    let indexer = DockerfileIndexer::new(ExcludeRules::new(&options.exclude));
    let mut builder = Builder::new(options, DockerCli::default());

    match cli.command {
        Commands::Build(_) => {
            let summary = builder.run(&indexer)?;
            print_summary(&summary);
            Ok(if summary.is_clean() { 0 } else { 1 })
        }
        Commands::Order(args) => {
            let plan = builder.plan(&indexer)?;
            if args.json {
                let json = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
                println!("{}", json);
            } else {
                print_plan(&plan);
            }
            Ok(0)
        }
        Commands::Graph(_) => {
            builder.options().validate()?;
            builder.index_images(&indexer)?;
            builder.build_dependency_graph()?;
            println!("{}", builder.graph().to_dot());
            Ok(0)
        }
    }
}

fn print_plan(plan: &BuildPlan) {
    println!("{}", "Pull".bold().blue());
    for reference in &plan.pull {
        println!("  {}", reference.cyan());
    }
    println!("{}", "Build".bold().blue());
    for (i, name) in plan.build.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, name.green());
    }
    if !plan.push.is_empty() {
        println!("{}", "Push".bold().blue());
        for name in &plan.push {
            for registry in &plan.registries {
                println!("  {} -> {}", name.green(), registry.yellow());
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.is_clean() {
        println!("{}", "Build completed successfully".green().bold());
    } else {
        println!("{}", "Build completed with failures".red().bold());
    }
    println!("  Pulled:    {} ({} failed)", summary.pulled, summary.pull_failures);
    println!("  Built:     {} ({} failed)", summary.built, summary.build_failures);
    println!(
        "  Pushed:    {} ({} failed, {} skipped)",
        summary.pushed, summary.push_failures, summary.push_skipped
    );
    println!("  Duration:  {} ms", summary.total_duration_ms.to_string().yellow());
    for failed in &summary.failed {
        println!(
            "  {} {} {} (exit code {})",
            "✗".red(),
            failed.action,
            failed.target,
            failed.exit_code
        );
    }
}
