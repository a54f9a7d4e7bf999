// Copyright 2025 Gregory Petrosyan <pgregory@pgregory.net>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Makefile replacement, using `cargo xtask` pattern.

use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
/// `scenario_ga` task runner
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run default CI checks
    Ci {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run linter
    Lint {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,
    },
    /// Run the usage example search with logging enabled
    Example {
        /// Search mode: `primary` or `avfuzzer`
        #[arg(long, default_value = "primary")]
        mode: String,
    },
    /// Run tests
    Test {
        #[arg(long, conflicts_with = "package")]
        all: bool,

        #[arg(short, long)]
        package: Option<String>,

        filter: Option<String>,
    },
}

#[test]
fn verify_cli() {
    use clap::CommandFactory as _;
    Cli::command().debug_assert();
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let sh = Shell::new()?;
    let _guard = sh.push_dir(std::env::var("CARGO_WORKSPACE_DIR")?);
    match cli.command {
        Commands::Ci { all, package } => run_ci(&sh, all, &package.unwrap_or_default()),
        Commands::Lint { all, package } => run_lint(&sh, all, &package.unwrap_or_default()),
        Commands::Example { mode } => run_example(&sh, &mode),
        Commands::Test {
            all,
            package,
            filter,
        } => run_test(
            &sh,
            all,
            &package.unwrap_or_default(),
            &filter.unwrap_or_default(),
        ),
    }
}

fn root_dirs(all: bool) -> &'static [&'static str] {
    if all {
        &[
            "scenario_ga_example",
            "", // last to be the last in the terminal output
        ]
    } else {
        &[""]
    }
}

fn package_args(package: &str) -> Vec<&str> {
    if package.is_empty() {
        vec![]
    } else {
        vec!["--package", package]
    }
}

fn run_ci(sh: &Shell, all: bool, package: &str) -> Result<()> {
    run_lint(sh, all, package)?;
    run_test(sh, all, package, "")?;

    Ok(())
}

fn run_lint(sh: &Shell, all: bool, package: &str) -> Result<()> {
    let package_args = &package_args(package);
    for &dir in root_dirs(all) {
        let _guard = sh.push_dir(dir);
        cmd!(sh, "cargo fmt --check {package_args...}").run()?;
        cmd!(
            sh,
            "cargo clippy --all-targets --quiet {package_args...} -- -D warnings"
        )
        .run()?;
    }
    Ok(())
}

fn run_example(sh: &Shell, mode: &str) -> Result<()> {
    let _guard = sh.push_dir("scenario_ga_example");
    let filter = match mode {
        "avfuzzer" => "avfuzzer_search",
        "primary" => "primary_search",
        other => anyhow::bail!("unknown search mode {other:?}"),
    };
    log::info!("running {filter} from scenario_ga_example");
    cmd!(sh, "cargo test --quiet -- {filter} --nocapture")
        .env("RUST_LOG", "scenario_ga=info")
        .run()?;
    Ok(())
}

fn run_test(sh: &Shell, all: bool, package: &str, filter: &str) -> Result<()> {
    let package_args = &package_args(package);
    let filter_args = if filter.is_empty() {
        &[][..]
    } else {
        &["--", filter][..]
    };
    for dir in root_dirs(all) {
        let _guard = sh.push_dir(dir);
        cmd!(sh, "cargo test --quiet {package_args...} {filter_args...}").run()?;
    }
    Ok(())
}
