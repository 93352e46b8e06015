//! streamer-agu: address generator model and reshuffle case runner

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use streamer_agu::config::Config;
use streamer_agu::streamer::AddressGenerator;
use streamer_agu::testing::{CaseSuite, CaseTable};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str());

    match command {
        Some("run") => run_cases(args.get(2).map(PathBuf::from)),
        Some("trace") => {
            let name = args
                .get(3)
                .ok_or_else(|| anyhow!("usage: streamer-agu trace <cases.toml> <case>"))?;
            trace_case(PathBuf::from(&args[2]), name)
        }
        Some("sample-config") => {
            print!("{}", Config::sample_config());
            if let Some(path) = Config::user_config_path() {
                eprintln!("# user config location: {}", path.display());
            }
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("streamer-agu: affine multi-mover address generator");
    println!();
    println!("Usage:");
    println!("  streamer-agu run [cases.toml]        Run every case through streamer and oracle");
    println!("  streamer-agu trace <cases.toml> <case>  Print per-cycle addresses of one case");
    println!("  streamer-agu sample-config           Print a sample configuration file");
}

/// Run a case table and print the summary
fn run_cases(path: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = Config::get().clone();
    let path = path.unwrap_or_else(|| settings.cases_path());
    println!("Loading: {}", path.display());

    let table = CaseTable::from_file(&path)?;
    let mut suite = CaseSuite::new(table, settings);
    let result = suite.run_all();

    println!();
    print!("{}", suite.summary_report(&result));

    if !result.all_passed() {
        bail!("{} of {} cases failed", result.total - result.passed, result.total);
    }
    Ok(())
}

/// Print the address vectors of one case, cycle by cycle
fn trace_case(path: PathBuf, name: &str) -> anyhow::Result<()> {
    let table = CaseTable::from_file(&path)?;
    let case = table
        .case(name)
        .ok_or_else(|| anyhow!("no case named `{}` in {}", name, path.display()))?;

    let bench = table.bench;
    let n = case.reshuffle.element_count;
    let dst_base = bench
        .dst_base(n)
        .ok_or_else(|| anyhow!("bench placement of {} elements overflows", n))?;
    let config = case
        .reshuffle
        .to_engine_config(i64::try_from(bench.scale)?, i64::try_from(dst_base)?)
        .with_context(|| format!("case `{}`", name))?;
    let generator = AddressGenerator::new(config)?;

    println!("Case {}: {} elements, bounds {:?}", case.name, n, case.reshuffle.bounds());
    println!("{:>6}  {:<16} {}", "cycle", "index", "addresses");
    for cycle in generator.iter() {
        let movers: Vec<String> = cycle
            .movers()
            .iter()
            .map(|m| format!("{}={:?}", m.mover, m.addresses.as_slice()))
            .collect();
        println!(
            "{:>6}  {:<16} {}",
            cycle.cycle(),
            format!("{:?}", cycle.index()),
            movers.join(" ")
        );
    }

    Ok(())
}
