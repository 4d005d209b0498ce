//! # bgpd-sync CLI
//!
//! `run` starts the daemon from a TOML config. `diff` compares two snapshot
//! files offline and shows what the daemon would make of each changed key:
//!
//! ```sh
//! $ bgpd-sync diff before.json after.json --node n0
//!  Change   Key                                  Meaning                 Rule         Old Value  New Value
//! ----------+------------------------------------+-----------------------+------------+----------+-----------
//!  Added    /calico/bgp/v1/host/n1/ip_addr_v4    Node IPv4 address (n1)  node config  ---        10.0.0.5
//!  Updated  /calico/bgp/v1/global/as_num         Global AS (restart)     global AS    64512      64513
//! ```
use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
#[cfg(feature = "cli")]
use colored::*;

use crate::keys::{InterpretedKey, KeyInterpreter, KeyLayout};
use crate::snapshot::{diff, Change, Snapshot};
use crate::source::read_snapshot;

#[cfg(feature = "cli")]
mod display;
#[cfg(feature = "cli")]
mod table;

#[derive(Parser, Debug)]
#[clap(name = "bgpd-sync", rename_all = "kebab-case")]
/// Keeps BGP sessions and IP pools in sync with a polled config snapshot
pub struct Args {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences), global = true)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Run the bgpd-sync daemon
    Run(RunOptions),
    /// Compare two snapshot files and show how each changed key is interpreted
    #[clap(alias = "d")]
    Diff(DiffOptions),
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct RunOptions {
    /// Path to bgpd-sync config.toml
    pub config_path: String,
    /// Name of the node this daemon runs on (overrides config file)
    #[clap(long, env = "NODENAME")]
    pub node_name: Option<String>,
    /// Seconds between peering config polls (overrides config file)
    #[clap(long, env = "INTERVAL")]
    pub interval: Option<u16>,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct DiffOptions {
    /// Previous snapshot (flat JSON object of key/value strings)
    pub old: PathBuf,
    /// Current snapshot
    pub new: PathBuf,
    /// Interpret keys relative to this node
    #[clap(long, env = "NODENAME", default_value = "")]
    pub node: String,
    #[clap(long, default_value = "/calico/bgp/v1/global")]
    pub global_prefix: String,
    #[clap(long, default_value = "/calico/bgp/v1/host")]
    pub nodes_prefix: String,
}

/// A changed key and what it means
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRow {
    pub change: Change,
    pub key: String,
    pub interpretation: InterpretedKey,
    pub rule: Option<&'static str>,
    pub old: Option<String>,
    pub new: Option<String>,
}

pub fn diff_rows(interpreter: &KeyInterpreter, old: &Snapshot, new: &Snapshot) -> Vec<DiffRow> {
    let delta = diff(old, new).sorted();
    delta
        .changes()
        .map(|(change, key)| DiffRow {
            change,
            key: key.to_string(),
            interpretation: interpreter.interpret(key),
            rule: interpreter.matched_rule(key),
            old: old.get(key).cloned(),
            new: new.get(key).cloned(),
        })
        .collect()
}

async fn run_diff(options: &DiffOptions) -> Result<(), Box<dyn Error>> {
    let old = read_snapshot(&options.old).await?;
    let new = read_snapshot(&options.new).await?;
    let layout = KeyLayout::new(&options.global_prefix, &options.nodes_prefix);
    let interpreter = KeyInterpreter::new(&layout, &options.node);
    let rows = diff_rows(&interpreter, &old, &new);
    let unchanged = diff(&old, &new).unchanged.len();
    print_rows(&rows);
    println!("{} changed, {} unchanged", rows.len(), unchanged);
    Ok(())
}

#[cfg(feature = "cli")]
fn print_rows(rows: &[DiffRow]) {
    table::OutputTable::from_rows(rows).print();
}

#[cfg(not(feature = "cli"))]
fn print_rows(rows: &[DiffRow]) {
    for row in rows {
        println!("{} {} [{}]", row.change, row.key, row.interpretation);
    }
}

/// bgpd-sync commands other than running the daemon
pub async fn query(args: &Args) {
    let result = match &args.cmd {
        Command::Diff(options) => run_diff(options).await,
        // Run is handled in main
        Command::Run(_) => Ok(()),
    };
    if let Err(err) = result {
        #[cfg(feature = "cli")]
        eprintln!("{}", err.to_string().red());
        #[cfg(not(feature = "cli"))]
        eprintln!("{}", err);
    }
}
