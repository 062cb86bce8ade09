// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::k_limits;
use crate::store::StoreModel;
use crate::worklist::WorkListKind;
use clap::{Arg, ArgAction, Command};
use itertools::Itertools;

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command {
    // We could put this into lazy_static! with a Mutex around, but we really do not expect
    // to construct this more than once per analysis run.
    Command::new("CORAX")
        .no_binary_name(true)
        .version("v0.9.2")
        .arg(
            Arg::new("max_steps")
                .long("max_steps")
                .num_args(1)
                .default_value("150000")
                .help("The step budget for one call to run; each dequeued node is one step."),
        )
        .arg(
            Arg::new("block_revisit_cap")
                .long("block_revisit_cap")
                .num_args(1)
                .default_value("3")
                .help("How many times one path may re-enter the same basic block."),
        )
        .arg(
            Arg::new("worklist")
                .long("worklist")
                .num_args(1)
                .value_parser(["dfs", "bfs", "block-priority"])
                .default_value("dfs")
                .help("The exploration order.\n")
                .long_help("With `dfs` the frontier is a stack.\nWith `bfs` it is a queue.\nWith `block-priority` lesser-explored blocks are visited first.\n"),
        )
        .arg(
            Arg::new("store_model")
                .long("store_model")
                .num_args(1)
                .value_parser(["flat", "region"])
                .default_value("region")
                .help("The store implementation.\n")
                .long_help("With `flat` only scalar variables are tracked.\nWith `region` field and element bindings are tracked too.\n"),
        )
        .arg(
            Arg::new("track_object_lifetimes")
                .long("track_object_lifetimes")
                .action(ArgAction::SetTrue)
                .help("Enable the allocation lifetime checker (double free, use after free, leaks)."),
        )
        .arg(
            Arg::new("track_taint")
                .long("track_taint")
                .action(ArgAction::SetTrue)
                .help("Enable taint propagation and taint sink checking."),
        )
        .arg(
            Arg::new("trim_graph_to_sinks")
                .long("trim_graph_to_sinks")
                .action(ArgAction::SetTrue)
                .help("Post-process the exploded graph to retain only paths reaching sinks."),
        )
}

/// Represents the configuration surface of the engine.
#[derive(Clone, Debug)]
pub struct Options {
    pub max_steps: u64,
    pub block_revisit_cap: u32,
    pub worklist: WorkListKind,
    pub store_model: StoreModel,
    pub track_object_lifetimes: bool,
    pub track_taint: bool,
    pub trim_graph_to_sinks: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            max_steps: k_limits::DEFAULT_MAX_STEPS,
            block_revisit_cap: k_limits::DEFAULT_BLOCK_REVISIT_CAP,
            worklist: WorkListKind::Dfs,
            store_model: StoreModel::Region,
            track_object_lifetimes: false,
            track_taint: false,
            trim_graph_to_sinks: false,
        }
    }
}

impl Options {
    /// Parse options from an argument string. The argument string will be
    /// split using unix shell escaping rules. Any content beyond the
    /// leftmost `--` token will be returned (excluding this token).
    pub fn parse_from_str(&mut self, s: &str) -> Result<Vec<String>, String> {
        let words = shellwords::split(s)
            .map_err(|e| format!("cannot parse argument string: {e:?}"))?;
        self.parse(&words)
    }

    /// Parses options from a list of strings. Any content beyond the
    /// leftmost `--` token will be returned (excluding this token).
    pub fn parse(&mut self, args: &[String]) -> Result<Vec<String>, String> {
        let mut our_args_end = args.len();
        let mut host_args_start = 0;
        if let Some((p, _)) = args.iter().find_position(|s| s.as_str() == "--") {
            our_args_end = p;
            host_args_start = p + 1;
        }
        let matches = make_options_parser()
            .try_get_matches_from(args[..our_args_end].iter())
            .map_err(|e| e.to_string())?;
        if let Some(steps) = matches.get_one::<String>("max_steps") {
            self.max_steps = steps
                .parse::<u64>()
                .map_err(|e| format!("--max_steps: {e}"))?;
        }
        if let Some(cap) = matches.get_one::<String>("block_revisit_cap") {
            self.block_revisit_cap = cap
                .parse::<u32>()
                .map_err(|e| format!("--block_revisit_cap: {e}"))?;
        }
        if let Some(worklist) = matches.get_one::<String>("worklist") {
            self.worklist = match worklist.as_str() {
                "bfs" => WorkListKind::Bfs,
                "block-priority" => WorkListKind::BlockPriority,
                _ => WorkListKind::Dfs,
            };
        }
        if let Some(store) = matches.get_one::<String>("store_model") {
            self.store_model = match store.as_str() {
                "flat" => StoreModel::Flat,
                _ => StoreModel::Region,
            };
        }
        if matches.get_flag("track_object_lifetimes") {
            self.track_object_lifetimes = true;
        }
        if matches.get_flag("track_taint") {
            self.track_taint = true;
        }
        if matches.get_flag("trim_graph_to_sinks") {
            self.trim_graph_to_sinks = true;
        }
        if host_args_start == 0 {
            Ok(vec![])
        } else {
            Ok(args[host_args_start..].to_vec())
        }
    }
}
