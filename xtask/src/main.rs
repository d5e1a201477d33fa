// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::path::Path;
use std::path::PathBuf;
use std::process::Command as StdCommand;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "xtask", about = "Developer tasks for the ringstats workspace")]
struct Command {
    #[command(subcommand)]
    sub: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Compile every crate and target.
    Build,
    /// Check formatting and run clippy with warnings denied.
    Lint {
        /// Rewrite files instead of only checking formatting.
        #[arg(long)]
        fix: bool,
    },
    /// Run unit, integration and doc tests.
    Test {
        /// Capture no output and enable trace logging.
        #[arg(long)]
        verbose: bool,
    },
}

impl SubCommand {
    fn run(self) -> Result<(), String> {
        match self {
            SubCommand::Build => cargo(&["build", "--workspace", "--all-targets"]),
            SubCommand::Lint { fix } => {
                if fix {
                    cargo(&["fmt", "--all"])?;
                } else {
                    cargo(&["fmt", "--all", "--check"])?;
                }
                cargo(&[
                    "clippy",
                    "--workspace",
                    "--all-targets",
                    "--",
                    "-D",
                    "warnings",
                ])
            }
            SubCommand::Test { verbose } => {
                if verbose {
                    cargo_with_env(
                        &["test", "--workspace", "--", "--nocapture"],
                        &[("RUST_LOG", "ringstats=trace")],
                    )
                } else {
                    cargo(&["test", "--workspace"])
                }
            }
        }
    }
}

fn cargo(args: &[&str]) -> Result<(), String> {
    cargo_with_env(args, &[])
}

fn cargo_with_env(args: &[&str], envs: &[(&str, &str)]) -> Result<(), String> {
    let cargo = which::which("cargo").map_err(|err| format!("cannot find cargo: {err}"))?;
    let status = StdCommand::new(cargo)
        .args(args)
        .envs(envs.iter().copied())
        .current_dir(workspace_dir())
        .status()
        .map_err(|err| format!("failed to run cargo {}: {err}", args.join(" ")))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("cargo {} exited with {status}", args.join(" ")))
    }
}

fn workspace_dir() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn main() -> ExitCode {
    let cmd = Command::parse();
    match cmd.sub.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
