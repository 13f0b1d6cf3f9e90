// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line jq
//!
//! Runs a filter over every JSON record read from the given files, or from
//! stdin when none are given, and prints each output on its own line.

use anyhow::Context;
use clap::Parser;
use octofhir_jq::codec::{self, PrintOptions};
use octofhir_jq::{Bindings, HostValue, Jq, JqConfig, JqError};
use std::fs;
use std::io::{self, Read};
use std::process;

const EXIT_USAGE: i32 = 2;
const EXIT_COMPILE: i32 = 3;
const EXIT_RUNTIME: i32 = 5;

#[derive(Parser)]
#[command(name = "octofhir-jq")]
#[command(about = "Run jq filters over JSON input")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// jq filter to run
    filter: String,
    /// JSON files to read (reads from stdin if none are given)
    files: Vec<String>,
    /// Use `null` as the single input instead of reading any
    #[arg(short = 'n', long)]
    null_input: bool,
    /// Bind `$NAME` to the string VALUE
    #[arg(long = "arg", num_args = 2, value_names = ["NAME", "VALUE"])]
    args: Vec<String>,
    /// Bind `$NAME` to the JSON text VALUE
    #[arg(long = "argjson", num_args = 2, value_names = ["NAME", "VALUE"])]
    json_args: Vec<String>,
    /// Print each output on a single line
    #[arg(short = 'c', long)]
    compact_output: bool,
    /// Sort object keys in the output
    #[arg(short = 'S', long)]
    sort_keys: bool,
    /// Print string outputs without quotes
    #[arg(short = 'r', long)]
    raw_output: bool,
}

fn main() {
    human_panic::setup_panic!();
    env_logger::init();

    let cli = Cli::parse();

    let bindings = match collect_bindings(&cli) {
        Ok(bindings) => bindings,
        Err(e) => {
            eprintln!("Error in arguments: {e:#}");
            process::exit(EXIT_USAGE);
        }
    };

    let inputs = if cli.null_input {
        vec![HostValue::Null]
    } else {
        match read_inputs(&cli.files) {
            Ok(inputs) => inputs,
            Err(e) => {
                eprintln!("Error reading input: {e:#}");
                process::exit(EXIT_USAGE);
            }
        }
    };

    let print = PrintOptions {
        pretty: !cli.compact_output,
        sort_keys: cli.sort_keys,
    };
    let jq = Jq::with_config(JqConfig::builder().with_print_options(print).build());
    let program = match jq.compile(&cli.filter, &bindings) {
        Ok(program) => program,
        Err(JqError::Compile(e)) => {
            eprintln!("{}: {e}", prefix());
            process::exit(EXIT_COMPILE);
        }
        Err(e) => {
            eprintln!("{}: {e}", prefix());
            process::exit(EXIT_USAGE);
        }
    };

    let mut failed = false;
    for input in &inputs {
        let outputs = match program.run(input) {
            Ok(outputs) => outputs,
            Err(e) => {
                eprintln!("{}: error: {e}", prefix());
                failed = true;
                continue;
            }
        };
        for output in outputs {
            match output.and_then(|value| render(&value, &print, cli.raw_output)) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("{}: error: {e}", prefix());
                    failed = true;
                }
            }
        }
    }

    if failed {
        process::exit(EXIT_RUNTIME);
    }
}

fn collect_bindings(cli: &Cli) -> anyhow::Result<Bindings> {
    let mut bindings = Bindings::new();
    for pair in cli.args.chunks(2) {
        if let [name, value] = pair {
            bindings.insert(name.clone(), HostValue::from(value.as_str()));
        }
    }
    for pair in cli.json_args.chunks(2) {
        if let [name, text] = pair {
            let value: serde_json::Value = serde_json::from_str(text)
                .with_context(|| format!("invalid JSON text passed to --argjson {name}"))?;
            bindings.insert(name.clone(), HostValue::from(value));
        }
    }
    Ok(bindings)
}

fn read_inputs(files: &[String]) -> anyhow::Result<Vec<HostValue>> {
    let mut records = Vec::new();
    if files.is_empty() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        records.extend(codec::parse_records(&buffer)?);
    } else {
        for filename in files {
            let content = fs::read_to_string(filename)
                .with_context(|| format!("failed to read file '{filename}'"))?;
            let parsed = codec::parse_records(&content)
                .with_context(|| format!("failed to parse '{filename}'"))?;
            records.extend(parsed);
        }
    }
    Ok(records)
}

fn render(value: &HostValue, print: &PrintOptions, raw_output: bool) -> octofhir_jq::Result<String> {
    match value.as_str() {
        Some(text) if raw_output => Ok(text.to_string()),
        _ => codec::print(value, print),
    }
}

#[cfg(feature = "terminal")]
fn prefix() -> String {
    use colored::Colorize;
    "jq".red().bold().to_string()
}

#[cfg(not(feature = "terminal"))]
fn prefix() -> String {
    "jq".to_string()
}
