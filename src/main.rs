// SPDX-License-Identifier: Apache-2.0

//! hwsed - stream editor with SIMD and GPU pattern matching
//!
//! The CLI front-end: argument handling, file routing, in-place rewrite,
//! and verbose diagnostics. All matching and editing lives in the library.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use hwsed::{parse_script, run_pipeline, BackendOverride, Command, Dialect, ExecOptions};

#[derive(Parser, Debug)]
#[command(
    name = "hwsed",
    about = "Stream editor with SIMD pattern matching and optional CUDA compute dispatch",
    disable_version_flag = true
)]
struct Args {
    /// Append SCRIPT to the pipeline (repeatable)
    #[arg(short = 'e', long = "expression", value_name = "SCRIPT")]
    expression: Vec<String>,

    /// Suppress automatic line emission; only explicit `p` writes lines
    #[arg(short = 'n', long = "quiet", visible_alias = "silent")]
    quiet: bool,

    /// Interpret all regex patterns as extended
    #[arg(short = 'E', short_alias = 'r', long = "regexp-extended")]
    extended: bool,

    /// Write the result back to each input path instead of stdout
    #[arg(short = 'i', long = "in-place")]
    in_place: bool,

    /// Emit diagnostics (timing, backend choice) to stderr
    #[arg(short = 'V', long = "verbose")]
    verbose: bool,

    /// Apply the default backend policy (the default)
    #[arg(long = "auto", conflicts_with_all = ["gpu", "cpu", "metal", "vulkan"])]
    auto: bool,

    /// Force the device backend
    #[arg(long = "gpu", conflicts_with = "cpu")]
    gpu: bool,

    /// Force the host backend
    #[arg(long = "cpu")]
    cpu: bool,

    /// Force the device backend (historical spelling)
    #[arg(long = "metal", conflicts_with = "cpu")]
    metal: bool,

    /// Force the device backend (historical spelling)
    #[arg(long = "vulkan", conflicts_with = "cpu")]
    vulkan: bool,

    /// Script (when no -e is given), then input paths; `-` is stdin
    #[arg(value_name = "SCRIPT|FILE")]
    args: Vec<String>,
}

fn backend_override(args: &Args) -> BackendOverride {
    if args.cpu {
        BackendOverride::ForceHost
    } else if args.gpu || args.metal || args.vulkan {
        BackendOverride::ForceDevice
    } else {
        BackendOverride::Auto
    }
}

fn parse_commands(args: &Args) -> Result<(Vec<Command>, Vec<String>), String> {
    let dialect = if args.extended {
        Dialect::Extended
    } else {
        Dialect::Basic
    };

    let mut positional = args.args.clone();
    let mut scripts = args.expression.clone();
    if scripts.is_empty() {
        if positional.is_empty() {
            return Err("no script given; see --help".into());
        }
        scripts.push(positional.remove(0));
    }

    let mut commands = Vec::new();
    for script in &scripts {
        match parse_script(script, dialect) {
            Ok(parsed) => commands.extend(parsed),
            Err(e) => return Err(format!("{}: {}", e, script)),
        }
    }
    Ok((commands, positional))
}

fn read_input(path: &str) -> io::Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(path)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (commands, mut files) = match parse_commands(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("hwsed: {}", message);
            return ExitCode::from(1);
        }
    };

    if files.is_empty() {
        files.push("-".to_string());
    }

    let opts = ExecOptions {
        quiet: args.quiet,
        backend: backend_override(&args),
    };

    let mut io_failed = false;
    let stdout = io::stdout();

    for path in &files {
        if args.in_place && path == "-" {
            eprintln!("hwsed: cannot edit standard input in place");
            return ExitCode::from(1);
        }

        let input = match read_input(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("hwsed: {}: {}", path, e);
                io_failed = true;
                continue;
            }
        };

        let started = Instant::now();
        let (output, reports) = match run_pipeline(&input, &commands, &opts) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("hwsed: {}", e);
                return ExitCode::from(1);
            }
        };

        if args.verbose {
            for (i, report) in reports.iter().enumerate() {
                eprintln!(
                    "hwsed: {}: command {}: backend={} matches={} time={}us",
                    path,
                    i + 1,
                    report.backend,
                    report.matches,
                    report.micros
                );
            }
            eprintln!(
                "hwsed: {}: {} bytes in, {} bytes out, {}us total",
                path,
                input.len(),
                output.len(),
                started.elapsed().as_micros()
            );
        }

        if args.in_place {
            // Whole-file rewrite; best-effort, not atomic.
            if let Err(e) = fs::write(path, &output) {
                eprintln!("hwsed: {}: {}", path, e);
                io_failed = true;
            }
        } else {
            let mut out = stdout.lock();
            if out.write_all(&output).and_then(|_| out.flush()).is_err() {
                // A closed pipe is not an editing failure.
                return ExitCode::from(0);
            }
        }
    }

    if io_failed {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
