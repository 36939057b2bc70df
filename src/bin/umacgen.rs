//! Command-line front end for UMAC key material and `mulmod` checking.
//!
//! Generates the subkey/pad headers, prints derived material, serves the
//! `mulmod` line protocol, and runs differential checks against either this
//! crate's field or an external program.

use std::env;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use umac_derive::artifact::write_artifacts;
use umac_derive::harness::serve_mulmod;
use umac_derive::{
    ConfigLayer, DifferentialHarness, DirectorySink, ExternalMulMod, GeneratorConfig,
    HarnessConfig, HarnessError, HarnessReport, Kdf, Prime128, TagLength,
};

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_usage() {
    println!("Usage: umacgen <command> [options]");
    println!("  keys [--tag <bits>] [--json]        print derived subkeys");
    println!("  pads [--tag <bits>]                 print the pad for each tag length");
    println!("  header [--out-dir <dir>]            write uhash_vec_keys.h and umac_vec_keys.h");
    println!("  mulmod-serve                        answer mulmod requests on stdin");
    println!("  mulmod-self [--trials N] [--seed S] [--json]");
    println!("                                      check the built-in field in parallel");
    println!("  mulmod-check [--trials N] [--seed S] [--timeout-ms MS] [--json] -- <program> [args...]");
    println!("                                      check an external mulmod program");
    println!();
    println!("Common options:");
    println!("  --config <file.json>  --key <text>  --key-hex <hex>");
    println!("  --nonce <text>  --nonce-hex <hex>");
    println!("Environment: UMAC_KEY, UMAC_KEY_HEX, UMAC_NONCE, UMAC_NONCE_HEX, UMAC_OUT_DIR,");
    println!("  UMAC_MULMOD_TRIALS, UMAC_MULMOD_SEED, UMAC_MULMOD_TIMEOUT_MS, RUST_LOG");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Settings shared by every command, plus whatever the command itself
/// still has to interpret.
struct Invocation {
    layer: ConfigLayer,
    json: bool,
    tag: Option<TagLength>,
    trailing: Vec<String>,
}

fn parse_args(args: Vec<String>) -> Invocation {
    let mut config_path: Option<PathBuf> = None;
    let mut cli = ConfigLayer::default();
    let mut json = false;
    let mut tag = None;
    let mut trailing = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => config_path = Some(take_value(&mut iter, "--config").into()),
            "--key" => cli.key = Some(take_value(&mut iter, "--key")),
            "--key-hex" => cli.key_hex = Some(take_value(&mut iter, "--key-hex")),
            "--nonce" => cli.nonce = Some(take_value(&mut iter, "--nonce")),
            "--nonce-hex" => cli.nonce_hex = Some(take_value(&mut iter, "--nonce-hex")),
            "--out-dir" => cli.out_dir = Some(take_value(&mut iter, "--out-dir").into()),
            "--trials" => cli.trials = Some(number_arg(&mut iter, "--trials")),
            "--seed" => cli.seed = Some(number_arg(&mut iter, "--seed")),
            "--timeout-ms" => cli.timeout_ms = Some(number_arg(&mut iter, "--timeout-ms")),
            "--tag" => {
                let bits = u32::try_from(number_arg(&mut iter, "--tag"))
                    .unwrap_or_else(|_| fatal("invalid --tag value"));
                tag = Some(TagLength::from_bits(bits).unwrap_or_else(|err| fatal(&err.to_string())));
            }
            "--json" => json = true,
            "--" => {
                trailing.extend(iter.by_ref());
                break;
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }

    let mut layer = ConfigLayer::default();
    if let Some(path) = config_path {
        let file = ConfigLayer::load(&path).unwrap_or_else(|err| fatal(&err.to_string()));
        layer = layer.merge(file);
    }
    let env_layer = ConfigLayer::from_env().unwrap_or_else(|err| fatal(&err.to_string()));
    Invocation {
        layer: layer.merge(env_layer).merge(cli),
        json,
        tag,
        trailing,
    }
}

fn take_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> String {
    iter.next()
        .unwrap_or_else(|| fatal(&format!("{flag} expects a value")))
}

fn number_arg(iter: &mut impl Iterator<Item = String>, flag: &str) -> u64 {
    let value = take_value(iter, flag);
    value
        .parse()
        .unwrap_or_else(|_| fatal(&format!("invalid {flag} value: {value}")))
}

fn generator(inv: &Invocation) -> (GeneratorConfig, Kdf) {
    let config =
        GeneratorConfig::resolve(&inv.layer).unwrap_or_else(|err| fatal(&err.to_string()));
    let kdf = Kdf::aes128(&config.key).unwrap_or_else(|err| fatal(&err.to_string()));
    (config, kdf)
}

fn harness_config(inv: &Invocation) -> HarnessConfig {
    HarnessConfig::resolve(&inv.layer).unwrap_or_else(|err| fatal(&err.to_string()))
}

fn selected_tags(inv: &Invocation) -> Vec<TagLength> {
    match inv.tag {
        Some(tag) => vec![tag],
        None => TagLength::ALL.to_vec(),
    }
}

fn cmd_keys(inv: Invocation) {
    let (_, kdf) = generator(&inv);
    let sets = selected_tags(&inv)
        .into_iter()
        .map(|tag| kdf.subkeys(tag))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|err| fatal(&err.to_string()));
    if inv.json {
        let text = serde_json::to_string_pretty(&sets)
            .unwrap_or_else(|err| fatal(&format!("failed to encode subkeys: {err}")));
        println!("{text}");
        return;
    }
    for keys in &sets {
        println!("tag {} bits", keys.tag().bits());
        println!("  l1  {} words, first {:#010x}", keys.l1.len(), keys.l1[0]);
        for (i, l2) in keys.l2.iter().enumerate() {
            println!(
                "  l2[{i}] k64 {:#018x} k128 {:#034x}",
                l2.k64,
                l2.k128_value()
            );
        }
        for iter in 0..keys.tag().iters() {
            let l3a: Vec<String> = keys
                .l3a_for(iter)
                .into_iter()
                .flatten()
                .map(|v| format!("{v:#x}"))
                .collect();
            println!("  l3a[{iter}] {}", l3a.join(" "));
        }
        let l3b: Vec<String> = keys.l3b.iter().map(|v| format!("{v:#010x}")).collect();
        println!("  l3b {}", l3b.join(" "));
    }
}

fn cmd_pads(inv: Invocation) {
    let (config, kdf) = generator(&inv);
    for tag in selected_tags(&inv) {
        let pad = kdf
            .pad(&config.nonce, tag)
            .unwrap_or_else(|err| fatal(&err.to_string()));
        println!("{}:{}", tag.bits(), hex::encode(pad));
    }
}

fn cmd_header(inv: Invocation) {
    let (config, kdf) = generator(&inv);
    let mut sink = DirectorySink::new(&config.out_dir);
    let written = write_artifacts(&kdf, &config.nonce, &mut sink, None)
        .unwrap_or_else(|err| fatal(&err.to_string()));
    for name in written {
        println!("{}", sink.path_of(name).display());
    }
}

fn cmd_mulmod_serve() {
    let stdin = io::stdin();
    let stdout = io::stdout();
    match serve_mulmod(stdin.lock(), BufWriter::new(stdout.lock()), &Prime128) {
        Ok(answered) => tracing::info!(answered, "input closed"),
        Err(err) => fatal(&format!("mulmod-serve failed: {err}")),
    }
}

fn print_report(report: &HarnessReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(err) => fatal(&format!("failed to encode report: {err}")),
        }
    } else {
        println!(
            "ok: {} boundary + {} random pairs matched (seed {:#x}, {:.3}s)",
            report.fixed,
            report.random,
            report.seed,
            report.elapsed.as_secs_f64()
        );
    }
}

fn report_failure(err: &HarnessError, seed: u64) -> ! {
    match err {
        HarnessError::Mismatch(m) => fatal(&format!("FAIL (seed {seed:#x}): {m}")),
        other => fatal(&format!("error (seed {seed:#x}): {other}")),
    }
}

fn cmd_mulmod_self(inv: Invocation) {
    let config = harness_config(&inv);
    let harness = DifferentialHarness::new(&config);
    match harness.run_parallel(&Prime128) {
        Ok(report) => print_report(&report, inv.json),
        Err(err) => report_failure(&err, config.seed),
    }
}

fn run_external(
    program: &str,
    args: &[String],
    timeout: Duration,
    harness: &DifferentialHarness,
) -> Result<HarnessReport, HarnessError> {
    let mut candidate = ExternalMulMod::spawn(program, args, timeout)?;
    harness.run(&mut candidate)
}

fn cmd_mulmod_check(inv: Invocation) {
    let (program, args) = match inv.trailing.split_first() {
        Some((program, args)) => (program.clone(), args.to_vec()),
        None => fatal("mulmod-check needs a program after --"),
    };
    let config = harness_config(&inv);
    let harness = DifferentialHarness::new(&config);
    // The candidate is dropped (and killed) before any exit below.
    let outcome = run_external(&program, &args, config.response_timeout, &harness);
    match outcome {
        Ok(report) => print_report(&report, inv.json),
        Err(err) => report_failure(&err, config.seed),
    }
}

fn main() {
    let mut args = env::args().skip(1);
    let command = match args.next() {
        Some(command) if !matches!(command.as_str(), "-h" | "--help" | "help") => command,
        _ => {
            print_usage();
            return;
        }
    };
    init_tracing();
    let rest: Vec<String> = args.collect();
    match command.as_str() {
        "keys" => cmd_keys(parse_args(rest)),
        "pads" => cmd_pads(parse_args(rest)),
        "header" => cmd_header(parse_args(rest)),
        "mulmod-serve" => cmd_mulmod_serve(),
        "mulmod-self" => cmd_mulmod_self(parse_args(rest)),
        "mulmod-check" => cmd_mulmod_check(parse_args(rest)),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            std::process::exit(1);
        }
    }
}
