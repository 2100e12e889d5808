use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use tactical_intel::config::{self, EngineConfig};
use tactical_intel::engine::Session;
use tactical_intel::report_export::{ModelReport, export_report_xlsx};
use tactical_intel::source::FileSource;

const USAGE: &str = "usage: tactical_intel <command> [--data=PATH] [options]

commands:
  formations                     list opponent formations the recommender knows
  counter --opponent=FORMATION   recommend a counter formation [--top=N]
  formation-report               evaluate the recommender [--json=PATH] [--xlsx=PATH]
  tactic [--<feature>=VALUE ...] classify a stat line; unset features use medians
  tactic-defaults                print the median input for every tactic feature
  tactic-report                  evaluate the tactic classifier [--json=PATH] [--xlsx=PATH]";

const OPTION_NAMES: [&str; 5] = ["data", "json", "xlsx", "opponent", "top"];

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };
    let options = &args[1..];

    let cfg = EngineConfig::from_env();
    let session = Session::new(cfg);

    match command.as_str() {
        "formations" => {
            let source = formation_source(options)?;
            let formations = session.formation_options(&source)?;
            if formations.is_empty() {
                println!("No formations available.");
            }
            for f in formations {
                println!("{f}");
            }
        }
        "counter" => {
            let source = formation_source(options)?;
            let opponent = parse_str_arg(options, "--opponent")
                .ok_or_else(|| anyhow!("--opponent=FORMATION is required"))?;
            let model = session.formation_model(&source)?;
            let best = model
                .predict_one(&opponent)
                .with_context(|| format!("recommend counter to {opponent}"))?;
            println!("Recommended counter to {opponent}: {best}");
            let top = parse_usize_arg(options, "--top").unwrap_or(0);
            if top > 0 {
                for (name, p) in model.ranked_counters(&opponent)?.into_iter().take(top) {
                    println!("  {name:<10} {:.1}%", p * 100.0);
                }
            }
        }
        "formation-report" => {
            let source = formation_source(options)?;
            let report = session.formation_model(&source)?.report()?;
            emit_report(&report, options)?;
        }
        "tactic" => {
            let source = tactic_source(options)?;
            let input = parse_feature_args(options);
            let prediction = session.classify_tactic(&source, &input)?;
            for w in &prediction.warnings {
                println!("[WARN] {w}");
            }
            println!("Predicted tactic: {}", prediction.archetype);
        }
        "tactic-defaults" => {
            let source = tactic_source(options)?;
            let model = session.tactic_model(&source)?;
            for (name, value) in model.input_defaults() {
                println!("{name:<24} {value:.2}");
            }
        }
        "tactic-report" => {
            let source = tactic_source(options)?;
            let report = session.tactic_model(&source)?.report()?;
            emit_report(&report, options)?;
        }
        "help" | "--help" | "-h" => println!("{USAGE}"),
        other => {
            return Err(anyhow!("unknown command `{other}`\n\n{USAGE}"));
        }
    }
    Ok(())
}

fn formation_source(options: &[String]) -> Result<FileSource> {
    parse_path_arg(options, "--data")
        .or_else(config::formation_data_path)
        .map(FileSource::new)
        .ok_or_else(|| anyhow!("no formation dataset: pass --data=PATH or set TI_FORMATION_DATA"))
}

fn tactic_source(options: &[String]) -> Result<FileSource> {
    parse_path_arg(options, "--data")
        .or_else(config::tactic_data_path)
        .map(FileSource::new)
        .ok_or_else(|| anyhow!("no tactic dataset: pass --data=PATH or set TI_TACTIC_DATA"))
}

fn emit_report(report: &ModelReport, options: &[String]) -> Result<()> {
    print!("{}", report.render_text());
    if let Some(path) = parse_path_arg(options, "--json") {
        report.write_json(&path)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = parse_path_arg(options, "--xlsx") {
        let summary = export_report_xlsx(report, &path)?;
        println!(
            "Wrote {} ({} sheets, {} metric rows)",
            path.display(),
            summary.sheets,
            summary.metric_rows
        );
    }
    Ok(())
}

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    parse_str_arg(args, name).map(PathBuf::from)
}

fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    parse_str_arg(args, name).and_then(|v| v.parse::<usize>().ok())
}

/// Every `--name=number` that is not a command option, with dashes read as underscores.
fn parse_feature_args(args: &[String]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for arg in args {
        let Some((name, raw)) = arg.strip_prefix("--").and_then(|a| a.split_once('=')) else {
            continue;
        };
        if OPTION_NAMES.contains(&name) {
            continue;
        }
        match raw.trim().parse::<f64>() {
            Ok(v) => {
                out.insert(name.replace('-', "_"), v);
            }
            Err(_) => log::warn!("ignoring non-numeric value for --{name}: {raw}"),
        }
    }
    out
}
