use clap::ArgMatches;
use wayfarer_runtime::planner::DEFAULT_SYSTEM_INSTRUCTION;
use wayfarer_runtime::resolver::{AttemptFailure, ResolutionOutcome};
use wayfarer_runtime::{GenerativeModel, Resolver, VertexBackend};

use super::{init_tracing, read_config};

pub async fn run(matches: &ArgMatches) -> i32 {
    let config = match read_config(matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            return 1;
        }
    };
    init_tracing(&config.logging);

    if let Err(e) = config.validate_service() {
        eprintln!("✗ Invalid configuration: {}", e);
        return 1;
    }

    let instruction = config
        .service
        .system_instruction
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string());
    let backend = match VertexBackend::new(&config.service, instruction) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("✗ {}", e);
            return 1;
        }
    };

    let resolver = Resolver::from_config(&config.discovery);
    println!(
        "→ Trying {} region(s) x {} model(s)",
        resolver.regions().len(),
        resolver.models().len()
    );

    let outcome = resolver.resolve(&backend).await;

    if matches.get_flag("json") {
        println!("{}", outcome_json(&outcome));
        return if outcome.is_bound() { 0 } else { 2 };
    }

    for attempt in outcome.attempts() {
        let model = attempt
            .model
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  ✗ {} / {}: {}", attempt.region, model, attempt.failure);
    }

    match outcome {
        ResolutionOutcome::Bound(binding) => {
            println!(
                "✓ Bound model={} region={} tool={}{}",
                binding.model,
                binding.region,
                binding.handle.search_tool(),
                if binding.is_primary() { "" } else { " (fallback)" }
            );
            0
        }
        ResolutionOutcome::Unresolved { attempts } => {
            eprintln!(
                "✗ No working region/model combination after {} attempt(s)",
                attempts.len()
            );
            2
        }
    }
}

fn outcome_json<H: GenerativeModel>(outcome: &ResolutionOutcome<H>) -> serde_json::Value {
    let attempts: Vec<serde_json::Value> = outcome
        .attempts()
        .iter()
        .map(|attempt| {
            serde_json::json!({
                "region": attempt.region,
                "model": attempt.model,
                "stage": match attempt.failure {
                    AttemptFailure::Connect(_) => "connect",
                    AttemptFailure::Probe(_) => "probe",
                },
                "error": attempt.failure.to_string(),
            })
        })
        .collect();

    match outcome.binding() {
        Some(binding) => serde_json::json!({
            "status": "bound",
            "region": binding.region,
            "model": binding.model,
            "search_tool": binding.handle.search_tool(),
            "primary": binding.is_primary(),
            "attempts": attempts,
        }),
        None => serde_json::json!({
            "status": "unresolved",
            "attempts": attempts,
        }),
    }
}
