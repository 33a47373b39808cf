use std::sync::Arc;

use anyhow::{Context, Result};

use intentctx::{
    cli::args_from_env,
    config::Config,
    intent::IntentContext,
    logging::init_tracing,
    pipeline::VideoPublishPipeline,
    policies::register_builtin_policies,
    policy::PolicyRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = args_from_env()?;
    let mut config = if args.config_explicit || args.config_path.exists() {
        Config::load(&args.config_path)
            .with_context(|| format!("failed to load config from {}", args.config_path.display()))?
    } else {
        Config::default()
    };
    if args.safety_block {
        config.pipeline.safety_block = true;
    }

    let logging_guard = init_tracing(&config.logging)?;

    let registry = Arc::new(PolicyRegistry::new());
    register_builtin_policies(&registry, &config.policies)
        .context("failed to register built-in policies")?;

    let root = IntentContext::background();
    let pipeline = VideoPublishPipeline::new(config.pipeline.clone(), registry)
        .with_run_id(logging_guard.run_id());
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "pipeline", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
        eprintln!("received Ctrl+C; cancelling publish");
    };
    let outcome = pipeline.run(&root, shutdown).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("failed to render publish outcome")?
    );
    eprintln!("[root] {}", root.state());
    Ok(())
}
