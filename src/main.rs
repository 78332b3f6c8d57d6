use anyhow::Context;
use clap::Parser;
use local_explain::config::ExplainerKind;
use local_explain::utils::error::ErrorSeverity;
use local_explain::utils::{logger, validation::Validate};
use local_explain::{
    CliConfig, CounterfactualExplainer, ExplainError, ExplanationEngine, LimeExplainer, LocalExplainer,
    Prediction, PredictionProvider, TomlConfig,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting local-explain CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證參數
    if let Err(e) = cli.validate() {
        tracing::error!("❌ Invalid arguments: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    match run(&cli).await {
        Ok(()) => {
            tracing::info!("✅ Explanation completed successfully!");
        }
        Err(e) => {
            let Some(explain_error) = e.downcast_ref::<ExplainError>() else {
                tracing::error!("❌ Explanation failed: {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(3);
            };

            tracing::error!(
                "❌ Explanation failed: {} (Severity: {:?})",
                explain_error,
                explain_error.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", explain_error.recovery_suggestion());
            eprintln!("❌ {}", explain_error);
            eprintln!("💡 建議: {}", explain_error.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match explain_error.severity() {
                ErrorSeverity::Low => 4,      // 被取消
                ErrorSeverity::Medium => 2,   // 模型錯誤
                ErrorSeverity::High => 1,     // 輸入或設定錯誤
                ErrorSeverity::Critical => 3, // 系統錯誤
            };
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: &CliConfig) -> anyhow::Result<()> {
    tracing::info!("📋 Loading job: {}", cli.config);
    let config = TomlConfig::from_file(&cli.config)?;
    config.validate()?;

    let kind = cli.explainer.unwrap_or(config.run.explainer);
    let timeout = cli.timeout().or_else(|| config.timeout());
    tracing::info!("🧪 Job '{}' using {} explainer", config.run.name, kind);
    if config.monitoring_enabled() {
        tracing::info!("🔍 Intermediate result monitoring enabled");
    }

    // 先對原始輸入評分，取得被解釋的預測
    let model = config.model.build();
    let input = config.prediction_input()?;
    let mut outputs = model.predict(vec![input.clone()]).await?;
    let output = outputs.pop().ok_or(ExplainError::MalformedModelOutput {
        expected: 1,
        actual: 0,
    })?;
    let prediction = Prediction::new(input, output);
    tracing::info!("🎯 Explaining prediction {}", prediction.execution_id);

    let log_intermediates = config.log_intermediates();
    let json = match kind {
        ExplainerKind::Counterfactual => {
            let explainer = CounterfactualExplainer::new(config.counterfactual.clone())
                .with_goal(config.counterfactual_goal()?)
                .with_distributions(config.distributions()?);
            explain(explainer, model, &prediction, timeout, log_intermediates).await?
        }
        ExplainerKind::Lime => {
            let explainer = LimeExplainer::new(config.lime.clone());
            explain(explainer, model, &prediction, timeout, log_intermediates).await?
        }
    };

    match &config.run.output_path {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory for {}", path))?;
            }
            std::fs::write(path, &json).with_context(|| format!("writing {}", path))?;
            tracing::info!("📁 Output saved to: {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn explain<E>(
    explainer: E,
    model: Arc<dyn PredictionProvider>,
    prediction: &Prediction,
    timeout: Option<Duration>,
    log_intermediates: bool,
) -> anyhow::Result<String>
where
    E: LocalExplainer,
    E::Explanation: Serialize,
{
    let mut engine = ExplanationEngine::new(explainer, model);
    if let Some(timeout) = timeout {
        engine = engine.with_timeout(timeout);
    }

    let mut count = 0_usize;
    let sink = Box::new(move |partial: E::Explanation| {
        count += 1;
        if log_intermediates {
            tracing::info!("🔄 Intermediate result #{}", count);
        }
        if let Ok(json) = serde_json::to_string(&partial) {
            tracing::debug!("Intermediate result #{}: {}", count, json);
        }
    });

    let explanation = engine.explain_with(prediction, sink).await?;
    Ok(serde_json::to_string_pretty(&explanation)?)
}
