//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    liquidity = config.engine.default_liquidity,
    initial_balance = config.wallets.initial_balance,
    tokens = config.identity.tokens.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Finite, positive liquidity and tolerances
/// - Search tolerance tighter than the convergence tolerance
/// - Non-negative money amounts
/// - Store limits that leave room for settlement batches
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(!config.server.name.is_empty(), "server.name must not be empty");

  // Engine validation
  let engine = &config.engine;
  anyhow::ensure!(
    engine.default_liquidity.is_finite() && engine.default_liquidity > 0.0,
    "engine.default_liquidity must be finite and positive, got {}",
    engine.default_liquidity
  );
  anyhow::ensure!(
    engine.max_search_iterations > 0,
    "engine.max_search_iterations must be positive"
  );
  anyhow::ensure!(
    engine.search_tolerance > 0.0 && engine.convergence_tolerance > 0.0,
    "engine tolerances must be positive"
  );
  anyhow::ensure!(
    engine.search_tolerance < engine.convergence_tolerance,
    "engine.search_tolerance ({}) must be below convergence_tolerance ({})",
    engine.search_tolerance,
    engine.convergence_tolerance
  );
  anyhow::ensure!(
    engine.sell_bound_multiple.is_finite() && engine.sell_bound_multiple > 0.0,
    "engine.sell_bound_multiple must be finite and positive, got {}",
    engine.sell_bound_multiple
  );

  // Wallet validation
  let wallets = &config.wallets;
  anyhow::ensure!(
    wallets.initial_balance.is_finite() && wallets.initial_balance >= 0.0,
    "wallets.initial_balance must be finite and non-negative, got {}",
    wallets.initial_balance
  );
  anyhow::ensure!(
    wallets.top_up_amount.is_finite() && wallets.top_up_amount >= 0.0,
    "wallets.top_up_amount must be finite and non-negative, got {}",
    wallets.top_up_amount
  );
  anyhow::ensure!(
    wallets.top_up_interval_days > 0,
    "wallets.top_up_interval_days must be positive"
  );
  anyhow::ensure!(
    wallets.top_up_check_seconds > 0,
    "wallets.top_up_check_seconds must be positive"
  );

  // Store validation
  anyhow::ensure!(
    config.store.max_transaction_attempts >= 1,
    "store.max_transaction_attempts must be at least 1"
  );
  anyhow::ensure!(
    config.store.max_batch_size >= 2,
    "store.max_batch_size must be at least 2, got {}",
    config.store.max_batch_size
  );

  // Identity validation
  for (i, token) in config.identity.tokens.iter().enumerate() {
    anyhow::ensure!(
      !token.token.is_empty() && !token.user_id.is_empty(),
      "identity.tokens[{}] needs a token and a user_id",
      i
    );
  }

  anyhow::ensure!(
    config.persistence.snapshot_interval_seconds > 0,
    "persistence.snapshot_interval_seconds must be positive"
  );

  Ok(())
}
