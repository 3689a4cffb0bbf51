//! `seed` subcommand: loads channels, targets and rules from a JSON file.

use crate::config::SeedFile;
use opsmon_alert::condition::validate_rule;
use opsmon_notify::plugin::ChannelRegistry;
use opsmon_storage::MonitorStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub channels: usize,
    pub hosts: usize,
    pub probes: usize,
    pub rules: usize,
    /// Entries rejected by validation.
    pub skipped: usize,
}

/// Upserts every entry of the seed file. Entries are keyed by id, so
/// running the same file twice leaves the database unchanged.
///
/// Channels with an unknown type or invalid config and rules that would fail
/// evaluation are skipped with a warning.
pub async fn apply_seed(
    store: &MonitorStore,
    registry: &ChannelRegistry,
    seed: &SeedFile,
) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for channel in &seed.channels {
        let Some(plugin) = registry.get_plugin(&channel.channel_type) else {
            tracing::warn!(
                id = %channel.id,
                channel_type = %channel.channel_type,
                known = ?registry.plugin_names(),
                "Unknown channel type, skipping"
            );
            summary.skipped += 1;
            continue;
        };
        if let Err(e) = plugin.validate_config(&channel.config) {
            tracing::warn!(
                id = %channel.id,
                error = %e,
                config = %registry.redact_config(&channel.channel_type, &channel.config),
                "Invalid channel config, skipping"
            );
            summary.skipped += 1;
            continue;
        }
        store.save_channel(channel).await?;
        summary.channels += 1;
    }

    for host in &seed.hosts {
        store.save_host(host).await?;
        summary.hosts += 1;
    }
    for probe in &seed.probes {
        store.save_probe(probe).await?;
        summary.probes += 1;
    }

    for rule in &seed.rules {
        if let Err(e) = validate_rule(rule) {
            tracing::warn!(id = %rule.id, error = %e, "Invalid alert rule, skipping");
            summary.skipped += 1;
            continue;
        }
        store.save_rule(rule).await?;
        summary.rules += 1;
    }

    tracing::info!(
        channels = summary.channels,
        hosts = summary.hosts,
        probes = summary.probes,
        rules = summary.rules,
        skipped = summary.skipped,
        "Seed applied"
    );
    Ok(summary)
}
