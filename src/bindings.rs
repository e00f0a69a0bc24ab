//! TypeScript bindings for the types a UI shell exchanges with the viewer.

use crate::cache::CacheStats;
use crate::config::{Capabilities, LogLevel};
use crate::network::OfflineNotice;
use crate::offline::{CacheFailure, OfflineBookPayload, OfflineCacheReport};
use crate::profile::{DeviceType, ScalingConfig, ViewportSignals};
use crate::telemetry::TelemetryRecord;
use crate::viewer::{ViewerCommand, ViewerPhase, ViewerSnapshot};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<()> {
    T::export_all_to(out_dir).with_context(|| format!("Failed to export {}", T::name()))
}

/// Regenerate every binding under `out_dir`, removing stale `.ts` files first.
pub fn export_ts_bindings(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for entry in
        fs::read_dir(out_dir).with_context(|| format!("Failed to list {}", out_dir.display()))?
    {
        let path = entry.context("Failed to read entry")?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }

    export_single_type::<ViewerSnapshot>(out_dir)?;
    export_single_type::<ViewerPhase>(out_dir)?;
    export_single_type::<ViewerCommand>(out_dir)?;
    export_single_type::<Capabilities>(out_dir)?;
    export_single_type::<LogLevel>(out_dir)?;
    export_single_type::<TelemetryRecord>(out_dir)?;
    export_single_type::<CacheStats>(out_dir)?;
    export_single_type::<OfflineBookPayload>(out_dir)?;
    export_single_type::<OfflineCacheReport>(out_dir)?;
    export_single_type::<CacheFailure>(out_dir)?;
    export_single_type::<OfflineNotice>(out_dir)?;
    export_single_type::<DeviceType>(out_dir)?;
    export_single_type::<ViewportSignals>(out_dir)?;
    export_single_type::<ScalingConfig>(out_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_replace_stale_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Stale.ts"), "export type Stale = never;").expect("seed");

        export_ts_bindings(dir.path()).expect("export");

        assert!(!dir.path().join("Stale.ts").exists());
        assert!(dir.path().join("ViewerSnapshot.ts").exists());
        assert!(dir.path().join("OfflineCacheReport.ts").exists());
    }
}
