//! Update cycle with statum state machine
//!
//! One cycle per check. Each state only offers the step that may follow it,
//! so an asset cannot be installed before it was downloaded and verified.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Checked(Release) ──► Selected(Selection) ──► Downloaded(Selection)
//!  │                                                            │
//!  └──► UpToDate | Skipped                                      └──► Installed
//! ```
//!
//! Any error ends the cycle; the pending download is removed when the machine
//! is dropped.

use super::download::{self, PendingUpdate};
use super::error::{Result, UpdateError};
use super::install::{InstallReport, Installer};
use super::release::{Asset, Release, ReleaseSource};
use super::version;
use statum::{machine, state};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The release chosen for this platform
#[derive(Debug, Clone)]
pub struct Selection {
    pub tag: String,
    pub asset: Asset,
}

#[state]
#[derive(Debug, Clone)]
pub enum UpdateCycleState {
    Idle,
    Checked(Release),
    Selected(Selection),
    Downloaded(Selection),
}

#[machine]
pub struct UpdateCycle<S: UpdateCycleState> {
    source: Arc<dyn ReleaseSource>,
    installer: Installer,
    current_version: String,
    asset_name: String,
    download_dir: PathBuf,
    pending: Option<PendingUpdate>,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    UpToDate { latest: String },
    Skipped { tag: String },
    Installed { tag: String, report: InstallReport },
}

pub enum CheckResult {
    UpToDate { latest: String },
    Skipped { tag: String },
    Newer(UpdateCycle<Checked>),
}

impl<S: UpdateCycleState> UpdateCycle<S> {
    fn no_asset(&self) -> UpdateError {
        UpdateError::NoAsset {
            platform: version::platform(),
            expected: self.asset_name.clone(),
        }
    }
}

impl UpdateCycle<Idle> {
    pub fn create(updater: &Updater) -> Self {
        Self::new(
            updater.source.clone(),
            updater.installer.clone(),
            updater.current_version.clone(),
            updater.asset_name.clone(),
            updater.download_dir.clone(),
            None,
        )
    }

    pub async fn check(self) -> Result<CheckResult> {
        info!("Current version: {}", self.current_version);
        let release = self.source.latest_release().await?;

        if release.draft || release.prerelease {
            info!(
                "Skipping {} (draft={}, prerelease={})",
                release.tag_name, release.draft, release.prerelease
            );
            return Ok(CheckResult::Skipped {
                tag: release.tag_name,
            });
        }

        if !version::is_newer(&self.current_version, &release.tag_name) {
            info!(
                "Already running latest version (current: {}, latest: {})",
                self.current_version, release.tag_name
            );
            return Ok(CheckResult::UpToDate {
                latest: release.tag_name,
            });
        }

        info!(
            "New version available: {} -> {}",
            self.current_version, release.tag_name
        );
        Ok(CheckResult::Newer(self.transition_with(release)))
    }
}

impl UpdateCycle<Checked> {
    pub fn select_asset(self) -> Result<UpdateCycle<Selected>> {
        let selection = self.get_state_data().and_then(|release| {
            release.find_asset(&self.asset_name).map(|asset| Selection {
                tag: release.tag_name.clone(),
                asset: asset.clone(),
            })
        });

        match selection {
            Some(selection) => Ok(self.transition_with(selection)),
            None => Err(self.no_asset()),
        }
    }
}

impl UpdateCycle<Selected> {
    pub async fn download(mut self) -> Result<UpdateCycle<Downloaded>> {
        let Some(selection) = self.get_state_data().cloned() else {
            return Err(self.no_asset());
        };

        let pending =
            download::download(self.source.as_ref(), &selection.asset, &self.download_dir).await?;
        self.pending = Some(pending);
        Ok(self.transition_with(selection))
    }
}

impl UpdateCycle<Downloaded> {
    pub fn pending(&self) -> Option<&PendingUpdate> {
        self.pending.as_ref()
    }

    pub async fn install(mut self) -> Result<UpdateOutcome> {
        let tag = self
            .get_state_data()
            .map(|s| s.tag.clone())
            .unwrap_or_default();
        let pending = self.pending.take().ok_or(UpdateError::NothingToInstall)?;

        let report = self.installer.install(pending).await?;
        info!("Update to {} completed successfully", tag);
        Ok(UpdateOutcome::Installed { tag, report })
    }
}

/// Everything a cycle needs, reused across checks
#[derive(Clone)]
pub struct Updater {
    source: Arc<dyn ReleaseSource>,
    installer: Installer,
    current_version: String,
    asset_name: String,
    download_dir: PathBuf,
}

impl Updater {
    pub fn new(source: Arc<dyn ReleaseSource>, installer: Installer) -> Self {
        Self {
            source,
            installer,
            current_version: version::VERSION.to_string(),
            asset_name: version::platform_asset_name(),
            download_dir: std::env::temp_dir(),
        }
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn with_asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = name.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Runs one full cycle.
    pub async fn check_and_apply(&self) -> Result<UpdateOutcome> {
        let checked = match UpdateCycle::<Idle>::create(self).check().await? {
            CheckResult::Newer(cycle) => cycle,
            CheckResult::UpToDate { latest } => return Ok(UpdateOutcome::UpToDate { latest }),
            CheckResult::Skipped { tag } => return Ok(UpdateOutcome::Skipped { tag }),
        };

        checked.select_asset()?.download().await?.install().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::install::backup_path;
    use crate::update::release::testing::MemoryReleases;
    use std::path::Path;
    use std::time::Duration;

    const ASSET: &str = "mac2mqtt-darwin-arm64";

    struct Fixture {
        bin_dir: tempfile::TempDir,
        download_dir: tempfile::TempDir,
        target: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let bin_dir = tempfile::tempdir().unwrap();
            let download_dir = tempfile::tempdir().unwrap();
            let target = bin_dir.path().join("mac2mqtt");
            std::fs::write(&target, b"old build").unwrap();
            Self {
                bin_dir,
                download_dir,
                target,
            }
        }

        fn updater(&self, source: Arc<MemoryReleases>, current: &str) -> Updater {
            Updater::new(
                source,
                Installer::for_path(&self.target).with_grace(Duration::from_millis(10)),
            )
            .with_current_version(current)
            .with_asset_name(ASSET)
            .with_download_dir(self.download_dir.path())
        }

        fn entries(dir: &Path) -> usize {
            std::fs::read_dir(dir).unwrap().count()
        }
    }

    #[tokio::test]
    async fn installs_newer_release_end_to_end() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryReleases::new("v1.5.0", ASSET, b"new build contents"));

        let outcome = fixture
            .updater(source, "v1.4.0")
            .check_and_apply()
            .await
            .unwrap();

        let UpdateOutcome::Installed { tag, report } = outcome else {
            panic!("expected an installation");
        };
        assert_eq!(tag, "v1.5.0");
        assert_eq!(std::fs::read(&fixture.target).unwrap(), b"new build contents");

        report.cleanup.await.unwrap();
        assert!(!backup_path(&report.target).exists());
        assert_eq!(Fixture::entries(fixture.bin_dir.path()), 1);
        assert_eq!(Fixture::entries(fixture.download_dir.path()), 0);
    }

    #[tokio::test]
    async fn dev_build_updates_to_any_release() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryReleases::new("v0.0.1", ASSET, b"x"));
        let outcome = fixture.updater(source, "dev").check_and_apply().await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    }

    #[tokio::test]
    async fn older_or_equal_release_is_up_to_date() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryReleases::new("v1.4.0", ASSET, b"x"));

        let outcome = fixture
            .updater(source.clone(), "1.4.0")
            .check_and_apply()
            .await
            .unwrap();

        assert!(matches!(outcome, UpdateOutcome::UpToDate { latest } if latest == "v1.4.0"));
        assert_eq!(source.opened(), 0);
        assert_eq!(std::fs::read(&fixture.target).unwrap(), b"old build");
    }

    #[tokio::test]
    async fn drafts_and_prereleases_are_skipped() {
        let fixture = Fixture::new();
        for (draft, prerelease) in [(true, false), (false, true)] {
            let mut source = MemoryReleases::new("v9.0.0", ASSET, b"x");
            source.release.draft = draft;
            source.release.prerelease = prerelease;
            let source = Arc::new(source);

            let outcome = fixture
                .updater(source.clone(), "v1.0.0")
                .check_and_apply()
                .await
                .unwrap();
            assert!(matches!(outcome, UpdateOutcome::Skipped { .. }));
            assert_eq!(source.opened(), 0);
        }
    }

    #[tokio::test]
    async fn missing_platform_asset_aborts() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryReleases::new("v2.0.0", "mac2mqtt-linux-amd64", b"x"));

        let err = fixture
            .updater(source.clone(), "v1.0.0")
            .check_and_apply()
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::NoAsset { ref expected, .. } if expected == ASSET));
        assert_eq!(source.opened(), 0);
    }

    #[tokio::test]
    async fn size_mismatch_leaves_target_untouched() {
        let fixture = Fixture::new();
        let mut source = MemoryReleases::new("v2.0.0", ASSET, b"truncated");
        source.release.assets[0].size = 4096;
        source.announced = None;

        let err = fixture
            .updater(Arc::new(source), "v1.0.0")
            .check_and_apply()
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::Incomplete { expected: 4096, .. }));
        assert_eq!(std::fs::read(&fixture.target).unwrap(), b"old build");
        assert!(!backup_path(&fixture.target).exists());
        assert_eq!(Fixture::entries(fixture.download_dir.path()), 0);
    }

    #[tokio::test]
    async fn steps_can_be_driven_individually() {
        let fixture = Fixture::new();
        let source = Arc::new(MemoryReleases::new("v3.0.0", ASSET, b"abc"));
        let updater = fixture.updater(source, "v2.0.0");

        let CheckResult::Newer(checked) = UpdateCycle::<Idle>::create(&updater).check().await.unwrap() else {
            panic!("expected a newer release");
        };
        let downloaded = checked.select_asset().unwrap().download().await.unwrap();
        assert_eq!(downloaded.pending().map(|p| p.bytes()), Some(3));

        // Dropping the machine discards the verified download
        let pending_path = downloaded.pending().unwrap().path().to_path_buf();
        drop(downloaded);
        assert!(!pending_path.exists());
        assert_eq!(std::fs::read(&fixture.target).unwrap(), b"old build");
    }
}
