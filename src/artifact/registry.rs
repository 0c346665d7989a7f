//! Static artifact registry and handler factory

use crate::artifact::names::*;
use crate::artifact::{
    ArchiveFormat, ArtifactHandler, BundleArtifact, DeltaArtifact, PlainArtifact, RenamedArtifact,
};
use crate::error::{DevstageError, DevstageResult};
use crate::store::NamePattern;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a registered artifact is staged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Plain,
    Zip,
    Tar,
    Delta,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Zip => write!(f, "zip"),
            Self::Tar => write!(f, "tar"),
            Self::Delta => write!(f, "delta"),
        }
    }
}

/// Static description of a named artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub pattern: String,
    pub is_regex: bool,
    pub kind: HandlerKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_to_extract: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,
    pub tracks_files: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub autotest_packages: bool,
}

impl ArtifactSpec {
    fn new(name: &str, kind: HandlerKind, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            is_regex: false,
            kind,
            files_to_extract: Vec::new(),
            exclude: Vec::new(),
            rename_to: None,
            tracks_files: true,
            autotest_packages: false,
        }
    }

    fn regex(mut self) -> Self {
        self.is_regex = true;
        self
    }

    fn extract(mut self, files: &[&str]) -> Self {
        self.files_to_extract = files.iter().map(|f| f.to_string()).collect();
        self
    }

    fn excluding(mut self, files: &[&str]) -> Self {
        self.exclude = files.iter().map(|f| f.to_string()).collect();
        self
    }

    fn renamed(mut self, to: &str) -> Self {
        self.rename_to = Some(to.to_string());
        self
    }

    fn untracked(mut self) -> Self {
        self.tracks_files = false;
        self
    }

    fn packaged(mut self) -> Self {
        self.autotest_packages = true;
        self
    }

    /// Registry entry for `name`
    pub fn lookup(name: &str) -> Option<Self> {
        use HandlerKind::*;

        let spec = match name {
            FULL_PAYLOAD => Self::new(name, Plain, ".*_full_.*")
                .regex()
                .renamed(UPDATE_FILE),
            DELTA_PAYLOADS => Self::new(name, Delta, ".*_delta_.*").regex(),
            STATEFUL_PAYLOAD => Self::new(name, Plain, STATEFUL_FILE),
            BASE_IMAGE => Self::new(name, Zip, IMAGE_ZIP).extract(&[BASE_IMAGE_FILE]),
            RECOVERY_IMAGE => Self::new(name, Zip, IMAGE_ZIP).extract(&[RECOVERY_IMAGE_FILE]),
            TEST_IMAGE => Self::new(name, Zip, IMAGE_ZIP).extract(&[TEST_IMAGE_FILE]),
            FACTORY_IMAGE => Self::new(name, Zip, FACTORY_ZIP).extract(&[FACTORY_IMAGE_FILE]),
            AUTOTEST => Self::new(name, Tar, AUTOTEST_TAR)
                .excluding(&["autotest/test_suites"])
                .untracked()
                .packaged(),
            TEST_SUITES => Self::new(name, Tar, TEST_SUITES_TAR),
            AU_SUITE => Self::new(name, Tar, AU_SUITE_TAR),
            FIRMWARE => Self::new(name, Plain, FIRMWARE_TAR),
            SYMBOLS => Self::new(name, Tar, SYMBOLS_TGZ).extract(&[BREAKPAD_DIR]),
            other => {
                let channel = other
                    .strip_prefix("paygen_au_")
                    .filter(|c| CHANNELS.contains(c))?;
                Self::new(name, Tar, &paygen_au_suite_file(channel))
            }
        };
        Some(spec)
    }

    /// A raw file name staged as a plain artifact
    pub fn file(name: &str) -> Self {
        Self::new(name, HandlerKind::Plain, name)
    }

    /// Every registered artifact, sorted by name
    pub fn registered() -> Vec<Self> {
        let mut names: Vec<String> = [
            FULL_PAYLOAD,
            DELTA_PAYLOADS,
            STATEFUL_PAYLOAD,
            BASE_IMAGE,
            RECOVERY_IMAGE,
            TEST_IMAGE,
            FACTORY_IMAGE,
            AUTOTEST,
            TEST_SUITES,
            AU_SUITE,
            FIRMWARE,
            SYMBOLS,
        ]
        .iter()
        .map(|n| n.to_string())
        .collect();
        names.extend(CHANNELS.iter().map(|c| paygen_au_suite(c)));
        names.sort();

        names.iter().filter_map(|n| Self::lookup(n)).collect()
    }
}

/// Artifacts worth prefetching when `requested` are asked for, minus the
/// requested ones themselves
pub fn optional_artifacts(requested: &[String]) -> Vec<String> {
    let implied = |name: &str| -> &'static [&'static str] {
        match name {
            FULL_PAYLOAD => &[STATEFUL_PAYLOAD],
            AUTOTEST => &[TEST_SUITES],
            _ => &[],
        }
    };

    let mut optional: Vec<String> = Vec::new();
    for name in requested {
        for extra in implied(name) {
            let extra = extra.to_string();
            if !requested.contains(&extra) && !optional.contains(&extra) {
                optional.push(extra);
            }
        }
    }
    optional
}

/// Binds artifact names to handlers for one build
#[derive(Debug, Clone)]
pub struct ArtifactFactory {
    install_dir: PathBuf,
    archive_url: String,
    build: String,
}

impl ArtifactFactory {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        archive_url: impl Into<String>,
        build: impl Into<String>,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            archive_url: archive_url.into(),
            build: build.into(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Specs for registry names and raw file names, in request order.
    ///
    /// Fails on the first unregistered name before anything is staged.
    pub fn specs(&self, artifacts: &[String], files: &[String]) -> DevstageResult<Vec<ArtifactSpec>> {
        let mut specs = Vec::with_capacity(artifacts.len() + files.len());
        for name in artifacts {
            let spec = ArtifactSpec::lookup(name)
                .ok_or_else(|| DevstageError::UnknownArtifact(name.clone()))?;
            specs.push(spec);
        }
        specs.extend(files.iter().map(|f| ArtifactSpec::file(f)));
        Ok(specs)
    }

    /// Handlers for the requested artifacts and files
    pub fn required(
        &self,
        artifacts: &[String],
        files: &[String],
    ) -> DevstageResult<Vec<Box<dyn ArtifactHandler>>> {
        self.specs(artifacts, files)?
            .iter()
            .map(|spec| self.handler(spec))
            .collect()
    }

    /// Handlers for the prefetch set implied by `artifacts`
    pub fn optional(&self, artifacts: &[String]) -> DevstageResult<Vec<Box<dyn ArtifactHandler>>> {
        self.required(&optional_artifacts(artifacts), &[])
    }

    /// Build the handler a spec describes
    pub fn handler(&self, spec: &ArtifactSpec) -> DevstageResult<Box<dyn ArtifactHandler>> {
        let handler: Box<dyn ArtifactHandler> = match spec.kind {
            HandlerKind::Delta => Box::new(DeltaArtifact::new(
                &spec.name,
                &self.install_dir,
                &self.archive_url,
                &self.build,
                &spec.pattern,
            )?),
            HandlerKind::Plain => Box::new(self.plain(spec)?),
            HandlerKind::Zip => Box::new(self.bundle(spec, ArchiveFormat::Zip)?),
            HandlerKind::Tar => Box::new(self.bundle(spec, ArchiveFormat::Tar)?),
        };

        Ok(match &spec.rename_to {
            Some(new_name) => Box::new(RenamedArtifact::new(handler, new_name)),
            None => handler,
        })
    }

    fn plain(&self, spec: &ArtifactSpec) -> DevstageResult<PlainArtifact> {
        let pattern = if spec.is_regex {
            NamePattern::regex(&spec.pattern)?
        } else if spec.name == spec.pattern {
            NamePattern::literal(&spec.pattern)
        } else {
            NamePattern::glob(&spec.pattern)?
        };

        let plain = PlainArtifact::new(&spec.name, &self.install_dir, &self.archive_url, pattern);
        Ok(if spec.tracks_files { plain } else { plain.untracked() })
    }

    fn bundle(&self, spec: &ArtifactSpec, format: ArchiveFormat) -> DevstageResult<BundleArtifact> {
        let bundle = BundleArtifact::new(self.plain(spec)?, format)
            .extracting(spec.files_to_extract.clone())
            .excluding(spec.exclude.clone());
        Ok(if spec.autotest_packages { bundle.with_autotest_packages() } else { bundle })
    }
}
