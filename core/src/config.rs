//! Project configuration (`unimake.toml`) and per-architecture build
//! configuration.

use crate::LightContext;
use anyhow::{Result, bail};
use heck::ToKebabCase;
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

/// The architecture a build targets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Arch {
    #[default]
    Host,
    Avr,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_kebab_case())
    }
}

/// The contents of a project's `unimake.toml`.
#[derive(Default, serde::Deserialize, serde::Serialize)]
pub struct Toml {
    #[serde(default)]
    pub name: Option<String>,
    /// Library sources: `.c` files, or directories walked for them.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Include search path, in order.
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    /// Unity test files, or directories walked for them. Generated runners
    /// are excluded from the walk.
    #[serde(default)]
    pub test_files: Vec<PathBuf>,
    /// Where to put the aggregate runner. Defaults to
    /// `<first test dir>/runner/all_tests_runner.c`.
    #[serde(default)]
    pub all_runner: Option<PathBuf>,
    #[serde(default)]
    pub host: ArchOverrides,
    #[serde(default)]
    pub avr: ArchOverrides,
    #[serde(flatten)]
    pub other: BTreeMap<String, toml::Value>,
}

/// Per-architecture overrides of the built-in toolchain and flags.
#[derive(Default, serde::Deserialize, serde::Serialize)]
pub struct ArchOverrides {
    #[serde(default)]
    pub cc: Option<Vec<String>>,
    #[serde(default)]
    pub ar: Option<Vec<String>>,
    #[serde(default)]
    pub ld: Option<Vec<String>>,
    #[serde(default)]
    pub objcopy: Option<Vec<String>>,
    #[serde(default)]
    pub size: Option<Vec<String>>,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, toml::Value>,
}

impl Toml {
    pub fn read(_context: &LightContext, root: &Path) -> Result<Self> {
        let path_buf = root.join("unimake.toml");

        if !path_buf.try_exists()? {
            return Ok(Self::default());
        }

        let contents = read_to_string(path_buf)?;

        let toml: Self = toml::from_str(&contents)?;

        if !toml.other.is_empty() {
            bail!(
                "Configuration file contains unknown keys: {:#?}",
                toml.other.keys().collect::<Vec<_>>()
            );
        }
        for (table, overrides) in [("host", &toml.host), ("avr", &toml.avr)] {
            if !overrides.other.is_empty() {
                bail!(
                    "Configuration table `{}` contains unknown keys: {:#?}",
                    table,
                    overrides.other.keys().collect::<Vec<_>>()
                );
            }
        }

        Ok(toml)
    }
}

/// Argv prefixes for the tools a build invokes.
#[derive(Clone, Debug)]
pub struct Toolchain {
    pub cc: Vec<String>,
    pub ar: Vec<String>,
    pub ld: Vec<String>,
    pub objcopy: Vec<String>,
    pub size: Vec<String>,
}

impl Toolchain {
    fn host() -> Self {
        Self {
            cc: vec!["cc".to_owned()],
            ar: vec!["ar".to_owned()],
            ld: vec!["cc".to_owned()],
            objcopy: vec!["objcopy".to_owned()],
            size: vec!["size".to_owned()],
        }
    }

    fn avr() -> Self {
        Self {
            cc: vec!["avr-gcc".to_owned()],
            ar: vec!["avr-ar".to_owned()],
            ld: vec!["avr-gcc".to_owned()],
            objcopy: vec!["avr-objcopy".to_owned()],
            size: vec!["avr-size".to_owned()],
        }
    }
}

/// Everything a build step needs to know. Immutable after construction.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub build_dir: PathBuf,
    pub arch: Arch,
    pub toolchain: Toolchain,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
    /// Include-directory flags, each carrying its `-I` prefix.
    pub include_dirs: Vec<String>,
    pub obj_extension: String,
    pub lib_extension: String,
    pub exec_extension: String,
}

#[cfg(not(windows))]
const HOST_EXTENSIONS: [&str; 3] = [".o", ".a", ""];
#[cfg(windows)]
const HOST_EXTENSIONS: [&str; 3] = [".obj", ".lib", ".exe"];

const AVR_EXTENSIONS: [&str; 3] = [".o", ".a", ".elf"];

const AVR_MCU_CFLAGS: [&str; 3] = ["-mmcu=atmega2560", "-DF_CPU=16000000UL", "-Os"];
const AVR_MCU_LDFLAGS: [&str; 1] = ["-mmcu=atmega2560"];

impl BuildConfig {
    #[must_use]
    pub fn new(arch: Arch, build_dir: Option<PathBuf>, toml: &Toml) -> Self {
        let build_dir =
            build_dir.unwrap_or_else(|| Path::new("build").join(arch.to_string()));

        let (mut toolchain, mut cflags, mut ldflags, extensions) = match arch {
            Arch::Host => (Toolchain::host(), Vec::new(), Vec::new(), HOST_EXTENSIONS),
            Arch::Avr => (
                Toolchain::avr(),
                AVR_MCU_CFLAGS.map(str::to_owned).to_vec(),
                AVR_MCU_LDFLAGS.map(str::to_owned).to_vec(),
                AVR_EXTENSIONS,
            ),
        };

        let overrides = match arch {
            Arch::Host => &toml.host,
            Arch::Avr => &toml.avr,
        };
        for (tool, override_) in [
            (&mut toolchain.cc, &overrides.cc),
            (&mut toolchain.ar, &overrides.ar),
            (&mut toolchain.ld, &overrides.ld),
            (&mut toolchain.objcopy, &overrides.objcopy),
            (&mut toolchain.size, &overrides.size),
        ] {
            if let Some(argv) = override_ {
                tool.clone_from(argv);
            }
        }
        cflags.extend(overrides.cflags.iter().cloned());
        ldflags.extend(overrides.ldflags.iter().cloned());

        let include_dirs = toml
            .include_dirs
            .iter()
            .map(|dir| format!("-I{}", dir.display()))
            .collect();

        let [obj_extension, lib_extension, exec_extension] =
            extensions.map(str::to_owned);

        Self {
            build_dir,
            arch,
            toolchain,
            cflags,
            ldflags,
            include_dirs,
            obj_extension,
            lib_extension,
            exec_extension,
        }
    }
}
