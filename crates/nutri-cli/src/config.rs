//! Configuration file management for nutri.
//!
//! Provides a TOML-based config file at `~/.config/nutri/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nutri_core::pipeline::Stage;
use nutri_core::{
    Condition, GenerationSettings, NutriSettings, PipelineMode, RequestFormat, SpecialistSettings,
};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

/// On-disk configuration. Every field is optional; missing values fall
/// through to env vars and defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub stages: StagesSection,
    /// Keyed by condition name (`diabetes`, `kidney`, ...).
    pub specialists: BTreeMap<String, SpecialistSection>,
    pub generation: GenerationSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesSection {
    pub diet_rules: Option<String>,
    pub gaps: Option<String>,
    pub targets: Option<String>,
    pub conflicts: Option<String>,
    pub plan: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    /// `sequential` or `concurrent`.
    pub mode: Option<String>,
}

impl StagesSection {
    fn url(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::DietRules => self.diet_rules.as_deref(),
            Stage::Gaps => self.gaps.as_deref(),
            Stage::Targets => self.targets.as_deref(),
            Stage::Conflicts => self.conflicts.as_deref(),
            Stage::Plan => self.plan.as_deref(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialistSection {
    pub url: Option<String>,
    pub max_new_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    /// `generate` or `lipids-plan`.
    pub format: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub max_sentences: Option<usize>,
    pub default_max_new_tokens: Option<u32>,
    pub answer_suffix: Option<String>,
}

impl ConfigFile {
    /// A file spelling out every default, as written by `nutri init`.
    pub fn defaults() -> Self {
        let settings = NutriSettings::default();
        let stages = StagesSection {
            diet_rules: Some(settings.stages.diet_rules.clone()),
            gaps: Some(settings.stages.gaps.clone()),
            targets: Some(settings.stages.targets.clone()),
            conflicts: Some(settings.stages.conflicts.clone()),
            plan: Some(settings.stages.plan.clone()),
            connect_timeout_secs: Some(settings.stage_timeouts.connect.as_secs()),
            request_timeout_secs: Some(settings.stage_timeouts.request.as_secs()),
            mode: Some(settings.pipeline_mode.to_string()),
        };
        let specialists = Condition::ALL
            .into_iter()
            .map(|c| {
                let s = settings.specialist(c);
                (
                    c.to_string(),
                    SpecialistSection {
                        url: Some(s.url),
                        max_new_tokens: Some(s.max_new_tokens),
                        timeout_secs: Some(s.timeout.as_secs()),
                        format: Some(s.format.to_string()),
                    },
                )
            })
            .collect();
        let generation = GenerationSection {
            max_sentences: Some(settings.generation.max_sentences),
            default_max_new_tokens: Some(settings.generation.default_max_new_tokens),
            answer_suffix: Some(
                settings
                    .generation
                    .answer_suffix
                    .unwrap_or_else(|| GenerationSettings::DEFAULT_ANSWER_SUFFIX.to_owned()),
            ),
        };
        Self {
            stages,
            specialists,
            generation,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the nutri config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/nutri` or `~/.config/nutri`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("nutri");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("nutri")
}

/// Return the path to the nutri config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns `Ok(None)` if it does not exist.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Name of the env var overriding `stage`'s base URL (`NUTRI_A1_URL`, ...).
pub fn stage_env_var(stage: Stage) -> String {
    format!("NUTRI_A{}_URL", stage.number())
}

/// Name of the env var overriding `condition`'s provider URL.
pub fn specialist_env_var(condition: Condition) -> String {
    format!("NUTRI_{}_URL", condition.as_str().to_uppercase())
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct NutriConfig {
    pub settings: NutriSettings,
}

impl NutriConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Stage URLs: `cli_stage_url` (all stages) > `NUTRI_A<n>_URL` > `[stages]` > default
    /// - Specialist URLs: `NUTRI_<CONDITION>_URL` > `[specialists.<condition>]` > default
    /// - Everything else: config file > default
    pub fn resolve(cli_stage_url: Option<&str>) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(cli_stage_url, file.as_ref(), |name| std::env::var(name).ok())
    }

    /// [`Self::resolve`] with the config file and environment supplied.
    pub fn resolve_with(
        cli_stage_url: Option<&str>,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut settings = NutriSettings::default();

        let stages = file.map(|f| &f.stages);
        for stage in Stage::ALL {
            let url = match cli_stage_url {
                Some(url) => Some(url.to_owned()),
                None => env(&stage_env_var(stage))
                    .or_else(|| stages.and_then(|s| s.url(stage)).map(str::to_owned)),
            };
            if let Some(url) = url {
                set_stage_url(&mut settings, stage, url);
            }
        }

        if let Some(stages) = stages {
            if let Some(secs) = stages.connect_timeout_secs {
                settings.stage_timeouts.connect = Duration::from_secs(secs);
            }
            if let Some(secs) = stages.request_timeout_secs {
                settings.stage_timeouts.request = Duration::from_secs(secs);
            }
            if let Some(mode) = &stages.mode {
                settings.pipeline_mode = mode
                    .parse::<PipelineMode>()
                    .context("invalid [stages] mode in config file")?;
            }
        }

        if let Some(file) = file {
            for name in file.specialists.keys() {
                name.parse::<Condition>()
                    .with_context(|| format!("unknown [specialists.{name}] in config file"))?;
            }
        }

        for condition in Condition::ALL {
            let section = file.and_then(|f| f.specialists.get(condition.as_str()));
            let mut specialist = SpecialistSettings::default_for(condition);
            if let Some(section) = section {
                if let Some(url) = &section.url {
                    specialist.url = url.clone();
                }
                if let Some(tokens) = section.max_new_tokens {
                    specialist.max_new_tokens = tokens;
                }
                if let Some(secs) = section.timeout_secs {
                    specialist.timeout = Duration::from_secs(secs);
                }
                if let Some(wire) = &section.format {
                    specialist.format = wire.parse::<RequestFormat>().with_context(|| {
                        format!("invalid [specialists.{condition}] format in config file")
                    })?;
                }
            }
            if let Some(url) = env(&specialist_env_var(condition)) {
                specialist.url = url;
            }
            settings.specialists.insert(condition, specialist);
        }

        if let Some(generation) = file.map(|f| &f.generation) {
            if let Some(n) = generation.max_sentences {
                settings.generation.max_sentences = n;
            }
            if let Some(n) = generation.default_max_new_tokens {
                settings.generation.default_max_new_tokens = n;
            }
            if generation.answer_suffix.is_some() {
                settings.generation.answer_suffix = generation.answer_suffix.clone();
            }
        }

        settings.validate().context("invalid configuration")?;
        Ok(Self { settings })
    }
}

fn set_stage_url(settings: &mut NutriSettings, stage: Stage, url: String) {
    let endpoints = &mut settings.stages;
    match stage {
        Stage::DietRules => endpoints.diet_rules = url,
        Stage::Gaps => endpoints.gaps = url,
        Stage::Targets => endpoints.targets = url,
        Stage::Conflicts => endpoints.conflicts = url,
        Stage::Plan => endpoints.plan = url,
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
