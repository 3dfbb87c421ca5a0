//! Chain-run configuration records.
//!
//! A config names one unit of evaluation work: a model, a cot chain and a
//! task set. Configs are YAML files created ahead of a pipeline run, one per
//! chain x model-kwargs combination, with randomly generated names (the name
//! becomes the traces partition identifier, so it must be unique and
//! filesystem-safe).

use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Word pool for generated config names.
const NAME_WORDS: &[&str] = &[
    "saule", "vejas", "upes", "miskas", "laukas", "dangus", "ezeras", "kalnas",
    "ruduo", "ziema", "vasara", "pieva", "akmuo", "banga", "ugnis", "sniegas",
];

/// Config for one cot evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CotEvalConfig {
    /// Chain-run identifier; also the traces partition name.
    pub name: String,
    /// Name of the cot chain to run (resolved by the reasoning engine).
    pub cot_chain: String,
    #[serde(default)]
    pub description: String,
    /// Repo with model weights and config.
    pub model: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    #[serde(default)]
    pub dtype: String,
    /// Tasks to evaluate on.
    pub tasks: Vec<String>,
    /// Passed through to the model init of the reasoning engine.
    #[serde(default)]
    pub modelkwargs: serde_yaml::Mapping,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

fn default_revision() -> String {
    "main".to_string()
}

impl CotEvalConfig {
    pub fn from_yaml(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_string_lossy().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Inputs for batch config generation.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub model: String,
    pub revision: String,
    pub precision: String,
    /// Chains to generate one config per entry for.
    pub chains: Vec<String>,
    /// One modelkwargs mapping per generated config per chain.
    pub model_kwargs: Vec<serde_yaml::Mapping>,
    pub tasks: Vec<String>,
    pub output_dir: PathBuf,
    /// Optional template file; defaults to `template.yaml` in the output
    /// dir if present.
    pub template_path: Option<PathBuf>,
}

/// Pick a fresh `word-word-NNNN` name not colliding with existing files.
fn random_name(output_dir: &Path) -> String {
    let mut rng = rand::rng();
    loop {
        let words: Vec<&str> = NAME_WORDS.choose_multiple(&mut rng, 2).copied().collect();
        let name = format!(
            "{}-{}",
            words.join("-"),
            rng.random_range(1000..10000)
        );
        if !output_dir.join(format!("{}.yaml", name)).exists() {
            return name;
        }
    }
}

fn load_template(params: &GenerateParams) -> Result<serde_yaml::Mapping, ConfigError> {
    let path = match &params.template_path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::TemplateNotFound(p.to_string_lossy().to_string()));
            }
            p.clone()
        }
        None => {
            let fallback = params.output_dir.join("template.yaml");
            if !fallback.exists() {
                tracing::warn!("No template found, using empty template");
                return Ok(serde_yaml::Mapping::new());
            }
            fallback
        }
    };
    let text = std::fs::read_to_string(&path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Generate one config file per chain x model-kwargs combination.
///
/// Each config starts from the template mapping, then the generated fields
/// overwrite template values; `modelkwargs` entries merge key by key.
/// Returns the created config names, in generation order.
pub fn generate_configs(params: &GenerateParams) -> Result<Vec<String>, ConfigError> {
    if params.chains.is_empty() {
        return Err(ConfigError::MissingField("chains".to_string()));
    }
    if params.tasks.is_empty() {
        return Err(ConfigError::MissingField("tasks".to_string()));
    }
    std::fs::create_dir_all(&params.output_dir)?;

    let template = load_template(params)?;
    let mut created = Vec::new();

    for chain in &params.chains {
        for model_kwargs in &params.model_kwargs {
            let mut config = template.clone();
            let name = random_name(&params.output_dir);

            config.insert("name".into(), name.clone().into());
            config.insert("model".into(), params.model.clone().into());
            config.insert("revision".into(), params.revision.clone().into());
            config.insert("dtype".into(), params.precision.clone().into());
            config.insert("cot_chain".into(), chain.clone().into());
            config.insert(
                "tasks".into(),
                serde_yaml::Value::Sequence(
                    params.tasks.iter().map(|t| t.clone().into()).collect(),
                ),
            );
            config.insert(
                "description".into(),
                "Automatically created by cot-eval make-configs.".into(),
            );

            let kwargs = config
                .entry("modelkwargs".into())
                .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
            if let serde_yaml::Value::Mapping(kwargs) = kwargs {
                for (key, value) in model_kwargs {
                    kwargs.insert(key.clone(), value.clone());
                }
            }

            let config_path = params.output_dir.join(format!("{}.yaml", name));
            std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;
            tracing::debug!(name, path = %config_path.display(), "Created config");
            created.push(name);
        }
    }

    tracing::info!(count = created.len(), "Created configs");
    Ok(created)
}
