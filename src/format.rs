//! Output formatting for resolved configs and registry listings.

use crate::registry::ModuleKey;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output format for resolved configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }
}

/// Render resolved configs.
///
/// A single config is printed as-is; several configs are printed as a list (JSON) or as a
/// multi-document stream (YAML).
pub fn format_configs(configs: &[Value], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let text = match configs {
                [single] => serde_json::to_string_pretty(single)?,
                many => serde_json::to_string_pretty(many)?,
            };
            Ok(text)
        }
        OutputFormat::Yaml => {
            let mut out = String::new();
            for (i, config) in configs.iter().enumerate() {
                if i > 0 {
                    out.push_str("---\n");
                }
                out.push_str(&serde_yaml::to_string(config)?);
            }
            Ok(out)
        }
    }
}

/// Format registered modules as a markdown list grouped by type.
pub fn format_modules_markdown(modules: &[(ModuleKey, Option<String>)]) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Modules ({})\n", modules.len()));

    let mut current_type: Option<&str> = None;
    for (key, description) in modules {
        if current_type != Some(key.type_name.as_str()) {
            md.push_str(&format!("\n## {}\n", key.type_name));
            current_type = Some(key.type_name.as_str());
        }
        let variant = if key.variant.is_empty() {
            "(default)"
        } else {
            key.variant.as_str()
        };
        match description {
            Some(desc) => md.push_str(&format!("- `{}`: {}\n", variant, desc)),
            None => md.push_str(&format!("- `{}`\n", variant)),
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("yml"), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::from_str("toml"), None);
    }

    #[test]
    fn test_single_config_is_not_wrapped() {
        let text = format_configs(&[json!({"x": 1})], OutputFormat::Json).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"x": 1}));

        let text = format_configs(&[json!({"x": 1}), json!({"x": 2})], OutputFormat::Json).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!([{"x": 1}, {"x": 2}])
        );
    }

    #[test]
    fn test_yaml_multi_document() {
        let text = format_configs(&[json!({"x": 1}), json!({"x": 2})], OutputFormat::Yaml).unwrap();
        assert_eq!(text, "x: 1\n---\nx: 2\n");
    }

    #[test]
    fn test_modules_markdown() {
        let modules = vec![
            (ModuleKey::new("model", "a"), Some("first".to_string())),
            (ModuleKey::new("model", "b"), None),
            (ModuleKey::new("optim", ""), None),
        ];
        let md = format_modules_markdown(&modules);
        assert!(md.starts_with("# Modules (3)\n"));
        assert!(md.contains("## model\n- `a`: first\n- `b`\n"));
        assert!(md.contains("## optim\n- `(default)`\n"));
    }
}
